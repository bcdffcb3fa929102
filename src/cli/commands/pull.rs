//! Pull command - bring the latest remote version into the local cache

use crate::cli::args::PullArgs;
use crate::cli::commands::{local_repo, remote_repo, sync_engine};
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the pull command
///
/// With `--from`, one repository is consulted. Otherwise remotes are tried
/// in pull order: a missing image moves on to the next repository, a
/// transfer failure is warned about and skipped, and the first success
/// wins.
pub async fn execute(args: PullArgs, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let local = local_repo(config);
    let engine = sync_engine(config);

    let repo_ids = match &args.from {
        Some(repo_id) => vec![repo_id.clone()],
        None => config.pull_order(),
    };
    if repo_ids.is_empty() {
        return Err(KilnError::User(
            "no remote repositories configured".to_string(),
        ));
    }

    let spinner = ui::TaskSpinner::start(&ctx, &format!("Pulling {}...", args.name));

    let mut last_err = KilnError::NotFound {
        name: args.name.clone(),
        repo: repo_ids.join(", "),
    };
    for repo_id in &repo_ids {
        let remote = remote_repo(config, repo_id)?;
        spinner.message(&format!("Pulling {} from {}...", args.name, repo_id));

        match engine.pull(&local, &remote, &args.name).await {
            Ok(image) => {
                spinner.stop(&format!("Pulled {} from {}", image, repo_id));
                return Ok(());
            }
            Err(e @ KilnError::NotFound { .. }) => {
                debug!("Repository {} has no {}", repo_id, args.name);
                last_err = e;
            }
            Err(e) if e.is_retryable() && args.from.is_none() => {
                ui::output::step_warn(&format!("Repository {}: {}", repo_id, e));
                last_err = e;
            }
            Err(e) => {
                spinner.stop_error(&format!("Failed to pull {}", args.name));
                return Err(e);
            }
        }
    }

    spinner.stop_error(&format!("Failed to pull {}", args.name));
    Err(last_err)
}
