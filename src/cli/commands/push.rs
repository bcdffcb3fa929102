//! Push command - copy the latest local version to remote repositories

use crate::cli::args::PushArgs;
use crate::cli::commands::{local_repo, remote_repo, sync_engine};
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::image;
use crate::repo::Repository;
use crate::ui::{self, UiContext};

/// Execute the push command
///
/// Pushes the latest local version of the named image. Individual remote
/// failures are surfaced as warnings; the command fails only when every
/// target rejects the push.
pub async fn execute(args: PushArgs, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let local = local_repo(config);
    let engine = sync_engine(config);

    let Some(image) = image::latest(local.list(Some(&args.name)).await?) else {
        return Err(KilnError::NotFound {
            name: args.name.clone(),
            repo: local.id().to_string(),
        });
    };

    let repo_ids = match &args.to {
        Some(repo_id) => vec![repo_id.clone()],
        None => config.remotes().keys().cloned().collect(),
    };
    if repo_ids.is_empty() {
        return Err(KilnError::User(
            "no remote repositories configured".to_string(),
        ));
    }

    let spinner = ui::TaskSpinner::start(&ctx, &format!("Pushing {}...", image));

    let mut pushed = 0;
    let mut last_err = None;
    for repo_id in &repo_ids {
        let remote = remote_repo(config, repo_id)?;
        spinner.message(&format!("Pushing {} to {}...", image, repo_id));

        match engine.push(&local, &remote, &image).await {
            Ok(()) => pushed += 1,
            Err(e) => {
                ui::output::step_warn(&format!("Repository {}: {}", repo_id, e));
                last_err = Some(e);
            }
        }
    }

    if pushed == 0 {
        spinner.stop_error(&format!("Failed to push {}", image));
        // At least one target was attempted, so an error exists here
        return Err(last_err.unwrap_or(KilnError::Internal(
            "push failed without an error".to_string(),
        )));
    }

    if last_err.is_some() {
        spinner.stop_warn(&format!(
            "Pushed {} to {}/{} repositories",
            image,
            pushed,
            repo_ids.len()
        ));
    } else {
        spinner.stop(&format!("Pushed {} to {} repositories", image, pushed));
    }
    Ok(())
}
