//! Prune command - delete old versions from the local cache

use crate::cli::args::PruneArgs;
use crate::cli::commands::local_repo;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::retention;
use crate::ui::output;

/// Execute the prune command
pub async fn execute(args: PruneArgs, config: &Config) -> KilnResult<()> {
    let keep = match args.keep {
        Some(keep) if keep > 0 => keep,
        Some(_) => {
            return Err(KilnError::User(
                "--keep must be at least 1; deleting every version is never intended".to_string(),
            ))
        }
        None if config.cache.keep_versions > 0 => config.cache.keep_versions,
        None => {
            return Err(KilnError::User(
                "no retention configured; pass --keep or set cache.keep_versions".to_string(),
            ))
        }
    };

    let local = local_repo(config);
    let deleted = retention::prune(&local, &args.name, keep).await?;

    if deleted.is_empty() {
        output::step_info(&format!(
            "Nothing to prune: {} has at most {} version(s)",
            args.name, keep
        ));
        return Ok(());
    }

    for image in &deleted {
        output::step_ok(&format!("Deleted {}", image));
    }
    println!();
    println!(
        "Kept the {} most recent version(s) of {}",
        keep, args.name
    );

    Ok(())
}
