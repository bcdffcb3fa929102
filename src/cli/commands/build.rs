//! Build command - resolve images via the rule engine

use crate::builder::CommandImageBuilder;
use crate::cli::args::BuildArgs;
use crate::cli::commands::{local_repo, remotes_in_pull_order, sync_engine};
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::image::ImageDestination;
use crate::resolver::{BuildContext, ImageRequest, ResolvedImage, Resolver};
use crate::ui::{self, UiContext};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    if args.export.is_some() && args.names.len() > 1 {
        return Err(KilnError::User(
            "--export applies to a single image".to_string(),
        ));
    }

    let ctx = UiContext::detect();
    let resolver = Arc::new(make_resolver(config)?);

    let spinner = ui::TaskSpinner::start(&ctx, &format!("Resolving {} image(s)...", args.names.len()));

    let tasks: Vec<_> = args
        .names
        .iter()
        .map(|name| {
            let resolver = resolver.clone();
            let mut request = ImageRequest::new(name);
            if let Some(bound) = args.not_older_than {
                request = request.not_older_than(bound);
            }
            tokio::spawn(async move { resolver.resolve(&request).await })
        })
        .collect();

    let mut resolved = Vec::new();
    for (name, task) in args.names.iter().zip(join_all(tasks).await) {
        match task {
            Ok(Ok(image)) => resolved.push(image),
            Ok(Err(e)) => {
                spinner.stop_error(&format!("Failed to resolve {}", name));
                return Err(e);
            }
            Err(e) => {
                spinner.stop_error(&format!("Failed to resolve {}", name));
                return Err(KilnError::Internal(format!(
                    "resolution task for {} panicked: {}",
                    name, e
                )));
            }
        }
    }

    spinner.stop(&format!("Resolved {} image(s)", resolved.len()));

    for image in &resolved {
        let destination = destination_for(&image.image.name, args.export.clone());
        deliver(image, destination).await?;
    }

    Ok(())
}

fn make_resolver(config: &Config) -> KilnResult<Resolver> {
    let mut resolver = Resolver::new(BuildContext::new(), local_repo(config), sync_engine(config))
        .with_remotes(remotes_in_pull_order(config)?)
        .with_push_to(config.build.push_to.clone())
        .with_keep_versions(config.cache.keep_versions)
        .with_transfer_retries(config.transfer.retries);

    if let Some(command) = &config.build.command {
        let scratch = ConfigManager::scratch_dir(&config.cache.resolved_root());
        let builder = CommandImageBuilder::new(command.clone(), config.build.args.clone(), scratch);
        resolver = resolver.with_builder(Arc::new(builder), config.build.target());
    }

    Ok(resolver)
}

fn destination_for(name: &str, export: Option<PathBuf>) -> ImageDestination {
    match export {
        Some(path) => ImageDestination::LocalFile { path },
        None => ImageDestination::Share {
            name: name.to_string(),
        },
    }
}

async fn deliver(resolved: &ResolvedImage, destination: ImageDestination) -> KilnResult<()> {
    match destination {
        ImageDestination::Share { .. } => {
            ui::output::step_ok(&format!(
                "{} -> {}",
                resolved.image,
                resolved.path.display()
            ));
        }
        ImageDestination::LocalFile { path } => {
            fs::copy(&resolved.path, &path).await.map_err(|e| {
                KilnError::io(
                    format!("exporting {} to {}", resolved.image, path.display()),
                    e,
                )
            })?;
            ui::output::step_ok(&format!("{} -> {}", resolved.image, path.display()));
        }
        ImageDestination::Transient => {
            debug!("Transient image {}, nothing to deliver", resolved.image);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_defaults_to_share() {
        assert_eq!(
            destination_for("base", None),
            ImageDestination::Share {
                name: "base".to_string()
            }
        );
        assert_eq!(
            destination_for("base", Some(PathBuf::from("/tmp/out.qcow2"))),
            ImageDestination::LocalFile {
                path: PathBuf::from("/tmp/out.qcow2")
            }
        );
    }
}
