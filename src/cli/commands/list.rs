//! List command - show images in a repository

use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::commands::{local_repo, remote_repo};
use crate::config::Config;
use crate::error::KilnResult;
use crate::image::SharedImage;
use crate::repo::Repository;
use crate::ui::output;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> KilnResult<()> {
    let images = match &args.repo {
        Some(repo_id) => {
            let remote = remote_repo(config, repo_id)?;
            remote.list(args.name.as_deref()).await?
        }
        None => local_repo(config).list(args.name.as_deref()).await?,
    };

    if images.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => output::step_info("No images found"),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => output::image_table(&images),
        OutputFormat::Json => print_json(&images)?,
        OutputFormat::Plain => output::image_plain(&images),
    }

    Ok(())
}

fn print_json(images: &[SharedImage]) -> KilnResult<()> {
    println!("{}", serde_json::to_string_pretty(images)?);
    Ok(())
}
