//! CLI command implementations

pub mod build;
pub mod config;
pub mod list;
pub mod prune;
pub mod pull;
pub mod push;

pub use build::execute as build;
pub use config::execute as config;
pub use list::execute as list;
pub use prune::execute as prune;
pub use pull::execute as pull;
pub use push::execute as push;

use crate::config::Config;
use crate::error::KilnResult;
use crate::repo::{LocalRepository, Repository, SshRepository};
use crate::sync::SyncEngine;
use std::sync::Arc;
use std::time::Duration;

/// The local cache repository from configuration
pub(crate) fn local_repo(config: &Config) -> LocalRepository {
    LocalRepository::new(config.cache.resolved_root())
}

/// The synchronization engine from configuration
pub(crate) fn sync_engine(config: &Config) -> SyncEngine {
    SyncEngine::new(Duration::from_secs(config.transfer.timeout_secs))
}

/// One configured remote repository by id
pub(crate) fn remote_repo(config: &Config, repo_id: &str) -> KilnResult<SshRepository> {
    Ok(SshRepository::from_config(repo_id, config.remote(repo_id)?))
}

/// All configured remote repositories in pull order
pub(crate) fn remotes_in_pull_order(config: &Config) -> KilnResult<Vec<Arc<dyn Repository>>> {
    config
        .pull_order()
        .iter()
        .map(|id| Ok(Arc::new(remote_repo(config, id)?) as Arc<dyn Repository>))
        .collect()
}
