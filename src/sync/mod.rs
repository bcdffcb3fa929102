//! Synchronization engine
//!
//! Transfers shared images between the local cache and remote repositories.
//! Every remote interaction runs under the configured timeout; when it
//! fires, the in-flight transfer future is dropped, which terminates the
//! underlying transfer process, and the operation fails with `Timeout`. The
//! engine performs no retries of its own — retry policy belongs to the
//! resolver.

use crate::error::{KilnError, KilnResult};
use crate::image;
use crate::image::SharedImage;
use crate::repo::{sha256_file, LocalRepository, Repository};
use std::future::Future;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Pushes and pulls images between the local cache and remote repositories
pub struct SyncEngine {
    timeout: Duration,
}

impl SyncEngine {
    /// Create an engine with the given per-operation timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        repo: &str,
        fut: impl Future<Output = KilnResult<T>>,
    ) -> KilnResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(KilnError::timeout(operation, repo)),
        }
    }

    /// Copy an image from the local cache to a remote repository
    ///
    /// Idempotent: when the remote already holds this exact version the
    /// push is a no-op.
    pub async fn push(
        &self,
        local: &LocalRepository,
        remote: &dyn Repository,
        image: &SharedImage,
    ) -> KilnResult<()> {
        let existing = self
            .with_timeout("list", remote.id(), remote.list(Some(&image.name)))
            .await?;
        if existing.contains(image) {
            debug!("{} already in repository {}, skipping push", image, remote.id());
            return Ok(());
        }

        let source = local.artifact_path(image);
        if !source.exists() {
            return Err(KilnError::NotFound {
                name: image.name.clone(),
                repo: local.id().to_string(),
            });
        }

        self.with_timeout("push", remote.id(), remote.store(image, &source))
            .await?;
        info!("Pushed {} to repository {}", image, remote.id());
        Ok(())
    }

    /// Bring the latest remote version of `name` into the local cache
    ///
    /// Lists the remote, selects the latest version, and imports it unless
    /// the local cache already holds an equal-or-newer version of that
    /// name, in which case the local latest is returned untouched. Returns
    /// the best version now present locally.
    pub async fn pull(
        &self,
        local: &LocalRepository,
        remote: &dyn Repository,
        name: &str,
    ) -> KilnResult<SharedImage> {
        let remote_images = self
            .with_timeout("list", remote.id(), remote.list(Some(name)))
            .await?;
        let Some(remote_latest) = image::latest(remote_images) else {
            return Err(KilnError::NotFound {
                name: name.to_string(),
                repo: remote.id().to_string(),
            });
        };

        if let Some(local_latest) = image::latest(local.list(Some(name)).await?) {
            if local_latest >= remote_latest {
                debug!(
                    "Local cache already has {} (>= {} on {}), skipping pull",
                    local_latest,
                    remote_latest,
                    remote.id()
                );
                return Ok(local_latest);
            }
        }

        local.ensure_root().await?;
        let scratch = local.scratch_path(&remote_latest.artifact_file_name());

        let fetched = self
            .with_timeout("pull", remote.id(), remote.fetch(&remote_latest, &scratch))
            .await;
        if let Err(e) = fetched {
            let _ = fs::remove_file(&scratch).await;
            return Err(e);
        }

        if let Some(expected) = &remote_latest.sha256 {
            let actual = sha256_file(&scratch).await?;
            if actual != *expected {
                let _ = fs::remove_file(&scratch).await;
                return Err(KilnError::transfer_failed(
                    remote.id(),
                    format!(
                        "digest mismatch for {}: expected {}, got {}",
                        remote_latest.name, expected, actual
                    ),
                ));
            }
        }

        let imported = local.import(&remote_latest, &scratch).await?;
        info!("Pulled {} from repository {}", imported, remote.id());
        Ok(imported)
    }
}
