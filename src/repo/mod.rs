//! Repository abstraction for shared images
//!
//! A repository is a storage location holding shared-image artifacts plus
//! one metadata sidecar per artifact. The trait is the seam between the
//! synchronization engine and the storage transport: the local cache is a
//! filesystem directory, remote repositories are reached through a fresh
//! ssh/scp invocation per operation, and a future in-process transport only
//! has to implement this trait.

pub mod local;
pub mod remote;

pub use local::LocalRepository;
pub use remote::SshRepository;

use crate::error::{KilnError, KilnResult};
use crate::image::SharedImage;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Capability set of a shared-image repository
#[async_trait]
pub trait Repository: Send + Sync {
    /// Logical repository id used in configuration and error messages
    fn id(&self) -> &str;

    /// Enumerate images, optionally filtered by name
    ///
    /// The index is derived by listing on every call, never cached across
    /// calls: repository state can change out-of-band. Malformed sidecars
    /// are skipped with a warning, not fatal. The result is sorted by the
    /// version ordering with exact duplicates removed.
    async fn list(&self, name: Option<&str>) -> KilnResult<Vec<SharedImage>>;

    /// Copy an artifact's bytes to `dest`
    ///
    /// Fails with `NotFound` if the repository has no such artifact.
    async fn fetch(&self, image: &SharedImage, dest: &Path) -> KilnResult<()>;

    /// Store an artifact and its sidecar, atomically for concurrent readers
    ///
    /// Bytes land under a hidden partial name and are renamed into place;
    /// the sidecar is written last and is the commit point for listings.
    /// The source file is left in place. Returns the record as stored.
    async fn store(&self, image: &SharedImage, source: &Path) -> KilnResult<SharedImage>;

    /// Remove an artifact and its sidecar
    ///
    /// Used by the retention policy only.
    async fn delete(&self, image: &SharedImage) -> KilnResult<()>;
}

/// Parse one serialized sidecar, logging and discarding malformed input
///
/// Listing recovers from corrupt metadata locally: the offending entry is
/// skipped and a warning recorded, the listing continues.
pub(crate) fn parse_sidecar(content: &str, origin: &str) -> Option<SharedImage> {
    match serde_json::from_str::<SharedImage>(content) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("Skipping corrupt metadata at {}: {}", origin, e);
            None
        }
    }
}

/// Hex SHA-256 of a file's contents, streamed
pub(crate) async fn sha256_file(path: &Path) -> KilnResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| KilnError::io(format!("opening {} for hashing", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 128 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| KilnError::io(format!("hashing {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
