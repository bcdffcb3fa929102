//! Local filesystem cache repository
//!
//! A flat directory of artifact files plus one metadata sidecar per
//! artifact. The sidecar is the commit point: a listing only reports images
//! whose sidecar exists and parses, so partially written artifacts are
//! never visible to concurrent readers.

use crate::error::{KilnError, KilnResult};
use crate::image::{SharedImage, METADATA_EXT};
use crate::repo::{parse_sidecar, sha256_file, Repository};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Directory holding shared images under the cache root
pub const SHARED_IMAGES_DIR: &str = "kiln_shared_images";

/// Shared-image repository on the local filesystem
pub struct LocalRepository {
    id: String,
    root: PathBuf,
}

impl LocalRepository {
    /// Open a local repository rooted at the cache root
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self::with_id("local", cache_root)
    }

    /// Open a local repository under a different logical id
    ///
    /// Directory-backed peers (network mounts, test fixtures) reuse the
    /// filesystem implementation under their own repository id.
    pub fn with_id(id: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: cache_root.into().join(SHARED_IMAGES_DIR),
        }
    }

    /// Repository root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an image's artifact file
    pub fn artifact_path(&self, image: &SharedImage) -> PathBuf {
        self.root.join(image.artifact_file_name())
    }

    /// Absolute path of an image's metadata sidecar
    pub fn metadata_path(&self, image: &SharedImage) -> PathBuf {
        self.root.join(image.metadata_file_name())
    }

    /// Path for in-flight transfer scratch files inside the repository root
    ///
    /// Scratch files live on the same filesystem as the final artifact so
    /// the commit is a rename, and their names never match a listing.
    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.root
            .join(format!(".{}-{}.partial", file_name, Uuid::new_v4()))
    }

    /// Ensure the repository root directory exists
    pub async fn ensure_root(&self) -> KilnResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| KilnError::io(format!("creating cache root {}", self.root.display()), e))
    }

    /// Move an artifact produced outside the repository into it
    ///
    /// Same atomicity contract as `store`, but the source file is consumed:
    /// renamed when source and repository share a filesystem, copied and
    /// removed otherwise. Used for builder output and pulled transfers.
    pub async fn import(&self, image: &SharedImage, source: &Path) -> KilnResult<SharedImage> {
        self.write_artifact(image, source, true).await
    }

    async fn write_artifact(
        &self,
        image: &SharedImage,
        source: &Path,
        consume_source: bool,
    ) -> KilnResult<SharedImage> {
        self.ensure_root().await?;

        let mut stored = image.clone();
        if stored.sha256.is_none() {
            stored.sha256 = Some(sha256_file(source).await?);
        }

        let final_path = self.artifact_path(image);
        let partial = self.scratch_path(&image.artifact_file_name());

        if consume_source {
            move_file(source, &partial).await?;
        } else {
            fs::copy(source, &partial).await.map_err(|e| {
                KilnError::io(
                    format!(
                        "copying {} to {}",
                        source.display(),
                        partial.display()
                    ),
                    e,
                )
            })?;
        }
        fs::rename(&partial, &final_path).await.map_err(|e| {
            KilnError::io(format!("renaming artifact into {}", final_path.display()), e)
        })?;

        self.write_sidecar(&stored).await?;

        debug!("Stored {} in {}", stored, self.root.display());
        Ok(stored)
    }

    /// Write the sidecar via temp-then-rename; this commits the image
    async fn write_sidecar(&self, image: &SharedImage) -> KilnResult<()> {
        let final_path = self.metadata_path(image);
        let partial = self.scratch_path(&image.metadata_file_name());

        let mut content = serde_json::to_string(image)?;
        content.push('\n');

        fs::write(&partial, content)
            .await
            .map_err(|e| KilnError::io(format!("writing sidecar {}", partial.display()), e))?;
        fs::rename(&partial, &final_path).await.map_err(|e| {
            KilnError::io(format!("renaming sidecar into {}", final_path.display()), e)
        })
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list(&self, name: Option<&str>) -> KilnResult<Vec<SharedImage>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| KilnError::io(format!("listing {}", self.root.display()), e))?;

        let mut images = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("listing {}", self.root.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT) {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping unreadable sidecar {}: {}", path.display(), e);
                    continue;
                }
            };

            let Some(image) = parse_sidecar(&content, &path.display().to_string()) else {
                continue;
            };

            if let Some(name) = name {
                if image.name != name {
                    continue;
                }
            }

            // A sidecar without its artifact is a leftover from an
            // interrupted delete; it does not represent usable bytes.
            if !self.artifact_path(&image).exists() {
                warn!(
                    "Skipping dangling sidecar {} (artifact missing)",
                    path.display()
                );
                continue;
            }

            images.insert(image);
        }

        Ok(images.into_iter().collect())
    }

    async fn fetch(&self, image: &SharedImage, dest: &Path) -> KilnResult<()> {
        let path = self.artifact_path(image);
        if !path.exists() {
            return Err(KilnError::NotFound {
                name: image.name.clone(),
                repo: self.id.clone(),
            });
        }

        fs::copy(&path, dest).await.map_err(|e| {
            KilnError::io(
                format!("copying {} to {}", path.display(), dest.display()),
                e,
            )
        })?;
        Ok(())
    }

    async fn store(&self, image: &SharedImage, source: &Path) -> KilnResult<SharedImage> {
        self.write_artifact(image, source, false).await
    }

    async fn delete(&self, image: &SharedImage) -> KilnResult<()> {
        // Sidecar first: once it is gone the image is no longer listed,
        // regardless of when the artifact bytes disappear.
        let meta = self.metadata_path(image);
        if meta.exists() {
            fs::remove_file(&meta)
                .await
                .map_err(|e| KilnError::io(format!("deleting sidecar {}", meta.display()), e))?;
        }

        let artifact = self.artifact_path(image);
        if artifact.exists() {
            fs::remove_file(&artifact).await.map_err(|e| {
                KilnError::io(format!("deleting artifact {}", artifact.display()), e)
            })?;
        }

        debug!("Deleted {} from {}", image, self.root.display());
        Ok(())
    }
}

/// Rename, falling back to copy-and-remove across filesystems
async fn move_file(source: &Path, dest: &Path) -> KilnResult<()> {
    if fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }

    fs::copy(source, dest).await.map_err(|e| {
        KilnError::io(
            format!("copying {} to {}", source.display(), dest.display()),
            e,
        )
    })?;
    fs::remove_file(source)
        .await
        .map_err(|e| KilnError::io(format!("removing {}", source.display()), e))
}
