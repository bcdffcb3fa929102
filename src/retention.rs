//! Retention policy for shared-image versions
//!
//! Keeps a bounded number of most-recent versions per name. Applied only to
//! the local cache (remote repositories are externally managed) and only
//! after a successful write, so a failed build never costs the
//! last-known-good version.

use crate::error::KilnResult;
use crate::image::SharedImage;
use crate::repo::Repository;
use tracing::info;

/// Delete all but the `keep` most-recent versions of `name`
///
/// Returns the deleted versions, oldest first. A `keep` of 0 deletes every
/// version; callers that treat 0 as "unlimited" must not invoke prune at
/// all in that case.
pub async fn prune(
    repo: &dyn Repository,
    name: &str,
    keep: usize,
) -> KilnResult<Vec<SharedImage>> {
    let versions = repo.list(Some(name)).await?;
    if versions.len() <= keep {
        return Ok(Vec::new());
    }

    let cutoff = versions.len() - keep;
    let mut deleted = Vec::with_capacity(cutoff);
    for image in versions.into_iter().take(cutoff) {
        repo.delete(&image).await?;
        deleted.push(image);
    }

    info!(
        "Pruned {} old version(s) of {} from repository {}",
        deleted.len(),
        name,
        repo.id()
    );
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KilnResult;
    use crate::image::{FileSystemType, ImageType};
    use crate::repo::LocalRepository;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::fs;

    fn image(name: &str, date: &str, build_id: &str) -> SharedImage {
        SharedImage::new(
            name,
            date.parse::<DateTime<Utc>>().unwrap(),
            build_id,
            ImageType::QCow2,
            FileSystemType::Ext4,
        )
    }

    async fn store_one(repo: &LocalRepository, img: &SharedImage) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("artifact");
        fs::write(&src, img.build_id.as_bytes()).await.unwrap();
        repo.store(img, &src).await.unwrap();
    }

    /// Delegates to a real repository while counting delete calls
    struct CountingRepo {
        inner: LocalRepository,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CountingRepo {
        fn id(&self) -> &str {
            self.inner.id()
        }

        async fn list(&self, name: Option<&str>) -> KilnResult<Vec<SharedImage>> {
            self.inner.list(name).await
        }

        async fn fetch(&self, img: &SharedImage, dest: &Path) -> KilnResult<()> {
            self.inner.fetch(img, dest).await
        }

        async fn store(&self, img: &SharedImage, source: &Path) -> KilnResult<SharedImage> {
            self.inner.store(img, source).await
        }

        async fn delete(&self, img: &SharedImage) -> KilnResult<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(img).await
        }
    }

    #[tokio::test]
    async fn prune_keeps_n_most_recent_with_exact_delete_count() {
        let dir = TempDir::new().unwrap();
        let counting = CountingRepo {
            inner: LocalRepository::new(dir.path()),
            deletes: AtomicUsize::new(0),
        };

        for (i, date) in [
            "2024-01-01T00:00:00Z",
            "2024-02-01T00:00:00Z",
            "2024-03-01T00:00:00Z",
            "2024-04-01T00:00:00Z",
            "2024-05-01T00:00:00Z",
        ]
        .iter()
        .enumerate()
        {
            store_one(&counting.inner, &image("base", date, &format!("b{}", i + 1))).await;
        }

        let deleted = prune(&counting, "base", 2).await.unwrap();

        assert_eq!(deleted.len(), 3);
        assert_eq!(counting.deletes.load(Ordering::SeqCst), 3);

        let remaining: Vec<_> = counting
            .inner
            .list(Some("base"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.build_id)
            .collect();
        assert_eq!(remaining, vec!["b4", "b5"]);
    }

    #[tokio::test]
    async fn prune_noop_when_under_limit() {
        let dir = TempDir::new().unwrap();
        let local = LocalRepository::new(dir.path());
        store_one(&local, &image("base", "2024-01-01T00:00:00Z", "b1")).await;

        let deleted = prune(&local, "base", 2).await.unwrap();
        assert!(deleted.is_empty());
        assert_eq!(local.list(Some("base")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_only_touches_the_named_image() {
        let dir = TempDir::new().unwrap();
        let local = LocalRepository::new(dir.path());

        store_one(&local, &image("base", "2024-01-01T00:00:00Z", "b1")).await;
        store_one(&local, &image("base", "2024-02-01T00:00:00Z", "b2")).await;
        store_one(&local, &image("other", "2023-01-01T00:00:00Z", "b0")).await;

        prune(&local, "base", 1).await.unwrap();

        assert_eq!(local.list(Some("base")).await.unwrap().len(), 1);
        assert_eq!(local.list(Some("other")).await.unwrap().len(), 1);
    }
}
