//! Incremental build/cache rule engine
//!
//! Resolves a requested image name to an artifact in the local cache: a
//! satisfactory cached version wins, then a pull from each configured
//! remote in order, then a fresh build. Each name is resolved at most once
//! per run — concurrent requests for the same name block on a per-name
//! claim and read the published result, while requests for different names
//! proceed in parallel.

use crate::builder::{ImageBuilder, ImageTarget};
use crate::error::{KilnError, KilnResult};
use crate::image;
use crate::image::SharedImage;
use crate::repo::{LocalRepository, Repository};
use crate::retention;
use crate::sync::SyncEngine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Run-scoped build identity
///
/// Created once per process invocation and threaded explicitly into every
/// component call: every artifact produced in one run shares this build id
/// and build date.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Identifier unique to this invocation
    pub build_id: String,
    /// Instant this invocation started
    pub build_date: DateTime<Utc>,
}

impl BuildContext {
    /// Create the context for a new run
    pub fn new() -> Self {
        Self {
            build_id: Uuid::new_v4().simple().to_string(),
            build_date: Utc::now(),
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A request for a named image
#[derive(Debug, Clone)]
pub struct ImageRequest {
    /// Requested image name
    pub name: String,
    /// Minimum acceptable build date; None accepts any version
    pub not_older_than: Option<DateTime<Utc>>,
}

impl ImageRequest {
    /// Request the latest available version of `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            not_older_than: None,
        }
    }

    /// Require a version built at or after `instant`
    pub fn not_older_than(mut self, instant: DateTime<Utc>) -> Self {
        self.not_older_than = Some(instant);
        self
    }

    /// Whether `image` satisfies this request's freshness bound
    pub fn satisfied_by(&self, image: &SharedImage) -> bool {
        match self.not_older_than {
            None => true,
            Some(bound) => image.build_date >= bound,
        }
    }
}

/// A resolved image: identity plus a handle to its bytes in the local cache
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    /// The resolved version
    pub image: SharedImage,
    /// Artifact path in the local cache
    pub path: PathBuf,
}

/// The build collaborator and what it is asked to produce
pub struct BuildDelegate {
    /// External builder invoked when no cached or remote version satisfies
    pub builder: Arc<dyn ImageBuilder>,
    /// Target description handed to the builder
    pub target: ImageTarget,
}

type Claim = Arc<Mutex<Option<ResolvedImage>>>;

/// Memoizing resolver for shared images
pub struct Resolver {
    ctx: BuildContext,
    local: LocalRepository,
    sync: SyncEngine,
    remotes: Vec<Arc<dyn Repository>>,
    builder: Option<BuildDelegate>,
    push_to: Vec<String>,
    keep_versions: usize,
    transfer_retries: u32,
    claims: Mutex<HashMap<String, Claim>>,
}

impl Resolver {
    /// Create a resolver over the local cache with no remotes or builder
    pub fn new(ctx: BuildContext, local: LocalRepository, sync: SyncEngine) -> Self {
        Self {
            ctx,
            local,
            sync,
            remotes: Vec::new(),
            builder: None,
            push_to: Vec::new(),
            keep_versions: 0,
            transfer_retries: 0,
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// Remote repositories consulted in order during resolution
    pub fn with_remotes(mut self, remotes: Vec<Arc<dyn Repository>>) -> Self {
        self.remotes = remotes;
        self
    }

    /// External build collaborator for cache misses
    pub fn with_builder(mut self, builder: Arc<dyn ImageBuilder>, target: ImageTarget) -> Self {
        self.builder = Some(BuildDelegate { builder, target });
        self
    }

    /// Repository ids receiving freshly built artifacts
    pub fn with_push_to(mut self, push_to: Vec<String>) -> Self {
        self.push_to = push_to;
        self
    }

    /// Versions kept per name after a successful build (0 = unlimited)
    pub fn with_keep_versions(mut self, keep_versions: usize) -> Self {
        self.keep_versions = keep_versions;
        self
    }

    /// Re-attempts per remote on retryable transfer errors
    pub fn with_transfer_retries(mut self, retries: u32) -> Self {
        self.transfer_retries = retries;
        self
    }

    /// The run's build context
    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// The local cache repository
    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    /// Resolve a request to an artifact in the local cache
    ///
    /// The first requester for a name performs the resolution; concurrent
    /// requesters for the same name block until it publishes and then
    /// observe the identical resolved image. Claims are per-name, so a
    /// resolution that itself requests a different name cannot deadlock.
    pub async fn resolve(&self, request: &ImageRequest) -> KilnResult<ResolvedImage> {
        image::validate_name(&request.name)?;

        let claim = self.claim(&request.name).await;
        let mut slot = claim.lock().await;

        if let Some(resolved) = slot.as_ref() {
            debug!("Reusing resolution of {} from this run", request.name);
            return Ok(resolved.clone());
        }

        let resolved = self.resolve_uncached(request).await?;
        *slot = Some(resolved.clone());
        Ok(resolved)
    }

    async fn claim(&self, name: &str) -> Claim {
        let mut claims = self.claims.lock().await;
        claims.entry(name.to_string()).or_default().clone()
    }

    async fn resolve_uncached(&self, request: &ImageRequest) -> KilnResult<ResolvedImage> {
        let name = &request.name;

        // Step 1: a satisfactory cached version wins immediately
        if let Some(best) = image::latest(self.local.list(Some(name)).await?) {
            if request.satisfied_by(&best) {
                debug!("Local cache satisfies request for {}", name);
                return Ok(self.resolved(best));
            }
            debug!("Local cache has {} but it is too old", best);
        }

        // Step 2: pull from each remote in configured order
        for remote in &self.remotes {
            match self.pull_with_retries(remote.as_ref(), name).await {
                Ok(pulled) if request.satisfied_by(&pulled) => {
                    return Ok(self.resolved(pulled));
                }
                Ok(pulled) => {
                    debug!(
                        "Pulled {} from {} but it does not satisfy the freshness bound",
                        pulled,
                        remote.id()
                    );
                }
                Err(KilnError::NotFound { .. }) => {
                    debug!("Repository {} has no {}", remote.id(), name);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Giving up on repository {} for {}: {}", remote.id(), name, e);
                }
                Err(e) => return Err(e),
            }
        }

        // Step 3: build fresh bytes
        let Some(delegate) = &self.builder else {
            return Err(KilnError::BuilderNotConfigured);
        };

        let built = delegate.builder.build(name, &self.ctx, &delegate.target).await?;
        let image = SharedImage::new(
            name.clone(),
            self.ctx.build_date,
            &self.ctx.build_id,
            built.image_type,
            built.file_system,
        );
        let stored = self.local.import(&image, &built.path).await?;
        let _ = fs::remove_dir_all(&built.scratch_dir).await;
        info!("Built {}", stored);

        // Push failures are warnings: the artifact stays valid locally
        for repo_id in &self.push_to {
            let Some(remote) = self.remotes.iter().find(|r| r.id() == repo_id) else {
                warn!("Push target {} is not a configured remote", repo_id);
                continue;
            };
            if let Err(e) = self.sync.push(&self.local, remote.as_ref(), &stored).await {
                warn!("Failed to push {} to repository {}: {}", stored, repo_id, e);
            }
        }

        if self.keep_versions > 0 {
            retention::prune(&self.local, name, self.keep_versions).await?;
        }

        Ok(self.resolved(stored))
    }

    async fn pull_with_retries(
        &self,
        remote: &dyn Repository,
        name: &str,
    ) -> KilnResult<SharedImage> {
        let mut attempt = 0;
        loop {
            match self.sync.pull(&self.local, remote, name).await {
                Err(e) if e.is_retryable() && attempt < self.transfer_retries => {
                    attempt += 1;
                    warn!(
                        "Retrying pull of {} from {} ({}/{}): {}",
                        name,
                        remote.id(),
                        attempt,
                        self.transfer_retries,
                        e
                    );
                }
                other => return other,
            }
        }
    }

    fn resolved(&self, image: SharedImage) -> ResolvedImage {
        ResolvedImage {
            path: self.local.artifact_path(&image),
            image,
        }
    }
}
