//! Configuration schema for Kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`. Remote
//! repositories are configured one TOML section per repository, named
//! `<repoId>-repo`; any other unknown section is a startup error.

use crate::builder::ImageTarget;
use crate::error::{KilnError, KilnResult};
use crate::image::{FileSystemType, ImageResize, ImageSource, ImageType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local cache settings
    pub cache: CacheConfig,

    /// Remote transfer settings
    pub transfer: TransferConfig,

    /// External build collaborator settings
    pub build: BuildConfig,

    /// Raw `<repoId>-repo` sections, validated by `finalize`
    #[serde(flatten)]
    sections: BTreeMap<String, toml::Value>,

    #[serde(skip)]
    remotes: BTreeMap<String, RemoteRepoConfig>,
}

impl Config {
    /// Validate raw sections and resolve remote repository configs
    ///
    /// Malformed configuration is fatal here, at startup, before any
    /// repository operation is attempted.
    pub fn finalize(mut self, path: &Path) -> KilnResult<Self> {
        for (section, value) in &self.sections {
            let repo_id = match section.strip_suffix("-repo") {
                Some(id) if !id.is_empty() => id,
                _ => {
                    return Err(KilnError::UnknownSection {
                        section: section.clone(),
                    })
                }
            };

            let repo: RemoteRepoConfig =
                value
                    .clone()
                    .try_into()
                    .map_err(|e| KilnError::ConfigInvalid {
                        path: path.to_path_buf(),
                        reason: format!("[{}]: {}", section, e),
                    })?;
            self.remotes.insert(repo_id.to_string(), repo);
        }

        for repo_id in self.build.push_to.iter().chain(&self.transfer.pull_order) {
            if !self.remotes.contains_key(repo_id) {
                return Err(KilnError::RepoNotConfigured(repo_id.clone()));
            }
        }

        Ok(self)
    }

    /// Configured remote repositories, by id
    pub fn remotes(&self) -> &BTreeMap<String, RemoteRepoConfig> {
        &self.remotes
    }

    /// Remote repository ids in pull order
    ///
    /// `transfer.pull_order` when set, otherwise all remotes by id.
    pub fn pull_order(&self) -> Vec<String> {
        if self.transfer.pull_order.is_empty() {
            self.remotes.keys().cloned().collect()
        } else {
            self.transfer.pull_order.clone()
        }
    }

    /// Look up one remote repository by id
    pub fn remote(&self, repo_id: &str) -> KilnResult<&RemoteRepoConfig> {
        self.remotes
            .get(repo_id)
            .ok_or_else(|| KilnError::RepoNotConfigured(repo_id.to_string()))
    }
}

/// Local cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory; defaults to the platform cache dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Versions kept per image name after a successful build (0 = keep all)
    pub keep_versions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            keep_versions: 0,
        }
    }
}

impl CacheConfig {
    /// The effective cache root directory
    pub fn resolved_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
        })
    }
}

/// Remote transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,

    /// Re-attempts per remote on retryable transfer errors
    pub retries: u32,

    /// Order remotes are consulted during pulls; empty = all remotes by id
    pub pull_order: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            retries: 1,
            pull_order: Vec::new(),
        }
    }
}

/// External build collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program producing image bytes; builds fail fast when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments passed to the build command
    pub args: Vec<String>,

    /// Container format of built artifacts
    pub image_type: ImageType,

    /// Filesystem inside built artifacts
    pub file_system: FileSystemType,

    /// Where a built image's initial bytes come from
    pub source: ImageSource,

    /// Resize applied to built images
    pub resize: ImageResize,

    /// Repository ids receiving freshly built artifacts
    pub push_to: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            image_type: ImageType::QCow2,
            file_system: FileSystemType::Ext4,
            source: ImageSource::Empty { size_mb: 1024 },
            resize: ImageResize::KeepSize,
            push_to: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// The target description handed to the external builder
    pub fn target(&self) -> ImageTarget {
        ImageTarget {
            source: self.source.clone(),
            resize: self.resize,
            image_type: self.image_type,
            file_system: self.file_system,
        }
    }
}

/// One `<repoId>-repo` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepoConfig {
    /// Root directory on the remote host
    pub remote_path: PathBuf,

    /// Private key used for the remote shell
    pub ssh_priv_key_file: PathBuf,

    /// Hostname or address
    pub ssh_remote_host: String,

    /// TCP port
    #[serde(default = "default_ssh_port")]
    pub ssh_remote_port: u16,

    /// Remote login user
    pub ssh_remote_user: String,
}

fn default_ssh_port() -> u16 {
    22
}
