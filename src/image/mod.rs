//! Shared image identity and version ordering
//!
//! A shared image is a named, versioned disk-image artifact. Many images may
//! share a name; versions of one name are totally ordered by build date,
//! then build id, and "latest" means the maximum under that order. These
//! types and functions are pure and perform no I/O.

pub mod target;

pub use target::{ImageDestination, ImageResize, ImageSource};

use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// File extension of metadata sidecars
pub const METADATA_EXT: &str = "ksi";

/// Disk image container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    /// Raw block image
    Raw,
    /// QEMU copy-on-write v2
    QCow2,
    /// VMware disk
    Vmdk,
}

impl ImageType {
    /// File extension used for artifacts of this type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::QCow2 => "qcow2",
            Self::Vmdk => "vmdk",
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Filesystem placed inside an image, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemType {
    /// No filesystem (bare block device)
    #[serde(rename = "none")]
    NoFileSystem,
    Ext4,
    /// ext4 with the 64bit feature flag (mkfs.ext4 -O 64bit)
    #[serde(rename = "ext4-64bit")]
    Ext464,
    Iso9660,
    Vfat,
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoFileSystem => "none",
            Self::Ext4 => "ext4",
            Self::Ext464 => "ext4-64bit",
            Self::Iso9660 => "iso9660",
            Self::Vfat => "vfat",
        };
        write!(f, "{}", name)
    }
}

/// A versioned shared image artifact
///
/// Identity, equality and ordering are defined over `(name, build_date,
/// build_id)`. The remaining fields describe the artifact but do not
/// participate in version selection; build ids are unique per build
/// invocation, so two entries with equal identity but differing type or
/// filesystem are not expected to arise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedImage {
    /// Human-chosen image name; shared by all versions
    pub name: String,

    /// Instant the producing build invocation started
    pub build_date: DateTime<Utc>,

    /// Identifier unique per build invocation
    pub build_id: String,

    /// Container format of the artifact
    pub image_type: ImageType,

    /// Filesystem inside the artifact
    pub file_system: FileSystemType,

    /// Hex SHA-256 of the artifact bytes, recorded at store time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl SharedImage {
    /// Create a new shared image record
    pub fn new(
        name: impl Into<String>,
        build_date: DateTime<Utc>,
        build_id: impl Into<String>,
        image_type: ImageType,
        file_system: FileSystemType,
    ) -> Self {
        Self {
            name: name.into(),
            build_date,
            build_id: build_id.into(),
            image_type,
            file_system,
            sha256: None,
        }
    }

    /// File name of the artifact within a repository
    pub fn artifact_file_name(&self) -> String {
        format!(
            "{}_{}.{}",
            self.name,
            self.build_id,
            self.image_type.extension()
        )
    }

    /// File name of the metadata sidecar within a repository
    pub fn metadata_file_name(&self) -> String {
        format!("{}_{}.{}", self.name, self.build_id, METADATA_EXT)
    }

    /// Version key used for equality and ordering
    fn version_key(&self) -> (&str, DateTime<Utc>, &str) {
        (&self.name, self.build_date, &self.build_id)
    }
}

impl PartialEq for SharedImage {
    fn eq(&self, other: &Self) -> bool {
        self.version_key() == other.version_key()
    }
}

impl Eq for SharedImage {}

impl Hash for SharedImage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version_key().hash(state);
    }
}

impl PartialOrd for SharedImage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SharedImage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version_key().cmp(&other.version_key())
    }
}

impl fmt::Display for SharedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.name,
            self.build_date.format("%Y-%m-%d %H:%M:%S"),
            self.build_id
        )
    }
}

/// Validate an image name for use in repository file names
///
/// Names appear verbatim in artifact file names on local and remote
/// repositories, so path separators and whitespace are rejected.
pub fn validate_name(name: &str) -> KilnResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if name.contains(char::is_whitespace) {
        Some("name contains whitespace")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(KilnError::InvalidImageName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Group images by name, each group ordered by version
///
/// The partition is lossless up to exact version duplicates: inserting an
/// image whose `(name, build_date, build_id)` is already present is a no-op.
pub fn group_by_name(
    images: impl IntoIterator<Item = SharedImage>,
) -> BTreeMap<String, BTreeSet<SharedImage>> {
    let mut groups: BTreeMap<String, BTreeSet<SharedImage>> = BTreeMap::new();
    for image in images {
        groups.entry(image.name.clone()).or_default().insert(image);
    }
    groups
}

/// Select the maximum image under the version ordering
///
/// Callers filter to a single name first when they need the per-name
/// latest; across names the maximum is simply the last name's newest
/// version.
pub fn latest(images: impl IntoIterator<Item = SharedImage>) -> Option<SharedImage> {
    images.into_iter().max()
}

/// Select the latest version of one name
pub fn latest_by_name(
    images: impl IntoIterator<Item = SharedImage>,
    name: &str,
) -> Option<SharedImage> {
    latest(images.into_iter().filter(|i| i.name == name))
}
