//! Build target vocabulary for the external image toolchain
//!
//! Closed sum types describing where an image's bytes come from, how they
//! are resized, and where the finished artifact goes. The build collaborator
//! receives these serialized in its environment; kiln itself only routes on
//! `ImageDestination`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the bytes of a new image come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// A freshly created empty image of the given size
    Empty { size_mb: u64 },
    /// An existing image file outside any repository
    External { path: PathBuf },
    /// A copy-on-write snapshot of a shared image from the cache
    CopyOnWrite { name: String },
}

/// How the produced image is resized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageResize {
    /// Grow or shrink to an explicit size
    Resize { size_mb: u64 },
    /// Shrink to the smallest size holding the content
    ShrinkToMinimum,
    /// Leave the size untouched
    KeepSize,
}

impl Default for ImageResize {
    fn default() -> Self {
        Self::KeepSize
    }
}

/// Where the finished artifact goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageDestination {
    /// Store under a name in the shared-image cache (and configured remotes)
    Share { name: String },
    /// Export to a plain file outside the cache
    LocalFile { path: PathBuf },
    /// Discard after the build (scratch images for intermediate steps)
    Transient,
}

impl ImageDestination {
    /// Short human-readable description for logs and progress lines
    pub fn describe(&self) -> String {
        match self {
            Self::Share { name } => format!("share as {}", name),
            Self::LocalFile { path } => format!("export to {}", path.display()),
            Self::Transient => "transient".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serde_tagged() {
        let src = ImageSource::CopyOnWrite {
            name: "base".to_string(),
        };
        let json = serde_json::to_string(&src).unwrap();
        assert!(json.contains("\"kind\":\"copy_on_write\""));
        let parsed: ImageSource = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, src);
    }

    #[test]
    fn resize_default_keeps_size() {
        assert_eq!(ImageResize::default(), ImageResize::KeepSize);
    }

    #[test]
    fn destination_describe() {
        let dest = ImageDestination::Share {
            name: "base".to_string(),
        };
        assert_eq!(dest.describe(), "share as base");
        assert_eq!(ImageDestination::Transient.describe(), "transient");
    }
}
