//! External build collaborator interface
//!
//! Producing an image's bytes (formatting, partitioning, content rendering)
//! is the job of an external toolchain invoked as a process. Kiln only
//! defines the seam: what a build is asked for and what it hands back.

use crate::error::{KilnError, KilnResult};
use crate::image::{FileSystemType, ImageResize, ImageSource, ImageType};
use crate::resolver::BuildContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

/// What the external toolchain is asked to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTarget {
    /// Where the image's initial bytes come from
    pub source: ImageSource,
    /// Resize applied to the produced image
    #[serde(default)]
    pub resize: ImageResize,
    /// Container format of the artifact
    pub image_type: ImageType,
    /// Filesystem inside the artifact
    pub file_system: FileSystemType,
}

/// A finished build: the produced bytes and their description
#[derive(Debug, Clone)]
pub struct BuiltImage {
    /// Container format of the produced artifact
    pub image_type: ImageType,
    /// Filesystem inside the produced artifact
    pub file_system: FileSystemType,
    /// Scratch path of the produced bytes
    pub path: PathBuf,
    /// Scratch directory to remove once the bytes are imported
    pub scratch_dir: PathBuf,
}

/// External build collaborator
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Produce new image bytes for `name`
    ///
    /// A failed build must leave no trace: implementations work in a
    /// scratch directory and clean it up on failure.
    async fn build(
        &self,
        name: &str,
        ctx: &BuildContext,
        target: &ImageTarget,
    ) -> KilnResult<BuiltImage>;
}

/// Builder that shells out to a configured command
///
/// The command receives the build parameters in its environment and must
/// write the finished image to `KILN_OUTPUT`:
///
/// | variable | value |
/// |---|---|
/// | `KILN_IMAGE_NAME` | requested image name |
/// | `KILN_BUILD_ID` | build id of this invocation |
/// | `KILN_BUILD_DATE` | RFC3339 build date |
/// | `KILN_TARGET` | JSON-serialized [`ImageTarget`] |
/// | `KILN_OUTPUT` | path the image must be written to |
pub struct CommandImageBuilder {
    program: String,
    args: Vec<String>,
    scratch_root: PathBuf,
}

impl CommandImageBuilder {
    /// Create a builder running `program` with `args`, working under
    /// `scratch_root`
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            scratch_root: scratch_root.into(),
        }
    }
}

#[async_trait]
impl ImageBuilder for CommandImageBuilder {
    async fn build(
        &self,
        name: &str,
        ctx: &BuildContext,
        target: &ImageTarget,
    ) -> KilnResult<BuiltImage> {
        let scratch_dir = self
            .scratch_root
            .join(format!("kiln-build-{}-{}", name, ctx.build_id));
        fs::create_dir_all(&scratch_dir)
            .await
            .map_err(|e| KilnError::io(format!("creating {}", scratch_dir.display()), e))?;

        let output_path = scratch_dir.join(format!("{}.{}", name, target.image_type.extension()));

        info!("Building image {} with {}", name, self.program);
        debug!("Build scratch directory: {}", scratch_dir.display());

        let result = Command::new(&self.program)
            .args(&self.args)
            .env("KILN_IMAGE_NAME", name)
            .env("KILN_BUILD_ID", &ctx.build_id)
            .env("KILN_BUILD_DATE", ctx.build_date.to_rfc3339())
            .env("KILN_TARGET", serde_json::to_string(target)?)
            .env("KILN_OUTPUT", &output_path)
            .current_dir(&scratch_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| KilnError::command_failed(self.program.clone(), e));

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let _ = fs::remove_dir_all(&scratch_dir).await;
                return Err(e);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let _ = fs::remove_dir_all(&scratch_dir).await;
            return Err(KilnError::build_failed(
                name,
                format!("{} exited with {}: {}", self.program, output.status, stderr),
            ));
        }

        if !output_path.exists() {
            let _ = fs::remove_dir_all(&scratch_dir).await;
            return Err(KilnError::build_failed(
                name,
                format!("{} produced no output at KILN_OUTPUT", self.program),
            ));
        }

        Ok(BuiltImage {
            image_type: target.image_type,
            file_system: target.file_system,
            path: output_path,
            scratch_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn target() -> ImageTarget {
        ImageTarget {
            source: ImageSource::Empty { size_mb: 64 },
            resize: ImageResize::KeepSize,
            image_type: ImageType::Raw,
            file_system: FileSystemType::Ext4,
        }
    }

    #[tokio::test]
    async fn build_writes_output_with_environment() {
        let dir = TempDir::new().unwrap();
        let builder = CommandImageBuilder::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"printf '%s' "$KILN_IMAGE_NAME" > "$KILN_OUTPUT""#.to_string(),
            ],
            dir.path(),
        );

        let ctx = BuildContext::new();
        let built = builder.build("base", &ctx, &target()).await.unwrap();

        assert_eq!(built.image_type, ImageType::Raw);
        assert_eq!(fs::read(&built.path).await.unwrap(), b"base");
        fs::remove_dir_all(&built.scratch_dir).await.unwrap();
    }

    #[tokio::test]
    async fn failed_build_names_image_and_cleans_scratch() {
        let dir = TempDir::new().unwrap();
        let builder = CommandImageBuilder::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
            dir.path(),
        );

        let ctx = BuildContext::new();
        let err = builder.build("newimg", &ctx, &target()).await.unwrap_err();

        match err {
            KilnError::BuildFailed { name, reason } => {
                assert_eq!(name, "newimg");
                assert!(reason.contains("boom"));
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }

        // Scratch directory is gone
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn build_without_output_fails() {
        let dir = TempDir::new().unwrap();
        let builder =
            CommandImageBuilder::new("sh", vec!["-c".to_string(), "true".to_string()], dir.path());

        let ctx = BuildContext::new();
        let err = builder.build("base", &ctx, &target()).await.unwrap_err();
        assert!(matches!(err, KilnError::BuildFailed { .. }));
    }
}
