//! SSH-backed remote repository
//!
//! Implements the Repository trait over fresh ssh/scp invocations, one per
//! operation. Connections are stateless: no pooling, no persistent channel.
//! Concurrent transfers to the same remote are safe because artifact file
//! names are distinct per build id.

use crate::config::schema::RemoteRepoConfig;
use crate::error::{KilnError, KilnResult};
use crate::image::{SharedImage, METADATA_EXT};
use crate::repo::{parse_sidecar, Repository};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::fs;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Shared-image repository reached over an ssh remote shell
pub struct SshRepository {
    repo_id: String,
    remote_path: PathBuf,
    key_file: PathBuf,
    host: String,
    port: u16,
    user: String,
}

impl SshRepository {
    /// Create a remote repository from its configuration section
    pub fn from_config(repo_id: impl Into<String>, config: &RemoteRepoConfig) -> Self {
        Self {
            repo_id: repo_id.into(),
            remote_path: config.remote_path.clone(),
            key_file: config.ssh_priv_key_file.clone(),
            host: config.ssh_remote_host.clone(),
            port: config.ssh_remote_port,
            user: config.ssh_remote_user.clone(),
        }
    }

    /// `user@host` target for ssh and scp
    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Path of a file under the remote root
    fn remote_file(&self, file_name: &str) -> String {
        format!("{}/{}", self.remote_path.display(), file_name)
    }

    /// Arguments for running `command` through the remote shell
    fn ssh_args(&self, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.destination(),
            command.to_string(),
        ]
    }

    /// Arguments for copying a local file to the remote
    fn scp_upload_args(&self, source: &Path, remote_file: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-P".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            source.display().to_string(),
            format!("{}:{}", self.destination(), remote_file),
        ]
    }

    /// Arguments for copying a remote file to a local path
    fn scp_download_args(&self, remote_file: &str, dest: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_file.display().to_string(),
            "-P".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            format!("{}:{}", self.destination(), remote_file),
            dest.display().to_string(),
        ]
    }

    /// Run a transfer command, mapping failure to `TransferFailed`
    ///
    /// `kill_on_drop` terminates the underlying process when the future is
    /// dropped, which is how a timeout firing mid-transfer stops the
    /// in-flight ssh/scp instead of leaving it running.
    async fn run(&self, program: &str, args: &[String]) -> KilnResult<Output> {
        debug!("Executing: {} {:?} (repository: {})", program, args, self.repo_id);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| KilnError::command_failed(format!("{} {:?}", program, args), e))?;

        Ok(output)
    }

    /// Run and require success
    async fn run_checked(&self, program: &str, args: &[String]) -> KilnResult<Output> {
        let output = self.run(program, args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(KilnError::transfer_failed(
                &self.repo_id,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Upload a file to a hidden partial name, then rename it into place
    async fn upload_atomic(&self, source: &Path, file_name: &str) -> KilnResult<()> {
        let partial = self.remote_file(&format!(".{}-{}.partial", file_name, Uuid::new_v4()));
        let final_path = self.remote_file(file_name);

        self.run_checked("scp", &self.scp_upload_args(source, &partial))
            .await?;
        self.run_checked(
            "ssh",
            &self.ssh_args(&format!(
                "mv {} {}",
                shell_quote(&partial),
                shell_quote(&final_path)
            )),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for SshRepository {
    fn id(&self) -> &str {
        &self.repo_id
    }

    async fn list(&self, name: Option<&str>) -> KilnResult<Vec<SharedImage>> {
        // One shell invocation reads every sidecar; each sidecar is a
        // single JSON line, so the concatenated output parses line-wise.
        let command = format!(
            "cat {}/*.{} 2>/dev/null; true",
            shell_quote(&self.remote_path.display().to_string()),
            METADATA_EXT
        );
        let output = self.run_checked("ssh", &self.ssh_args(&command)).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut images = BTreeSet::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let Some(image) = parse_sidecar(line, &self.repo_id) else {
                continue;
            };
            if let Some(name) = name {
                if image.name != name {
                    continue;
                }
            }
            images.insert(image);
        }

        Ok(images.into_iter().collect())
    }

    async fn fetch(&self, image: &SharedImage, dest: &Path) -> KilnResult<()> {
        let remote = self.remote_file(&image.artifact_file_name());
        let output = self.run("scp", &self.scp_download_args(&remote, dest)).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_missing_file_error(&stderr) {
            Err(KilnError::NotFound {
                name: image.name.clone(),
                repo: self.repo_id.clone(),
            })
        } else {
            Err(KilnError::transfer_failed(&self.repo_id, stderr))
        }
    }

    async fn store(&self, image: &SharedImage, source: &Path) -> KilnResult<SharedImage> {
        self.run_checked(
            "ssh",
            &self.ssh_args(&format!(
                "mkdir -p {}",
                shell_quote(&self.remote_path.display().to_string())
            )),
        )
        .await?;

        self.upload_atomic(source, &image.artifact_file_name())
            .await?;

        // Sidecar last: it is the listing commit point on the remote too.
        let mut sidecar = serde_json::to_string(image)?;
        sidecar.push('\n');
        let local_tmp = std::env::temp_dir().join(format!("kiln-sidecar-{}", Uuid::new_v4()));
        fs::write(&local_tmp, sidecar)
            .await
            .map_err(|e| KilnError::io(format!("writing {}", local_tmp.display()), e))?;

        let result = self
            .upload_atomic(&local_tmp, &image.metadata_file_name())
            .await;
        let _ = fs::remove_file(&local_tmp).await;
        result?;

        debug!("Stored {} in repository {}", image, self.repo_id);
        Ok(image.clone())
    }

    async fn delete(&self, image: &SharedImage) -> KilnResult<()> {
        // Sidecar named first so the image drops out of listings even if
        // the artifact removal is interrupted.
        let command = format!(
            "rm -f {} {}",
            shell_quote(&self.remote_file(&image.metadata_file_name())),
            shell_quote(&self.remote_file(&image.artifact_file_name())),
        );
        self.run_checked("ssh", &self.ssh_args(&command)).await?;
        Ok(())
    }
}

/// Quote a string for the remote POSIX shell
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Classify scp stderr as a missing remote file
fn is_missing_file_error(stderr: &str) -> bool {
    stderr.contains("No such file or directory")
}
