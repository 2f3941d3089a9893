//! Filesystem operations on the remote host

use std::sync::Arc;

use tracing::debug;

use crate::errors::ProvisionError;
use crate::remote::command::{RemoteCommand, RemotePath};
use crate::remote::executor::RemoteExecutor;

/// Outcome of [`RemoteFs::ensure_dir`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Created,
    AlreadyExists,
}

/// Remote filesystem built on a [`RemoteExecutor`]
#[derive(Clone)]
pub struct RemoteFs {
    executor: Arc<dyn RemoteExecutor>,
}

impl RemoteFs {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    /// `test <flag> <path>`: 0 is true, 1 is false, anything else is an error
    async fn test(&self, flag: &str, path: &RemotePath) -> Result<bool, ProvisionError> {
        let cmd = RemoteCommand::new("test").arg(flag).path(path);
        let output = self.executor.execute(&cmd).await?;
        match output.status {
            0 => Ok(true),
            1 => Ok(false),
            status => Err(ProvisionError::CommandFailed {
                command: cmd.render(),
                status,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    pub async fn exists(&self, path: &RemotePath) -> Result<bool, ProvisionError> {
        self.test("-e", path).await
    }

    pub async fn dir_exists(&self, path: &RemotePath) -> Result<bool, ProvisionError> {
        self.test("-d", path).await
    }

    pub async fn file_exists(&self, path: &RemotePath) -> Result<bool, ProvisionError> {
        self.test("-f", path).await
    }

    /// Resolve the remote user's home directory
    pub async fn home_dir(&self) -> Result<String, ProvisionError> {
        let output = self
            .executor
            .run(&RemoteCommand::new("printenv").arg("HOME"))
            .await?;
        let home = output.stdout.trim();
        if home.is_empty() {
            return Err(ProvisionError::ConfigError(
                "HOME is not set on the remote host".to_string(),
            ));
        }
        Ok(home.to_string())
    }

    /// `mkdir -p`
    pub async fn create_dir_all(&self, path: &RemotePath) -> Result<(), ProvisionError> {
        self.executor
            .run(&RemoteCommand::new("mkdir").arg("-p").path(path))
            .await?;
        Ok(())
    }

    /// Create a single directory. An existing directory is not an error; every
    /// other failure (missing parent, permissions, a file in the way) is.
    pub async fn ensure_dir(&self, path: &RemotePath) -> Result<DirStatus, ProvisionError> {
        let cmd = RemoteCommand::new("mkdir").path(path);
        let output = self.executor.execute(&cmd).await?;
        if output.success() {
            return Ok(DirStatus::Created);
        }
        if output.stderr.contains("File exists") && self.dir_exists(path).await? {
            debug!("Directory already exists: {}", path);
            return Ok(DirStatus::AlreadyExists);
        }
        Err(ProvisionError::CommandFailed {
            command: cmd.render(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    /// Write `contents` to `path`, replacing whatever is there
    pub async fn write_file(&self, path: &RemotePath, contents: &[u8]) -> Result<(), ProvisionError> {
        let cmd = RemoteCommand::new("tee")
            .path(path)
            .discard_stdout()
            .stdin(contents.to_vec());
        self.executor.run(&cmd).await?;
        Ok(())
    }

    pub async fn chmod(&self, path: &RemotePath, mode: &str) -> Result<(), ProvisionError> {
        self.executor
            .run(&RemoteCommand::new("chmod").arg(mode).path(path))
            .await?;
        Ok(())
    }

    /// Point `link` at `target`, replacing an existing link
    pub async fn symlink(&self, target: &RemotePath, link: &RemotePath) -> Result<(), ProvisionError> {
        self.executor
            .run(&RemoteCommand::new("ln").arg("-sfn").path(target).path(link))
            .await?;
        Ok(())
    }

    /// Best-effort `rm -f`
    pub async fn remove_file(&self, path: &RemotePath) -> Result<(), ProvisionError> {
        self.executor
            .run(&RemoteCommand::new("rm").arg("-f").path(path).warn_only())
            .await?;
        Ok(())
    }
}
