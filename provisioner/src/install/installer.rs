//! Idempotent archive installation on the remote host

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::ProvisionError;
use crate::install::archive::{ArchiveFormat, ArchiveSource};
use crate::packages::PackageManager;
use crate::remote::command::{RemoteCommand, RemotePath};
use crate::remote::executor::RemoteExecutor;
use crate::remote::fs::RemoteFs;
use crate::settings::{Downloader, InstallSettings};
use crate::utils::{short_digest, version_info};

/// Where an archive's contents should end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    path: RemotePath,
    link: Option<RemotePath>,
}

impl InstallTarget {
    pub fn new(path: &str) -> Result<Self, ProvisionError> {
        Ok(Self {
            path: RemotePath::parse(path)?,
            link: None,
        })
    }

    /// `parent/<archive basename>`, e.g. `$HOME/lib/leveldb-1.7.0`
    pub fn versioned(parent: &str, source: &ArchiveSource) -> Result<Self, ProvisionError> {
        Ok(Self {
            path: RemotePath::parse(parent)?.join(source.basename()),
            link: None,
        })
    }

    /// Also point `link` at the target after a fresh install
    pub fn with_link(mut self, link: &str) -> Result<Self, ProvisionError> {
        self.link = Some(RemotePath::parse(link)?);
        Ok(self)
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    pub fn link(&self) -> Option<&RemotePath> {
        self.link.as_ref()
    }
}

/// Successful result of [`RemoteArchiveInstaller::install`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The archive was downloaded and extracted to this path
    Installed(String),
    /// The target was already populated; nothing was done
    AlreadyInstalled(String),
}

impl InstallOutcome {
    pub fn path(&self) -> &str {
        match self {
            InstallOutcome::Installed(path) | InstallOutcome::AlreadyInstalled(path) => path,
        }
    }
}

/// State of a target on the remote host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Absent,
    /// Directory exists but the completion marker is missing
    Partial,
    /// Something other than a directory is at the target path
    Occupied,
    Complete,
}

/// Installer options
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub temp_dir: RemotePath,
    pub downloader: Downloader,
    pub completion_marker: Option<String>,
    pub strip_components: u32,
}

impl InstallOptions {
    pub fn from_settings(settings: &InstallSettings) -> Result<Self, ProvisionError> {
        Ok(Self {
            temp_dir: RemotePath::parse(&settings.temp_dir)?,
            downloader: settings.downloader,
            completion_marker: settings.completion_marker.clone(),
            strip_components: settings.strip_components,
        })
    }
}

/// Downloads archives onto the remote host and unpacks them
pub struct RemoteArchiveInstaller {
    fs: RemoteFs,
    packages: Arc<dyn PackageManager>,
    options: InstallOptions,
}

impl RemoteArchiveInstaller {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        packages: Arc<dyn PackageManager>,
        options: InstallOptions,
    ) -> Self {
        Self {
            fs: RemoteFs::new(executor),
            packages,
            options,
        }
    }

    /// Build an installer from the `install` section of the settings
    pub fn from_settings(
        executor: Arc<dyn RemoteExecutor>,
        packages: Arc<dyn PackageManager>,
        settings: &InstallSettings,
    ) -> Result<Self, ProvisionError> {
        Ok(Self::new(executor, packages, InstallOptions::from_settings(settings)?))
    }

    pub fn options(&self) -> &InstallOptions {
        &self.options
    }

    /// Install `source` into `target` unless it is already there.
    ///
    /// Fails with `UnsupportedArchiveFormat` before touching the host,
    /// `DownloadFailed` before the target is created, and `ExtractionFailed`
    /// when unpacking or the package install exits non-zero.
    pub async fn install(
        &self,
        source: &ArchiveSource,
        target: &InstallTarget,
    ) -> Result<InstallOutcome, ProvisionError> {
        let format = source.format()?;
        let target_path = target.path();

        let state = self.probe(target_path).await?;
        match state {
            TargetState::Complete => {
                info!("{} already installed in {}", source.file_name(), target_path);
                return Ok(InstallOutcome::AlreadyInstalled(target_path.to_string()));
            }
            TargetState::Partial => {
                warn!(
                    "{} exists without a completion marker; extracting again",
                    target_path
                );
            }
            TargetState::Occupied => {
                warn!("{} exists and is not a directory", target_path);
            }
            TargetState::Absent => {}
        }

        info!("Installing {} into {}", source, target_path);

        let archive = self.archive_path(source);
        self.download(source, &archive).await?;

        if let Err(e) = self.unpack(format, &archive, target_path).await {
            if state == TargetState::Absent && self.options.completion_marker.is_none() {
                // Without a marker a leftover directory would read as installed.
                // Only a path that was absent before this call is removed.
                self.discard(target_path).await;
            }
            return Err(e);
        }

        self.mark_complete(source, target_path).await?;

        if let Some(link) = target.link() {
            self.fs
                .symlink(target_path, link)
                .await
                .map_err(|e| ProvisionError::WriteFailed {
                    path: link.to_string(),
                    reason: e.to_string(),
                })?;
        }

        info!("Installed {} into {}", source.file_name(), target_path);
        Ok(InstallOutcome::Installed(target_path.to_string()))
    }

    /// Whether `target` is recognised as fully installed
    pub async fn is_installed(&self, target: &InstallTarget) -> Result<bool, ProvisionError> {
        Ok(self.probe(target.path()).await? == TargetState::Complete)
    }

    async fn probe(&self, target: &RemotePath) -> Result<TargetState, ProvisionError> {
        match &self.options.completion_marker {
            Some(marker) => {
                if self.fs.file_exists(&target.join(marker)).await? {
                    Ok(TargetState::Complete)
                } else if self.fs.dir_exists(target).await? {
                    Ok(TargetState::Partial)
                } else {
                    self.probe_missing_dir(target).await
                }
            }
            None => {
                if self.fs.dir_exists(target).await? {
                    Ok(TargetState::Complete)
                } else {
                    self.probe_missing_dir(target).await
                }
            }
        }
    }

    async fn probe_missing_dir(&self, target: &RemotePath) -> Result<TargetState, ProvisionError> {
        if self.fs.exists(target).await? {
            Ok(TargetState::Occupied)
        } else {
            Ok(TargetState::Absent)
        }
    }

    /// Temp location, prefixed with a digest of the URL so equal file names
    /// from different URLs do not collide
    fn archive_path(&self, source: &ArchiveSource) -> RemotePath {
        let digest = short_digest(source.as_str().as_bytes(), 12);
        self.options
            .temp_dir
            .join(&format!("{}-{}", digest, source.file_name()))
    }

    fn download_command(&self, source: &ArchiveSource, dest: &RemotePath) -> RemoteCommand {
        match self.options.downloader {
            Downloader::Wget => RemoteCommand::new("wget")
                .arg("-q")
                .arg("-O")
                .path(dest)
                .arg(source.as_str()),
            Downloader::Curl => RemoteCommand::new("curl")
                .arg("-fsSL")
                .arg("-o")
                .path(dest)
                .arg(source.as_str()),
        }
    }

    async fn download(&self, source: &ArchiveSource, dest: &RemotePath) -> Result<(), ProvisionError> {
        let download_failed = |reason: String| ProvisionError::DownloadFailed {
            url: source.to_string(),
            reason,
        };

        self.fs
            .create_dir_all(&self.options.temp_dir)
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        debug!("Downloading {} to {}", source, dest);
        let output = self
            .fs
            .executor()
            .execute(&self.download_command(source, dest))
            .await?;

        if !output.success() {
            // wget leaves an empty file behind on 404
            self.fs.remove_file(dest).await?;
            let reason = match output.stderr.trim() {
                "" => format!("exit status {}", output.status),
                stderr => stderr.to_string(),
            };
            return Err(download_failed(reason));
        }
        Ok(())
    }

    async fn unpack(
        &self,
        format: ArchiveFormat,
        archive: &RemotePath,
        target: &RemotePath,
    ) -> Result<(), ProvisionError> {
        let extraction_failed = |reason: String| ProvisionError::ExtractionFailed {
            archive: archive.to_string(),
            reason,
        };

        let Some(flags) = format.tar_flags() else {
            let package = if archive.is_home_relative() {
                archive.with_home(&self.fs.home_dir().await?)
            } else {
                archive.to_string()
            };
            self.packages
                .install(&[package])
                .await
                .map_err(|e| extraction_failed(e.to_string()))?;
            // Holds the completion marker
            return self
                .fs
                .create_dir_all(target)
                .await
                .map_err(|e| extraction_failed(e.to_string()));
        };

        self.fs
            .create_dir_all(target)
            .await
            .map_err(|e| extraction_failed(e.to_string()))?;

        let mut cmd = RemoteCommand::new("tar")
            .arg(flags)
            .path(archive)
            .arg("-C")
            .path(target);
        if self.options.strip_components > 0 {
            cmd = cmd.arg(format!("--strip-components={}", self.options.strip_components));
        }

        debug!("Extracting {} into {}", archive, target);
        self.fs
            .executor()
            .run(&cmd)
            .await
            .map_err(|e| extraction_failed(e.to_string()))?;
        Ok(())
    }

    async fn mark_complete(&self, source: &ArchiveSource, target: &RemotePath) -> Result<(), ProvisionError> {
        let Some(marker) = &self.options.completion_marker else {
            return Ok(());
        };
        let marker_path = target.join(marker);
        let contents = format!(
            "source={}\ninstalled_at={}\nprovisioner={}\n",
            source,
            chrono::Utc::now().to_rfc3339(),
            version_info().version
        );
        self.fs
            .write_file(&marker_path, contents.as_bytes())
            .await
            .map_err(|e| ProvisionError::WriteFailed {
                path: marker_path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn discard(&self, target: &RemotePath) {
        let cmd = RemoteCommand::new("rm").arg("-rf").path(target).warn_only();
        if let Err(e) = self.fs.executor().run(&cmd).await {
            warn!("Failed to remove partial install {}: {}", target, e);
        }
    }
}
