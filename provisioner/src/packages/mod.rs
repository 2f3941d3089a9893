//! Native package installation on the remote host

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::errors::ProvisionError;
use crate::remote::command::RemoteCommand;
use crate::remote::executor::RemoteExecutor;
use crate::settings::PackageSettings;

/// Installs packages with the host's package manager
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Install package names or paths of local package files
    async fn install(&self, packages: &[String]) -> Result<(), ProvisionError>;

    /// Install a space-separated package list
    async fn install_str(&self, packages: &str) -> Result<(), ProvisionError> {
        let packages: Vec<String> = packages.split_whitespace().map(str::to_string).collect();
        self.install(&packages).await
    }
}

/// `apt-get` on Debian-family hosts
pub struct Apt {
    executor: Arc<dyn RemoteExecutor>,
    settings: PackageSettings,
}

impl Apt {
    pub fn new(executor: Arc<dyn RemoteExecutor>, settings: PackageSettings) -> Self {
        Self { executor, settings }
    }

    fn apt_get(&self) -> Result<RemoteCommand, ProvisionError> {
        Ok(RemoteCommand::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")?
            .sudo(self.settings.use_sudo))
    }

    pub async fn update(&self) -> Result<(), ProvisionError> {
        self.executor
            .run(&self.apt_get()?.arg("update").arg("-q"))
            .await
            .map_err(|e| ProvisionError::PackageError(format!("apt-get update failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl PackageManager for Apt {
    async fn install(&self, packages: &[String]) -> Result<(), ProvisionError> {
        if packages.is_empty() {
            return Ok(());
        }
        if self.settings.update_before_install {
            self.update().await?;
        }

        info!("Installing packages: {}", packages.join(" "));
        let cmd = self
            .apt_get()?
            .args(["install", "-y", "-q"])
            .args(packages.iter().cloned());
        self.executor
            .run(&cmd)
            .await
            .map_err(|e| ProvisionError::PackageError(e.to_string()))?;
        Ok(())
    }
}
