//! Components wired from settings

use std::sync::Arc;

use tracing::info;

use crate::errors::ProvisionError;
use crate::install::installer::RemoteArchiveInstaller;
use crate::packages::{Apt, PackageManager};
use crate::remote::executor::{RemoteExecutor, ShellExecutor};
use crate::remote::fs::RemoteFs;
use crate::settings::Settings;
use crate::template::deployer::TemplateDeployer;

/// Everything a provisioning task needs, sharing one executor
pub struct Provisioner {
    /// Executor all components send their commands through
    pub executor: Arc<dyn RemoteExecutor>,

    /// Remote filesystem helpers
    pub fs: RemoteFs,

    /// Native package manager
    pub packages: Arc<dyn PackageManager>,

    /// Archive installer
    pub installer: RemoteArchiveInstaller,

    /// Template deployer
    pub deployer: TemplateDeployer,
}

impl Provisioner {
    /// Connect through the configured transport
    pub fn from_settings(settings: &Settings) -> Result<Self, ProvisionError> {
        settings.validate()?;
        let executor: Arc<dyn RemoteExecutor> =
            Arc::new(ShellExecutor::from_settings(&settings.transport)?);
        info!("Provisioning over {:?}", settings.transport);
        Self::with_executor(executor, settings)
    }

    /// Use a caller-supplied executor, e.g. a fake in tests
    pub fn with_executor(
        executor: Arc<dyn RemoteExecutor>,
        settings: &Settings,
    ) -> Result<Self, ProvisionError> {
        let packages: Arc<dyn PackageManager> =
            Arc::new(Apt::new(executor.clone(), settings.packages.clone()));
        let installer =
            RemoteArchiveInstaller::from_settings(executor.clone(), packages.clone(), &settings.install)?;
        let deployer = TemplateDeployer::from_settings(executor.clone(), &settings.templates);

        Ok(Self {
            fs: RemoteFs::new(executor.clone()),
            executor,
            packages,
            installer,
            deployer,
        })
    }
}
