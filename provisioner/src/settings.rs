//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::remote::command::RemotePath;

/// Provisioner settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// How commands reach the remote host
    #[serde(default)]
    pub transport: TransportSettings,

    /// Archive installer configuration
    #[serde(default)]
    pub install: InstallSettings,

    /// Template deployer configuration
    #[serde(default)]
    pub templates: TemplateSettings,

    /// Package manager configuration
    #[serde(default)]
    pub packages: PackageSettings,
}

impl Settings {
    /// Read and validate a JSON settings file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProvisionError> {
        let settings: Settings = File::new(path.as_ref()).read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        if let TransportSettings::Ssh { host, .. } = &self.transport {
            if host.trim().is_empty() {
                return Err(ProvisionError::ConfigError(
                    "transport.host must be set for ssh".to_string(),
                ));
            }
        }

        RemotePath::parse(&self.install.temp_dir)
            .map_err(|e| ProvisionError::ConfigError(format!("install.temp_dir: {}", e)))?;

        if let Some(marker) = &self.install.completion_marker {
            if marker.is_empty() || marker.contains('/') || marker == "." || marker == ".." {
                return Err(ProvisionError::ConfigError(format!(
                    "install.completion_marker must be a plain file name, got {:?}",
                    marker
                )));
            }
        }
        Ok(())
    }
}

/// Transport settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportSettings {
    /// Run commands on this machine
    #[default]
    Local,

    /// Run commands through the system ssh client
    Ssh {
        host: String,

        #[serde(default)]
        user: Option<String>,

        #[serde(default)]
        port: Option<u16>,

        #[serde(default)]
        identity_file: Option<PathBuf>,

        /// Extra `-o` options
        #[serde(default)]
        options: Vec<String>,
    },
}

/// Tool used on the remote host to fetch archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Downloader {
    #[default]
    Wget,
    Curl,
}

/// Archive installer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSettings {
    /// Remote directory for downloaded archives
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    #[serde(default)]
    pub downloader: Downloader,

    /// File written inside the target once extraction finished.
    /// `null` falls back to a bare directory-existence check.
    #[serde(default = "default_completion_marker")]
    pub completion_marker: Option<String>,

    /// Leading path components dropped from tar entries
    #[serde(default = "default_strip_components")]
    pub strip_components: u32,
}

fn default_temp_dir() -> String {
    "/tmp".to_string()
}

fn default_completion_marker() -> Option<String> {
    Some(".provisioned".to_string())
}

fn default_strip_components() -> u32 {
    1
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            downloader: Downloader::default(),
            completion_marker: default_completion_marker(),
            strip_components: default_strip_components(),
        }
    }
}

/// Template deployer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// Local directory that relative template names resolve against
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,
}

fn default_resource_dir() -> PathBuf {
    PathBuf::from("resources")
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            resource_dir: default_resource_dir(),
        }
    }
}

/// Package manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSettings {
    #[serde(default = "default_true")]
    pub use_sudo: bool,

    /// Refresh the package index before each install
    #[serde(default)]
    pub update_before_install: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            use_sudo: true,
            update_before_install: false,
        }
    }
}
