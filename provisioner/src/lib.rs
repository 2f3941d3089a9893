//! Provisioner Library
//!
//! Idempotent archive installs and templated file deployment on a remote
//! host, driven through a pluggable command executor.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod install;
pub mod logs;
pub mod packages;
pub mod remote;
pub mod settings;
pub mod template;
pub mod utils;

pub use app::Provisioner;
pub use errors::ProvisionError;
pub use install::archive::{ArchiveFormat, ArchiveSource};
pub use install::installer::{InstallOutcome, InstallTarget, RemoteArchiveInstaller};
pub use packages::{Apt, PackageManager};
pub use remote::command::{RemoteCommand, RemotePath};
pub use remote::executor::{CommandOutput, RemoteExecutor, ShellExecutor};
pub use settings::Settings;
pub use template::deployer::{Deployed, Permissions, TemplateDeployer, TemplateSpec};
