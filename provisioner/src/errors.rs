//! Error types for the provisioner

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The executor could not run the command at all
    #[error("Transport error: {0}")]
    Transport(String),

    /// A checked command exited non-zero
    #[error("Command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Invalid archive source: {0}")]
    InvalidSource(String),

    #[error("Invalid install target: {0}")]
    InvalidTarget(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid permissions: {0}")]
    InvalidPermissions(String),

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Extraction of {archive} failed: {reason}")]
    ExtractionFailed { archive: String, reason: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Missing template variables: {}", .0.join(", "))]
    MissingVariable(Vec<String>),

    #[error("Write to {path} failed: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Package install failed: {0}")]
    PackageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
