//! Local file access for templates and settings

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;

use crate::errors::ProvisionError;

/// A file on the deploying machine
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve `name` against `base` unless it is already absolute
    pub fn resolve(base: &Path, name: impl AsRef<Path>) -> Self {
        let name = name.as_ref();
        if name.is_absolute() {
            Self::new(name)
        } else {
            Self::new(base.join(name))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that a regular file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read the file as UTF-8, `None` when it does not exist
    pub async fn read_string_opt(&self) -> Result<Option<String>, ProvisionError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_string(&self) -> Result<String, ProvisionError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ProvisionError> {
        let contents = self.read_string().await?;
        Ok(serde_json::from_str(&contents)?)
    }
}
