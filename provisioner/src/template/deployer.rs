//! Render templates and write them to the remote host

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::remote::command::RemotePath;
use crate::remote::executor::RemoteExecutor;
use crate::remote::fs::RemoteFs;
use crate::settings::TemplateSettings;
use crate::template::render::Template;

static MODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-7]{3,4}|[ugoa]*[-+=][rwxXst]*(?:,[ugoa]*[-+=][rwxXst]*)*)$")
        .expect("valid chmod mode regex")
});

/// A chmod mode, octal (`755`) or symbolic (`+x`, `u+rwx,go-w`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permissions(String);

impl Permissions {
    pub fn parse(mode: &str) -> Result<Self, ProvisionError> {
        if MODE_RE.is_match(mode) {
            Ok(Self(mode.to_string()))
        } else {
            Err(ProvisionError::InvalidPermissions(mode.to_string()))
        }
    }

    pub fn executable() -> Self {
        Self("+x".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What to render and where to put it
#[derive(Debug, Clone)]
pub struct TemplateSpec {
    /// Template file name, relative to the resource directory unless absolute
    pub template: String,
    pub vars: HashMap<String, String>,
    pub destination: RemotePath,
    pub permissions: Option<Permissions>,
}

impl TemplateSpec {
    pub fn new(template: impl Into<String>, destination: &str) -> Result<Self, ProvisionError> {
        Ok(Self {
            template: template.into(),
            vars: HashMap::new(),
            destination: RemotePath::parse(destination)?,
            permissions: None,
        })
    }

    pub fn var(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.vars.insert(name.into(), value.to_string());
        self
    }

    pub fn permissions(mut self, mode: &str) -> Result<Self, ProvisionError> {
        self.permissions = Some(Permissions::parse(mode)?);
        Ok(self)
    }
}

/// Successful result of [`TemplateDeployer::deploy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub destination: String,
    pub bytes: usize,
}

/// Renders local templates onto the remote host
pub struct TemplateDeployer {
    fs: RemoteFs,
    resource_dir: PathBuf,
}

impl TemplateDeployer {
    pub fn new(executor: Arc<dyn RemoteExecutor>, resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs: RemoteFs::new(executor),
            resource_dir: resource_dir.into(),
        }
    }

    pub fn from_settings(executor: Arc<dyn RemoteExecutor>, settings: &TemplateSettings) -> Self {
        Self::new(executor, settings.resource_dir.clone())
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }

    /// Load and render the template without touching the remote host
    pub async fn render(&self, spec: &TemplateSpec) -> Result<String, ProvisionError> {
        let file = File::resolve(&self.resource_dir, &spec.template);
        let Some(source) = file.read_string_opt().await? else {
            debug!("Template {:?} does not exist", file.path());
            return Err(ProvisionError::TemplateNotFound(file.path().to_path_buf()));
        };
        Template::new(source).render(&spec.vars)
    }

    /// Render `spec.template` and write it to `spec.destination`, always
    /// overwriting. Nothing is written when a variable is missing.
    pub async fn deploy(&self, spec: &TemplateSpec) -> Result<Deployed, ProvisionError> {
        let rendered = self.render(spec).await?;
        let destination = &spec.destination;
        let write_failed = |e: ProvisionError| ProvisionError::WriteFailed {
            path: destination.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = destination.parent() {
            self.fs.create_dir_all(&parent).await.map_err(write_failed)?;
        }
        self.fs
            .write_file(destination, rendered.as_bytes())
            .await
            .map_err(write_failed)?;

        if let Some(permissions) = &spec.permissions {
            self.fs
                .chmod(destination, permissions.as_str())
                .await
                .map_err(write_failed)?;
        }

        info!("Deployed {} to {}", spec.template, destination);
        Ok(Deployed {
            destination: destination.to_string(),
            bytes: rendered.len(),
        })
    }
}
