//! Archive sources and the formats they imply

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::errors::ProvisionError;

const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ftp"];

/// How an archive is unpacked, decided by its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    TarXz,
    Tar,
    /// Installed through the package manager instead of unpacked
    Deb,
}

impl ArchiveFormat {
    const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::TarGz,
        ArchiveFormat::TarBz2,
        ArchiveFormat::TarXz,
        ArchiveFormat::Tar,
        ArchiveFormat::Deb,
    ];

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ArchiveFormat::TarGz => &[".tar.gz", ".tgz"],
            ArchiveFormat::TarBz2 => &[".tar.bz2", ".tbz2"],
            ArchiveFormat::TarXz => &[".tar.xz", ".txz"],
            ArchiveFormat::Tar => &[".tar"],
            ArchiveFormat::Deb => &[".deb"],
        }
    }

    /// Detect the format from a file name, case-insensitively
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::matching_extension(name).map(|(format, _)| format)
    }

    fn matching_extension(name: &str) -> Option<(Self, &'static str)> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.iter().find_map(|format| {
            format
                .extensions()
                .iter()
                .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
                .map(|ext| (*format, *ext))
        })
    }

    /// The `tar` flags that extract this format, `None` for package formats
    pub fn tar_flags(&self) -> Option<&'static str> {
        match self {
            ArchiveFormat::TarGz => Some("-xzf"),
            ArchiveFormat::TarBz2 => Some("-xjf"),
            ArchiveFormat::TarXz => Some("-xJf"),
            ArchiveFormat::Tar => Some("-xf"),
            ArchiveFormat::Deb => None,
        }
    }
}

/// URL of a remote archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    url: Url,
    file_name: String,
}

impl ArchiveSource {
    pub fn parse(url: &str) -> Result<Self, ProvisionError> {
        let url = Url::parse(url).map_err(|e| ProvisionError::InvalidSource(format!("{}: {}", url, e)))?;

        if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
            return Err(ProvisionError::InvalidSource(format!(
                "unsupported scheme {} in {}",
                url.scheme(),
                url
            )));
        }

        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::InvalidSource(format!("no file name in {}", url)))?;

        Ok(Self { url, file_name })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Last path segment, query and fragment excluded
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> Result<ArchiveFormat, ProvisionError> {
        ArchiveFormat::from_file_name(&self.file_name)
            .ok_or_else(|| ProvisionError::UnsupportedArchiveFormat(self.file_name.clone()))
    }

    /// File name without its archive extension (`go1.0.3.linux-amd64.tar.gz`
    /// becomes `go1.0.3.linux-amd64`)
    pub fn basename(&self) -> &str {
        match ArchiveFormat::matching_extension(&self.file_name) {
            Some((_, ext)) => &self.file_name[..self.file_name.len() - ext.len()],
            None => &self.file_name,
        }
    }
}

impl FromStr for ArchiveSource {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
