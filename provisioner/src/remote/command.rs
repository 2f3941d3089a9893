//! Typed remote commands
//!
//! Commands are built as a program plus an argument list and only turned into
//! a shell string at the last moment, with every argument quoted. Paths on the
//! remote host get their own argument kind so that a leading `$HOME` or `~`
//! still expands while the rest of the path stays quoted.

use std::fmt;

use crate::errors::ProvisionError;

/// Characters that never need quoting in a POSIX shell word
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a string as a single POSIX shell word
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A path on the remote host, either absolute or relative to the remote home
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemotePath {
    raw: String,
}

impl RemotePath {
    /// Parse an absolute (`/opt/x`) or home-relative (`~/x`, `$HOME/x`) path
    pub fn parse(path: &str) -> Result<Self, ProvisionError> {
        let trimmed = match path.trim_end_matches('/') {
            "" if path.starts_with('/') => "/",
            rest => rest,
        };
        if trimmed.is_empty() {
            return Err(ProvisionError::InvalidTarget("empty path".to_string()));
        }

        let path = Self {
            raw: trimmed.to_string(),
        };
        if path.home_suffix().is_none() && !path.raw.starts_with('/') {
            return Err(ProvisionError::InvalidTarget(format!(
                "{} is neither absolute nor home-relative",
                path.raw
            )));
        }
        Ok(path)
    }

    /// The path exactly as the caller wrote it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the path starts at the remote user's home directory
    pub fn is_home_relative(&self) -> bool {
        self.home_suffix().is_some()
    }

    /// The part after the home prefix (`""` or `/...`), if home-relative
    fn home_suffix(&self) -> Option<&str> {
        ["$HOME", "${HOME}", "~"].iter().find_map(|prefix| {
            self.raw
                .strip_prefix(prefix)
                .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Append a relative segment
    pub fn join(&self, segment: &str) -> RemotePath {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            return self.clone();
        }
        let raw = if self.raw.ends_with('/') {
            format!("{}{}", self.raw, segment)
        } else {
            format!("{}/{}", self.raw, segment)
        };
        RemotePath { raw }
    }

    /// The containing directory, or `None` for `/` and the bare home prefix
    pub fn parent(&self) -> Option<RemotePath> {
        if self.raw == "/" || self.home_suffix() == Some("") {
            return None;
        }
        let idx = self.raw.rfind('/')?;
        let raw = if idx == 0 {
            "/".to_string()
        } else {
            self.raw[..idx].to_string()
        };
        Some(RemotePath { raw })
    }

    /// Last path component
    pub fn file_name(&self) -> Option<&str> {
        if self.raw == "/" || self.home_suffix() == Some("") {
            return None;
        }
        self.raw.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Replace the home prefix with a known home directory
    pub fn with_home(&self, home: &str) -> String {
        match self.home_suffix() {
            Some(rest) => format!("{}{}", home.trim_end_matches('/'), rest),
            None => self.raw.clone(),
        }
    }

    /// Render as a shell word, leaving the home prefix unquoted
    pub fn to_shell(&self) -> String {
        match self.home_suffix() {
            Some("") => "\"$HOME\"".to_string(),
            Some(rest) => format!("\"$HOME\"{}", shell_quote(rest)),
            None => shell_quote(&self.raw),
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A single command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Passed verbatim (after quoting)
    Literal(String),
    /// A remote path, rendered with home expansion
    Path(RemotePath),
}

impl Arg {
    /// The unrendered value
    pub fn as_str(&self) -> &str {
        match self {
            Arg::Literal(value) => value,
            Arg::Path(path) => path.as_str(),
        }
    }

    fn render(&self) -> String {
        match self {
            Arg::Literal(value) => shell_quote(value),
            Arg::Path(path) => path.to_shell(),
        }
    }
}

/// How a command should be run on the remote host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// Directory to change into first
    pub cwd: Option<RemotePath>,

    /// Run through `sudo`
    pub sudo: bool,

    /// Do not treat a non-zero exit as an error
    pub warn_only: bool,

    /// Extra environment for the program
    pub env: Vec<(String, String)>,

    /// Send the program's stdout to `/dev/null`
    pub discard_stdout: bool,
}

/// A program, its arguments and the context to run it in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<Arg>,
    context: ExecContext,
    stdin: Option<Vec<u8>>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            context: ExecContext::default(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Literal(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Literal(arg.into())));
        self
    }

    pub fn path(mut self, path: &RemotePath) -> Self {
        self.args.push(Arg::Path(path.clone()));
        self
    }

    pub fn cwd(mut self, dir: &RemotePath) -> Self {
        self.context.cwd = Some(dir.clone());
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.context.sudo = sudo;
        self
    }

    pub fn warn_only(mut self) -> Self {
        self.context.warn_only = true;
        self
    }

    /// Set an environment variable for the program. The name must be a
    /// valid shell identifier.
    pub fn env(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let key = key.into();
        if !is_env_name(&key) {
            return Err(ProvisionError::InvalidArgument(format!(
                "invalid environment variable name: {:?}",
                key
            )));
        }
        self.context.env.push((key, value.into()));
        Ok(self)
    }

    pub fn discard_stdout(mut self) -> Self {
        self.context.discard_stdout = true;
        self
    }

    /// Bytes fed to the program's standard input
    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[Arg] {
        &self.args
    }

    pub fn context(&self) -> &ExecContext {
        &self.context
    }

    pub fn stdin_bytes(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Render the full shell line, e.g. `cd /tmp && sudo env A=b tar -xf x`
    pub fn render(&self) -> String {
        let mut words: Vec<String> = Vec::new();

        if self.context.sudo {
            words.push("sudo".to_string());
            if !self.context.env.is_empty() {
                words.push("env".to_string());
            }
        }
        for (key, value) in &self.context.env {
            words.push(format!("{}={}", key, shell_quote(value)));
        }
        words.push(shell_quote(&self.program));
        words.extend(self.args.iter().map(Arg::render));
        if self.context.discard_stdout {
            words.push(">/dev/null".to_string());
        }

        let line = words.join(" ");
        match &self.context.cwd {
            Some(dir) => format!("cd {} && {}", dir.to_shell(), line),
            None => line,
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
