//! Remote command execution

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::ProvisionError;
use crate::remote::command::RemoteCommand;
use crate::settings::TransportSettings;

/// Exit code ssh uses for its own connection failures
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Exit status and captured output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs commands on the host being provisioned
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute the command. A non-zero exit is reported in the output; only a
    /// failure to run the command at all is an error.
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ProvisionError>;

    /// Execute the command, failing on a non-zero exit unless the command is
    /// marked warn-only
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        let output = self.execute(command).await?;
        if output.success() {
            return Ok(output);
        }
        if command.context().warn_only {
            warn!(
                "Command exited with status {} (tolerated): {}",
                output.status,
                command.render()
            );
            return Ok(output);
        }
        Err(ProvisionError::CommandFailed {
            command: command.render(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Where a [`ShellExecutor`] sends its commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// `sh -c` on this machine
    Local,
    /// The system `ssh` client
    Ssh(SshTarget),
}

/// Connection details handed to the `ssh` client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub options: Vec<String>,
}

impl SshTarget {
    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

/// Executor that shells out, either locally or through `ssh`
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    transport: Transport,
}

impl ShellExecutor {
    pub fn local() -> Self {
        Self {
            transport: Transport::Local,
        }
    }

    pub fn ssh(target: SshTarget) -> Self {
        Self {
            transport: Transport::Ssh(target),
        }
    }

    /// Build the executor described by the transport settings
    pub fn from_settings(settings: &TransportSettings) -> Result<Self, ProvisionError> {
        match settings {
            TransportSettings::Local => Ok(Self::local()),
            TransportSettings::Ssh {
                host,
                user,
                port,
                identity_file,
                options,
            } => {
                if host.trim().is_empty() {
                    return Err(ProvisionError::ConfigError(
                        "ssh transport requires a host".to_string(),
                    ));
                }
                Ok(Self::ssh(SshTarget {
                    host: host.clone(),
                    user: user.clone(),
                    port: *port,
                    identity_file: identity_file.clone(),
                    options: options.clone(),
                }))
            }
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn build(&self, line: &str) -> Command {
        match &self.transport {
            Transport::Local => {
                let mut cmd = Command::new("sh");
                cmd.args(["-c", line]);
                cmd
            }
            Transport::Ssh(target) => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                if let Some(port) = target.port {
                    cmd.arg("-p").arg(port.to_string());
                }
                if let Some(identity) = &target.identity_file {
                    cmd.arg("-i").arg(identity);
                }
                for option in &target.options {
                    cmd.args(["-o", option]);
                }
                cmd.arg("--").arg(target.destination()).arg(line);
                cmd
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        let line = command.render();
        debug!("Running: {}", line);

        let mut cmd = self.build(&line);
        cmd.stdin(if command.stdin_bytes().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ProvisionError::Transport(format!("Failed to spawn `{}`: {}", line, e)))?;

        // Feed stdin while draining the output pipes, so a program that
        // writes as it reads cannot fill a pipe and stall both sides
        let stdin = child.stdin.take();
        let feed = async move {
            let (Some(bytes), Some(mut stdin)) = (command.stdin_bytes(), stdin) else {
                return Ok(());
            };
            match stdin.write_all(bytes).await {
                // The program exited without reading everything; its status says why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                result => result,
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output
            .map_err(|e| ProvisionError::Transport(format!("Failed to wait for `{}`: {}", line, e)))?;
        fed.map_err(|e| ProvisionError::Transport(format!("Failed to write stdin: {}", e)))?;

        // Killed by a signal
        let status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if let Transport::Ssh(target) = &self.transport {
            if status == SSH_CONNECTION_FAILURE {
                return Err(ProvisionError::Transport(format!(
                    "ssh to {} failed: {}",
                    target.destination(),
                    stderr.trim()
                )));
            }
        }

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}
