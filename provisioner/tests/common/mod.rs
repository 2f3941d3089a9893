//! In-memory stand-in for a remote host

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use provisioner::remote::command::RemoteCommand;
use provisioner::remote::executor::{CommandOutput, RemoteExecutor};
use provisioner::ProvisionError;

#[derive(Default)]
struct HostState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    modes: BTreeMap<String, Vec<String>>,
    links: BTreeMap<String, String>,
    unreachable_urls: BTreeSet<String>,
    failing_programs: BTreeSet<String>,
    log: Vec<RemoteCommand>,
}

/// Records every command and simulates the handful of programs the
/// provisioner uses. Paths are tracked exactly as written (`$HOME/x`).
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

fn ok() -> CommandOutput {
    CommandOutput::default()
}

fn fail(status: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        status,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_dir(&self, path: &str) {
        self.state.lock().unwrap().dirs.insert(path.to_string());
    }

    pub fn add_file(&self, path: &str, contents: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }

    /// Downloads of this URL fail like a 404
    pub fn fail_url(&self, url: &str) {
        self.state.lock().unwrap().unreachable_urls.insert(url.to_string());
    }

    /// Every run of this program exits non-zero
    pub fn fail_program(&self, program: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_programs
            .insert(program.to_string());
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    pub fn file_contents(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn modes(&self, path: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .modes
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn link_target(&self, link: &str) -> Option<String> {
        self.state.lock().unwrap().links.get(link).cloned()
    }

    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|cmd| cmd.program().to_string())
            .collect()
    }

    /// Rendered shell lines of every command that ran `program`
    pub fn lines_for(&self, program: &str) -> Vec<String> {
        self.commands()
            .iter()
            .filter(|cmd| cmd.program() == program)
            .map(|cmd| cmd.render())
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    fn simulate(state: &mut HostState, command: &RemoteCommand) -> CommandOutput {
        let args: Vec<&str> = command.arguments().iter().map(|arg| arg.as_str()).collect();

        if state.failing_programs.contains(command.program()) {
            return fail(2, &format!("{}: simulated failure", command.program()));
        }

        match (command.program(), args.as_slice()) {
            ("test", [flag, path]) => {
                let found = match *flag {
                    "-d" => state.dirs.contains(*path),
                    "-f" => state.files.contains_key(*path),
                    _ => state.dirs.contains(*path) || state.files.contains_key(*path),
                };
                if found {
                    ok()
                } else {
                    fail(1, "")
                }
            }
            ("mkdir", ["-p", path]) => {
                if let Some(file) = blocking_file(state, path) {
                    return fail(
                        1,
                        &format!("mkdir: cannot create directory '{}': Not a directory", file),
                    );
                }
                state.dirs.insert(path.to_string());
                ok()
            }
            ("mkdir", [path]) => {
                if state.dirs.contains(*path) || state.files.contains_key(*path) {
                    fail(1, &format!("mkdir: cannot create directory '{}': File exists", path))
                } else {
                    state.dirs.insert(path.to_string());
                    ok()
                }
            }
            ("wget", [.., "-O", dest, url]) | ("curl", [.., "-o", dest, url]) => {
                if state.unreachable_urls.contains(*url) {
                    // wget truncates the output file before failing
                    state.files.insert(dest.to_string(), Vec::new());
                    fail(8, "ERROR 404: Not Found.")
                } else {
                    state.files.insert(dest.to_string(), format!("archive:{}", url).into_bytes());
                    ok()
                }
            }
            ("rm", ["-f", path]) => {
                state.files.remove(*path);
                ok()
            }
            ("rm", ["-rf", path]) => {
                let prefix = format!("{}/", path);
                state.dirs.retain(|dir| dir.as_str() != *path && !dir.starts_with(&prefix));
                state.files.retain(|file, _| !file.starts_with(&prefix));
                ok()
            }
            ("tar", [_, archive, "-C", target, ..]) => {
                if !state.files.contains_key(*archive) {
                    return fail(2, "tar: Cannot open: No such file or directory");
                }
                if !state.dirs.contains(*target) {
                    return fail(2, "tar: Cannot chdir: No such file or directory");
                }
                state.files.insert(format!("{}/bin/tool", target), b"#!/bin/sh".to_vec());
                ok()
            }
            ("tee", [path]) => {
                if state.dirs.contains(*path) {
                    return fail(1, &format!("tee: {}: Is a directory", path));
                }
                let contents = command.stdin_bytes().unwrap_or_default().to_vec();
                state.files.insert(path.to_string(), contents.clone());
                let stdout = if command.context().discard_stdout {
                    String::new()
                } else {
                    String::from_utf8_lossy(&contents).into_owned()
                };
                CommandOutput {
                    status: 0,
                    stdout,
                    stderr: String::new(),
                }
            }
            ("chmod", [mode, path]) => {
                if state.files.contains_key(*path) {
                    state
                        .modes
                        .entry(path.to_string())
                        .or_default()
                        .push(mode.to_string());
                    ok()
                } else {
                    fail(1, "chmod: No such file or directory")
                }
            }
            ("ln", ["-sfn", target, link]) => {
                state.links.insert(link.to_string(), target.to_string());
                ok()
            }
            ("printenv", ["HOME"]) => CommandOutput {
                status: 0,
                stdout: "/home/deploy\n".to_string(),
                stderr: String::new(),
            },
            ("apt-get", _) => ok(),
            (program, _) => fail(127, &format!("{}: command not found", program)),
        }
    }
}

/// The path itself or the first ancestor that is a regular file
fn blocking_file<'a>(state: &HostState, path: &'a str) -> Option<&'a str> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if state.files.contains_key(candidate) {
            return Some(candidate);
        }
        current = candidate.rfind('/').map(|idx| &candidate[..idx]).filter(|p| !p.is_empty());
    }
    None
}

#[async_trait]
impl RemoteExecutor for FakeHost {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ProvisionError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(command.clone());
        Ok(Self::simulate(&mut state, command))
    }
}
