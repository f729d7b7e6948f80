//! Bounded external command execution.
//!
//! Every probe and shutdown phase shells out through [`CommandRunner`], and
//! every invocation carries a timeout: a hung child must never stall the
//! idle clock. Output is spooled to anonymous temp files rather than pipes,
//! so a chatty child cannot block on a full pipe while we poll `try_wait`.

use crate::error::{CoreError, Result};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_STEP: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// True when the argument list contains `needle` verbatim.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a command to completion or until its timeout elapses.
///
/// A non-zero exit is still `Ok`; callers decide what the status means.
/// Spawn failures and timeouts are `Err`.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut stdout_file = spool_file(spec)?;
        let mut stderr_file = spool_file(spec)?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(clone_handle(spec, &stdout_file)?))
            .stderr(Stdio::from(clone_handle(spec, &stderr_file)?));
        for (key, value) in &spec.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| CoreError::CommandSpawn {
            command: spec.to_string(),
            source,
        })?;

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() >= spec.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CoreError::CommandTimedOut {
                            command: spec.to_string(),
                            timeout: spec.timeout,
                        });
                    }
                    thread::sleep(POLL_STEP.min(spec.timeout));
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(CoreError::CommandFailed {
                        command: spec.to_string(),
                        details: format!("wait failed: {}", err),
                    });
                }
            }
        };

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: read_spool(&mut stdout_file),
            stderr: read_spool(&mut stderr_file),
        })
    }
}

fn spool_file(spec: &CommandSpec) -> Result<File> {
    tempfile::tempfile()
        .map_err(|err| CoreError::io(format!("creating output spool for {}", spec.program), err))
}

fn clone_handle(spec: &CommandSpec, file: &File) -> Result<File> {
    file.try_clone()
        .map_err(|err| CoreError::io(format!("cloning output spool for {}", spec.program), err))
}

fn read_spool(file: &mut File) -> String {
    let mut bytes = Vec::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_end(&mut bytes);
    }
    String::from_utf8_lossy(&bytes).to_string()
}
