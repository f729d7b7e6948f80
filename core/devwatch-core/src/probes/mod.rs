//! Signal probes.
//!
//! Each probe answers one question about the host. Probes are independently
//! fallible, but a failure never reaches the evaluator: [`Probe::read`]
//! catches errors and panics at this boundary, logs them to the console and
//! hands back the probe's neutral value ("no evidence of activity").

mod cpu;
mod files;
mod git;
mod input;
mod network;
mod processes;
mod ssh;

pub use cpu::{CpuProbe, CPU_SAMPLE_WINDOW};
pub use files::ModifiedFilesProbe;
pub use git::GitActivityProbe;
pub use input::{InputIdleProbe, KeystrokeProbe, IDLE_UNKNOWN_MS};
pub use network::{NetCounters, NetworkProbe};
pub use processes::{ProcessProbe, ProcessSample};
pub use ssh::SshSessionProbe;

use crate::command::{CommandRunner, CommandSpec};
use crate::config::Config;
use crate::error::Result;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

/// Displays tried, in order, for X11 queries on the monitored user's session.
pub const X_DISPLAYS: &[&str] = &[":0", ":1"];

pub trait Probe {
    type Output;

    fn name(&self) -> &'static str;

    fn sample(&mut self) -> Result<Self::Output>;

    /// Value reported when sampling fails.
    fn neutral(&self) -> Self::Output;

    /// Samples, falling back to [`Probe::neutral`] if sampling errors or
    /// panics. A panicking sampler is retried on the next call.
    fn read(&mut self) -> Self::Output {
        match panic::catch_unwind(AssertUnwindSafe(|| self.sample())) {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                tracing::debug!(probe = self.name(), error = %err, "Probe failed; using neutral value");
                self.neutral()
            }
            Err(_) => {
                tracing::warn!(probe = self.name(), "Probe panicked; using neutral value");
                self.neutral()
            }
        }
    }
}

pub type BoxedProbe<T> = Box<dyn Probe<Output = T>>;

/// Every probe the evaluator consults during a tick.
pub struct ProbeSet {
    pub cpu: BoxedProbe<f32>,
    pub network: BoxedProbe<Option<NetCounters>>,
    pub input_idle: BoxedProbe<u64>,
    pub keystrokes: BoxedProbe<Option<u64>>,
    pub processes: BoxedProbe<Vec<ProcessSample>>,
    pub ssh_sessions: BoxedProbe<u32>,
    pub modified_files: BoxedProbe<Vec<String>>,
    pub git_activity: BoxedProbe<u32>,
}

impl ProbeSet {
    /// Probes backed by the real host.
    pub fn system(config: &Config, runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            cpu: Box::new(CpuProbe::new()),
            network: Box::new(NetworkProbe::new()),
            input_idle: Box::new(InputIdleProbe::new(&config.user, Rc::clone(&runner))),
            keystrokes: Box::new(KeystrokeProbe::new(config.keystroke_log_path())),
            processes: Box::new(ProcessProbe::new(&config.user)),
            ssh_sessions: Box::new(SshSessionProbe::new(&config.user, Rc::clone(&runner))),
            modified_files: Box::new(ModifiedFilesProbe::new(
                config.projects_root.clone(),
                config.poll_interval(),
            )),
            git_activity: Box::new(GitActivityProbe::new(config.projects_root.clone(), runner)),
        }
    }
}

/// Wraps a command so it runs as `user` on `display`.
///
/// The daemon normally runs as root and reaches into the user's X session via
/// `sudo -u`. When it already runs as that user the wrapper is skipped.
pub fn as_user_on_display(
    user: &str,
    display: &str,
    extra_env: &[(&str, String)],
    program: &str,
    args: &[String],
    timeout: Duration,
) -> CommandSpec {
    if running_as(user) {
        let mut spec = CommandSpec::new(program, timeout)
            .args(args.iter().cloned())
            .env("DISPLAY", display);
        for (key, value) in extra_env {
            spec = spec.env(*key, value.clone());
        }
        return spec;
    }

    let mut spec = CommandSpec::new("sudo", timeout)
        .args(["-n", "-u", user, "env"])
        .arg(format!("DISPLAY={}", display));
    for (key, value) in extra_env {
        spec = spec.arg(format!("{}={}", key, value));
    }
    spec.arg(program).args(args.iter().cloned())
}

fn running_as(user: &str) -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        return false;
    }
    std::env::var("USER").map(|name| name == user).unwrap_or(false)
}
