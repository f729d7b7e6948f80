use super::Probe;
use crate::command::{CommandRunner, CommandSpec};
use crate::error::{CoreError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::rc::Rc;
use std::time::Duration;

const WHO_TIMEOUT: Duration = Duration::from_secs(2);

// `who` line: name, line, login time, optional "(host)" comment.
static RE_WHO_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)\s+.*?(?:\(([^)]*)\))?\s*$").unwrap());

/// Remote login sessions of the monitored user, from `who`.
pub struct SshSessionProbe {
    user: String,
    runner: Rc<dyn CommandRunner>,
}

impl SshSessionProbe {
    pub fn new(user: &str, runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            user: user.to_string(),
            runner,
        }
    }
}

impl Probe for SshSessionProbe {
    type Output = u32;

    fn name(&self) -> &'static str {
        "ssh_sessions"
    }

    fn sample(&mut self) -> Result<u32> {
        let output = self.runner.run(&CommandSpec::new("who", WHO_TIMEOUT))?;
        if !output.success() {
            return Err(CoreError::probe(
                "ssh_sessions",
                format!("who exited with {:?}", output.exit_code),
            ));
        }
        Ok(count_remote_sessions(&output.stdout, &self.user))
    }

    fn neutral(&self) -> u32 {
        0
    }
}

/// Counts sessions for `user` whose host comment names a remote machine.
/// Local X sessions report `(:0)` and console logins report no host.
/// Neither is counted: a local login does not keep the machine awake, only
/// the other activity signals do.
pub fn count_remote_sessions(who_output: &str, user: &str) -> u32 {
    who_output
        .lines()
        .filter_map(|line| RE_WHO_LINE.captures(line))
        .filter(|caps| caps.get(1).map(|m| m.as_str()) == Some(user))
        .filter(|caps| {
            caps.get(3)
                .map(|host| {
                    let host = host.as_str().trim();
                    !host.is_empty() && !host.starts_with(':')
                })
                .unwrap_or(false)
        })
        .count() as u32
}
