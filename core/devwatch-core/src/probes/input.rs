use super::{as_user_on_display, Probe, X_DISPLAYS};
use crate::command::CommandRunner;
use crate::error::{CoreError, Result};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Reported when the idle time cannot be determined: large enough that it
/// never counts as recent input.
pub const IDLE_UNKNOWN_MS: u64 = 999_999_999;

const XPRINTIDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Milliseconds since the last keyboard or pointer event on the user's X
/// display, via `xprintidle`.
pub struct InputIdleProbe {
    user: String,
    runner: Rc<dyn CommandRunner>,
}

impl InputIdleProbe {
    pub fn new(user: &str, runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            user: user.to_string(),
            runner,
        }
    }
}

impl Probe for InputIdleProbe {
    type Output = u64;

    fn name(&self) -> &'static str {
        "input_idle"
    }

    fn sample(&mut self) -> Result<u64> {
        let mut last_error = None;
        for display in X_DISPLAYS {
            let spec = as_user_on_display(
                &self.user,
                display,
                &[],
                "xprintidle",
                &[],
                XPRINTIDLE_TIMEOUT,
            );
            match self.runner.run(&spec) {
                Ok(output) if output.success() => {
                    return parse_idle_ms(&output.stdout);
                }
                Ok(output) => {
                    last_error = Some(CoreError::probe(
                        "input_idle",
                        format!("xprintidle on {} exited with {:?}", display, output.exit_code),
                    ));
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::probe("input_idle", "no displays to query")))
    }

    fn neutral(&self) -> u64 {
        IDLE_UNKNOWN_MS
    }
}

fn parse_idle_ms(stdout: &str) -> Result<u64> {
    let trimmed = stdout.trim();
    trimmed.parse::<u64>().map_err(|err| {
        CoreError::probe(
            "input_idle",
            format!("bad xprintidle output {:?}: {}", trimmed, err),
        )
    })
}

/// Total bytes captured so far by the `logkeys` keystroke logger.
///
/// The evaluator turns consecutive totals into a per-tick delta. A missing
/// log means the logger is not running, which is not evidence of anything.
pub struct KeystrokeProbe {
    log_path: PathBuf,
}

impl KeystrokeProbe {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }
}

impl Probe for KeystrokeProbe {
    type Output = Option<u64>;

    fn name(&self) -> &'static str {
        "keystrokes"
    }

    fn sample(&mut self) -> Result<Option<u64>> {
        let metadata = fs_err::metadata(&self.log_path)
            .map_err(|err| CoreError::io("reading keystroke log", err))?;
        Ok(Some(metadata.len()))
    }

    fn neutral(&self) -> Option<u64> {
        None
    }
}
