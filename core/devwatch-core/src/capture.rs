//! Screenshot capture on active ticks.

use crate::command::CommandRunner;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::probes::{as_user_on_display, X_DISPLAYS};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

const SCROT_TIMEOUT: Duration = Duration::from_secs(5);

pub trait ScreenCapture {
    /// Captures the user's screen, returning the written file.
    fn capture(&mut self) -> Result<PathBuf>;
}

/// Runs `scrot` on the monitored user's display, trying each known display.
pub struct ScrotCapture {
    user: String,
    output_dir: PathBuf,
    xauthority: PathBuf,
    runner: Rc<dyn CommandRunner>,
}

impl ScrotCapture {
    pub fn new(config: &Config, runner: Rc<dyn CommandRunner>) -> Self {
        Self {
            user: config.user.clone(),
            output_dir: config.screenshot_dir(),
            xauthority: config.xauthority_path(),
            runner,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl ScreenCapture for ScrotCapture {
    fn capture(&mut self) -> Result<PathBuf> {
        fs_err::create_dir_all(&self.output_dir)
            .map_err(|err| CoreError::io("creating screenshot directory", err))?;

        let file_name = format!("{}.png", Local::now().format("%Y%m%d-%H%M%S"));
        let target = self.output_dir.join(file_name);
        let xauthority = self.xauthority.display().to_string();

        let mut last_error = None;
        for display in X_DISPLAYS {
            let spec = as_user_on_display(
                &self.user,
                display,
                &[("XAUTHORITY", xauthority.clone())],
                "scrot",
                &[target.display().to_string()],
                SCROT_TIMEOUT,
            );
            match self.runner.run(&spec) {
                Ok(output) if output.success() && target.exists() => return Ok(target),
                Ok(output) => {
                    last_error = Some(format!(
                        "display {} exited with {:?}: {}",
                        display,
                        output.exit_code,
                        output.stderr.trim()
                    ));
                }
                Err(err) => last_error = Some(format!("display {}: {}", display, err)),
            }
        }

        Err(CoreError::probe(
            "screenshot",
            last_error.unwrap_or_else(|| "no display available".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, CommandSpec};
    use std::cell::RefCell;

    /// Fails on `:0`, writes the target file on `:1`.
    struct SecondDisplayRunner {
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl CommandRunner for SecondDisplayRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(spec.clone());
            if spec.has_arg("DISPLAY=:1") || spec.envs.iter().any(|(_, v)| v == ":1") {
                let target = spec.args.last().expect("target arg");
                fs_err::write(target, b"png").expect("write screenshot");
                return Ok(CommandOutput::ok(""));
            }
            Ok(CommandOutput::failed(2, "Can't open X display"))
        }
    }

    struct NoDisplayRunner;

    impl CommandRunner for NoDisplayRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            Err(CoreError::CommandTimedOut {
                command: spec.to_string(),
                timeout: spec.timeout,
            })
        }
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::for_user("devwatch-capture-test");
        config.log_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn falls_back_to_second_display() {
        let temp = tempfile::tempdir().expect("temp dir");
        let runner = Rc::new(SecondDisplayRunner {
            calls: RefCell::new(Vec::new()),
        });
        let mut capture = ScrotCapture::new(&config_in(temp.path()), runner.clone());

        let path = capture.capture().expect("capture");
        assert!(path.starts_with(temp.path().join("screenshots")));
        assert!(path.exists());
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn reports_error_when_no_display_works() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut capture = ScrotCapture::new(&config_in(temp.path()), Rc::new(NoDisplayRunner));

        let err = capture.capture().expect_err("should fail");
        assert!(err.to_string().contains("screenshot"));
        assert!(capture.output_dir().exists());
    }
}
