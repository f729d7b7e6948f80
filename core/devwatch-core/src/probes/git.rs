use super::Probe;
use crate::command::{CommandRunner, CommandSpec};
use crate::error::{CoreError, Result};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

const GIT_LOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Commits made in the last hour, as seen from the projects root.
pub struct GitActivityProbe {
    root: PathBuf,
    runner: Rc<dyn CommandRunner>,
}

impl GitActivityProbe {
    pub fn new(root: PathBuf, runner: Rc<dyn CommandRunner>) -> Self {
        Self { root, runner }
    }
}

impl Probe for GitActivityProbe {
    type Output = u32;

    fn name(&self) -> &'static str {
        "git_activity"
    }

    fn sample(&mut self) -> Result<u32> {
        let spec = CommandSpec::new("git", GIT_LOG_TIMEOUT)
            .arg("-C")
            .arg(self.root.to_string_lossy())
            .args(["log", "--all", "--since=1 hour ago", "--oneline"]);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(CoreError::probe(
                "git_activity",
                format!("git log exited with {:?}", output.exit_code),
            ));
        }
        Ok(count_nonempty_lines(&output.stdout))
    }

    fn neutral(&self) -> u32 {
        0
    }
}

fn count_nonempty_lines(output: &str) -> u32 {
    output.lines().filter(|line| !line.trim().is_empty()).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;

    struct FixedRunner(CommandOutput);

    impl CommandRunner for FixedRunner {
        fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn counts_commit_lines() {
        let runner = Rc::new(FixedRunner(CommandOutput::ok("abc123 fix\ndef456 feat\n\n")));
        let mut probe = GitActivityProbe::new(PathBuf::from("/tmp"), runner);
        assert_eq!(probe.read(), 2);
    }

    #[test]
    fn not_a_repository_is_neutral() {
        let runner = Rc::new(FixedRunner(CommandOutput::failed(128, "not a git repository")));
        let mut probe = GitActivityProbe::new(PathBuf::from("/tmp"), runner);
        assert_eq!(probe.read(), 0);
    }
}
