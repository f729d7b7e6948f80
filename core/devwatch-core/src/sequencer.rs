//! Pre-shutdown backup and shutdown issuance.
//!
//! Runs once, synchronously, when the idle threshold is crossed. Phases run
//! in a fixed order and none of them is retried: a failed git commit or
//! backup is recorded and the sequence moves on, because the shutdown itself
//! must always be attempted.

use crate::command::{CommandRunner, CommandSpec};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::recorder::{record_details, ActivityRecorder};
use chrono::Utc;
use devwatch_events::{
    now_timestamp, AutoShutdownDetails, BackupCompleteDetails, BackupStartDetails, EventType,
    GitBackupDetails,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

pub const IDLE_TIMEOUT_REASON: &str = "idle_timeout";
pub const SHUTDOWN_MESSAGE: &str = "Auto-shutdown due to inactivity";

const GIT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKUP_TIMEOUT: Duration = Duration::from_secs(300);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitBackupOutcome {
    pub repos_found: usize,
    pub repos_committed: usize,
    pub repos_failed: Vec<PathBuf>,
    /// True once the phase has run, even if individual repositories failed.
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileBackupOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownOutcome {
    pub git: GitBackupOutcome,
    pub backup: FileBackupOutcome,
    /// The shutdown command ran and exited zero. Always false in dry-run mode.
    pub issued: bool,
}

pub struct ShutdownSequencer<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    recorder: &'a mut dyn ActivityRecorder,
}

impl<'a> ShutdownSequencer<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        recorder: &'a mut dyn ActivityRecorder,
    ) -> Self {
        Self {
            config,
            runner,
            recorder,
        }
    }

    pub fn run(&mut self, idle_elapsed: Duration) -> ShutdownOutcome {
        tracing::warn!(
            idle_minutes = self.config.idle_shutdown_minutes,
            "Idle shutdown sequence initiated"
        );

        record_details(
            self.recorder,
            EventType::PreShutdownBackupStart,
            &BackupStartDetails {
                reason: Some(IDLE_TIMEOUT_REASON.to_string()),
                idle_minutes: Some(self.config.idle_shutdown_minutes),
            },
        );

        tracing::info!("Step 1/4: committing uncommitted git changes");
        let git = self.commit_repositories();
        record_details(
            self.recorder,
            EventType::PreShutdownGitBackup,
            &GitBackupDetails {
                success: Some(git.success),
                repos_found: Some(git.repos_found),
                repos_committed: Some(git.repos_committed),
                repos_failed: git
                    .repos_failed
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect(),
                timestamp: Some(now_timestamp()),
            },
        );

        tracing::info!(script = %self.config.backup_script.display(), "Step 2/4: running file backup");
        let backup = self.run_backup();
        record_details(
            self.recorder,
            EventType::PreShutdownBackupComplete,
            &BackupCompleteDetails {
                success: Some(backup.success),
                git_backup_completed: Some(git.success),
                exit_code: backup.exit_code,
                timed_out: Some(backup.timed_out),
                timestamp: Some(now_timestamp()),
            },
        );

        record_details(
            self.recorder,
            EventType::AutoShutdown,
            &AutoShutdownDetails {
                reason: Some(IDLE_TIMEOUT_REASON.to_string()),
                idle_minutes: Some(self.config.idle_shutdown_minutes),
                idle_seconds: Some(idle_elapsed.as_secs()),
                git_backup_completed: Some(git.success),
                backup_completed: Some(backup.success),
                dry_run: Some(self.config.dry_run),
            },
        );
        tracing::info!(
            git = git.success,
            files = backup.success,
            "Step 3/4: backups complete"
        );

        tracing::info!("Step 4/4: triggering system shutdown in 1 minute");
        let issued = self.issue_shutdown();

        ShutdownOutcome {
            git,
            backup,
            issued,
        }
    }

    fn commit_repositories(&self) -> GitBackupOutcome {
        let repositories = discover_repositories(&self.config.projects_root);
        let message = commit_message();
        let mut outcome = GitBackupOutcome {
            repos_found: repositories.len(),
            ..GitBackupOutcome::default()
        };

        for repo in repositories {
            match commit_if_dirty(self.runner, &repo, &message) {
                Ok(true) => {
                    outcome.repos_committed += 1;
                    tracing::info!(repo = %repo.display(), "Auto-committed changes");
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(repo = %repo.display(), error = %err, "Failed to back up repository");
                    outcome.repos_failed.push(repo);
                }
            }
        }

        outcome.success = true;
        tracing::info!(
            found = outcome.repos_found,
            committed = outcome.repos_committed,
            failed = outcome.repos_failed.len(),
            "Git backup complete"
        );
        outcome
    }

    fn run_backup(&self) -> FileBackupOutcome {
        let spec = CommandSpec::new("bash", BACKUP_TIMEOUT)
            .arg(self.config.backup_script.display().to_string());
        match self.runner.run(&spec) {
            Ok(output) if output.success() => {
                tracing::info!("Pre-shutdown backup completed");
                FileBackupOutcome {
                    success: true,
                    exit_code: output.exit_code,
                    timed_out: false,
                }
            }
            Ok(output) => {
                tracing::warn!(
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Backup failed"
                );
                FileBackupOutcome {
                    success: false,
                    exit_code: output.exit_code,
                    timed_out: false,
                }
            }
            Err(err) => {
                let timed_out = err.is_timeout();
                tracing::warn!(error = %err, timed_out, "Backup did not complete");
                FileBackupOutcome {
                    success: false,
                    exit_code: None,
                    timed_out,
                }
            }
        }
    }

    fn issue_shutdown(&self) -> bool {
        let spec = shutdown_command();
        if self.config.dry_run {
            tracing::warn!(command = %spec, "Dry run: shutdown command not executed");
            return false;
        }

        match self.runner.run(&spec) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                tracing::error!(
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Shutdown command failed"
                );
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "Error triggering shutdown");
                false
            }
        }
    }
}

pub fn shutdown_command() -> CommandSpec {
    CommandSpec::new("sudo", SHUTDOWN_TIMEOUT).args(["shutdown", "-h", "+1", SHUTDOWN_MESSAGE])
}

fn commit_message() -> String {
    format!(
        "Auto-commit before idle shutdown at {}",
        Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f")
    )
}

/// Every directory under `root` holding a `.git` entry, sorted by path.
///
/// Walks into nested directories so submodules and repositories inside
/// grouping folders are found, but never descends into `.git` itself.
pub fn discover_repositories(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && entry.path().join(".git").exists())
        .map(|entry| entry.into_path())
        .collect()
}

/// Commits everything in `repo` when `git status` reports changes.
/// Returns whether a commit was made.
fn commit_if_dirty(runner: &dyn CommandRunner, repo: &Path, message: &str) -> Result<bool> {
    let status = git_checked(runner, repo, &["status", "--porcelain"])?;
    if status.trim().is_empty() {
        return Ok(false);
    }
    git_checked(runner, repo, &["add", "-A"])?;
    git_checked(runner, repo, &["commit", "-m", message])?;
    Ok(true)
}

fn git_checked(runner: &dyn CommandRunner, repo: &Path, args: &[&str]) -> Result<String> {
    let spec = CommandSpec::new("git", GIT_TIMEOUT)
        .arg("-C")
        .arg(repo.display().to_string())
        .args(args.iter().copied());
    let output = runner.run(&spec)?;
    if !output.success() {
        return Err(CoreError::CommandFailed {
            command: spec.to_string(),
            details: format!("exit {:?}: {}", output.exit_code, output.stderr.trim()),
        });
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::recorder::MemoryRecorder;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Answers `git status` from a table keyed by repository directory name.
    #[derive(Default)]
    struct FakeRunner {
        status: HashMap<String, String>,
        failing_commits: Vec<String>,
        backup: Option<CommandOutput>,
        backup_times_out: bool,
        calls: RefCell<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        fn repo_name(spec: &CommandSpec) -> String {
            Path::new(&spec.args[1])
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default()
        }

        fn calls_matching(&self, subcommand: &str) -> Vec<CommandSpec> {
            self.calls
                .borrow()
                .iter()
                .filter(|spec| spec.program == "git" && spec.args.get(2).map(String::as_str) == Some(subcommand))
                .cloned()
                .collect()
        }

        fn ran(&self, program: &str) -> bool {
            self.calls.borrow().iter().any(|spec| spec.program == program)
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(spec.clone());
            match spec.program.as_str() {
                "git" => {
                    let repo = Self::repo_name(spec);
                    match spec.args[2].as_str() {
                        "status" => Ok(CommandOutput::ok(
                            self.status.get(&repo).cloned().unwrap_or_default(),
                        )),
                        "commit" if self.failing_commits.contains(&repo) => {
                            Ok(CommandOutput::failed(128, "Please tell me who you are"))
                        }
                        _ => Ok(CommandOutput::ok("")),
                    }
                }
                "bash" if self.backup_times_out => Err(CoreError::CommandTimedOut {
                    command: spec.to_string(),
                    timeout: spec.timeout,
                }),
                "bash" => Ok(self.backup.clone().unwrap_or_else(|| CommandOutput::ok(""))),
                _ => Ok(CommandOutput::ok("")),
            }
        }
    }

    fn make_repo(root: &Path, name: &str) -> PathBuf {
        let repo = root.join(name);
        fs_err::create_dir_all(repo.join(".git").join("objects")).expect("create repo");
        repo
    }

    fn config_for(root: &Path) -> Config {
        let mut config = Config::for_user("dev");
        config.projects_root = root.to_path_buf();
        config.idle_shutdown_minutes = 1;
        config
    }

    fn run_sequence(config: &Config, runner: &FakeRunner) -> (ShutdownOutcome, MemoryRecorder) {
        let recorder = MemoryRecorder::new("dev");
        let mut sink = recorder.clone();
        let outcome =
            ShutdownSequencer::new(config, runner, &mut sink).run(Duration::from_secs(60));
        (outcome, recorder)
    }

    #[test]
    fn discovers_nested_repositories_without_entering_git_dirs() {
        let temp = tempfile::tempdir().expect("temp dir");
        make_repo(temp.path(), "alpha");
        make_repo(&temp.path().join("group"), "beta");
        make_repo(&temp.path().join("alpha").join("vendor"), "sub");
        fs_err::create_dir_all(temp.path().join("plain")).expect("plain dir");

        let repos = discover_repositories(temp.path());
        let names: Vec<PathBuf> = repos
            .iter()
            .map(|path| path.strip_prefix(temp.path()).expect("prefix").to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("alpha"),
                PathBuf::from("alpha/vendor/sub"),
                PathBuf::from("group/beta"),
            ]
        );
    }

    #[test]
    fn clean_repository_is_not_committed() {
        let temp = tempfile::tempdir().expect("temp dir");
        make_repo(temp.path(), "clean");
        let runner = FakeRunner::default();

        let (outcome, _) = run_sequence(&config_for(temp.path()), &runner);

        assert_eq!(outcome.git.repos_found, 1);
        assert_eq!(outcome.git.repos_committed, 0);
        assert!(runner.calls_matching("add").is_empty());
        assert!(runner.calls_matching("commit").is_empty());
    }

    #[test]
    fn dirty_repository_is_committed_once() {
        let temp = tempfile::tempdir().expect("temp dir");
        make_repo(temp.path(), "dirty");
        let mut runner = FakeRunner::default();
        runner
            .status
            .insert("dirty".to_string(), " M src/main.rs\n".to_string());

        let (outcome, _) = run_sequence(&config_for(temp.path()), &runner);

        assert_eq!(outcome.git.repos_committed, 1);
        assert_eq!(runner.calls_matching("add").len(), 1);
        let commits = runner.calls_matching("commit");
        assert_eq!(commits.len(), 1);
        assert!(commits[0].args[4].starts_with("Auto-commit before idle shutdown at "));
    }

    #[test]
    fn repository_failure_does_not_stop_the_others() {
        let temp = tempfile::tempdir().expect("temp dir");
        make_repo(temp.path(), "a-broken");
        make_repo(temp.path(), "b-fine");
        let mut runner = FakeRunner::default();
        runner.status.insert("a-broken".to_string(), "?? new\n".to_string());
        runner.status.insert("b-fine".to_string(), "?? new\n".to_string());
        runner.failing_commits.push("a-broken".to_string());

        let (outcome, recorder) = run_sequence(&config_for(temp.path()), &runner);

        assert_eq!(outcome.git.repos_found, 2);
        assert_eq!(outcome.git.repos_committed, 1);
        assert_eq!(outcome.git.repos_failed, vec![temp.path().join("a-broken")]);
        // The phase ran, so it reports success despite the per-repo failure.
        assert!(outcome.git.success);

        let record = recorder
            .find(EventType::PreShutdownGitBackup)
            .expect("git event");
        let details: GitBackupDetails = record.details_as().expect("details");
        assert_eq!(details.success, Some(true));
        assert_eq!(details.repos_failed.len(), 1);
    }

    #[test]
    fn missing_projects_root_still_counts_as_phase_run() {
        let temp = tempfile::tempdir().expect("temp dir");
        let runner = FakeRunner::default();

        let (outcome, _) = run_sequence(&config_for(&temp.path().join("absent")), &runner);

        assert_eq!(outcome.git.repos_found, 0);
        assert!(outcome.git.success);
    }

    #[test]
    fn events_are_recorded_in_order() {
        let temp = tempfile::tempdir().expect("temp dir");
        let runner = FakeRunner::default();

        let (outcome, recorder) = run_sequence(&config_for(temp.path()), &runner);

        assert_eq!(
            recorder.event_types(),
            vec![
                EventType::PreShutdownBackupStart,
                EventType::PreShutdownGitBackup,
                EventType::PreShutdownBackupComplete,
                EventType::AutoShutdown,
            ]
        );
        assert!(outcome.backup.success);
        assert!(outcome.issued);
        let last = runner.calls.borrow().last().cloned().expect("calls");
        assert_eq!(last, shutdown_command());
    }

    #[test]
    fn failed_backup_still_shuts_down() {
        let temp = tempfile::tempdir().expect("temp dir");
        let runner = FakeRunner {
            backup: Some(CommandOutput::failed(1, "rsync: connection refused")),
            ..FakeRunner::default()
        };

        let (outcome, recorder) = run_sequence(&config_for(temp.path()), &runner);

        assert!(!outcome.backup.success);
        assert_eq!(outcome.backup.exit_code, Some(1));
        assert!(outcome.issued);

        let details: AutoShutdownDetails = recorder
            .find(EventType::AutoShutdown)
            .expect("auto_shutdown")
            .details_as()
            .expect("details");
        assert_eq!(details.backup_completed, Some(false));
        assert_eq!(details.git_backup_completed, Some(true));
        assert_eq!(details.idle_seconds, Some(60));
    }

    #[test]
    fn backup_timeout_still_shuts_down() {
        let temp = tempfile::tempdir().expect("temp dir");
        let runner = FakeRunner {
            backup_times_out: true,
            ..FakeRunner::default()
        };

        let (outcome, recorder) = run_sequence(&config_for(temp.path()), &runner);

        assert!(outcome.backup.timed_out);
        assert!(!outcome.backup.success);
        assert!(outcome.issued);
        assert_eq!(recorder.count(EventType::AutoShutdown), 1);

        let complete: BackupCompleteDetails = recorder
            .find(EventType::PreShutdownBackupComplete)
            .expect("complete")
            .details_as()
            .expect("details");
        assert_eq!(complete.timed_out, Some(true));
    }

    #[test]
    fn dry_run_skips_the_shutdown_command() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut config = config_for(temp.path());
        config.dry_run = true;
        let runner = FakeRunner::default();

        let (outcome, recorder) = run_sequence(&config, &runner);

        assert!(!outcome.issued);
        assert!(!runner.ran("sudo"));
        assert!(runner.ran("bash"));
        let details: AutoShutdownDetails = recorder
            .find(EventType::AutoShutdown)
            .expect("auto_shutdown")
            .details_as()
            .expect("details");
        assert_eq!(details.dry_run, Some(true));
    }
}
