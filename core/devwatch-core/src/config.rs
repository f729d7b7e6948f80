//! Daemon configuration.
//!
//! Loaded once at startup and never mutated. Layers, lowest first:
//! built-in defaults, an optional TOML file named by `DEVWATCH_CONFIG`,
//! then individual environment variables.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "DEVWATCH_CONFIG";

const DEFAULT_USER: &str = "jerry";
const DEFAULT_LOG_DIR: &str = "/var/log/dev-activity";
const DEFAULT_BACKUP_SCRIPT: &str = "/opt/dev-monitoring/dev_local_backup.sh";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_IDLE_SHUTDOWN_MINUTES: u64 = 30;
const DEFAULT_CPU_IDLE_THRESHOLD: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub user: String,
    pub projects_root: PathBuf,
    pub log_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub idle_shutdown_minutes: u64,
    pub cpu_idle_threshold: f32,
    pub backup_script: PathBuf,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_user(DEFAULT_USER)
    }
}

/// Shape of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    user: Option<String>,
    projects_root: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    poll_interval_secs: Option<u64>,
    idle_shutdown_minutes: Option<u64>,
    cpu_idle_threshold: Option<f32>,
    backup_script: Option<PathBuf>,
    dry_run: Option<bool>,
}

impl Config {
    /// Defaults for a given user; the projects root follows the user's home.
    pub fn for_user(user: &str) -> Self {
        Self {
            user: user.to_string(),
            projects_root: default_projects_root(user),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            idle_shutdown_minutes: DEFAULT_IDLE_SHUTDOWN_MINUTES,
            cpu_idle_threshold: DEFAULT_CPU_IDLE_THRESHOLD,
            backup_script: PathBuf::from(DEFAULT_BACKUP_SCRIPT),
            dry_run: false,
        }
    }

    /// Loads from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads using an arbitrary variable lookup, so tests need not touch the
    /// real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup(CONFIG_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            Some(path) => load_config_file(Path::new(&path))?,
            None => ConfigFile::default(),
        };

        let user = lookup("DEV_USER")
            .or(file.user)
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        let mut config = Config::for_user(&user);

        if let Some(path) = lookup("PROJECTS_ROOT")
            .map(PathBuf::from)
            .or(file.projects_root)
        {
            config.projects_root = path;
        }
        if let Some(path) = lookup("ACTIVITY_LOG_DIR").map(PathBuf::from).or(file.log_dir) {
            config.log_dir = path;
        }
        if let Some(path) = lookup("BACKUP_SCRIPT")
            .map(PathBuf::from)
            .or(file.backup_script)
        {
            config.backup_script = path;
        }

        config.poll_interval_secs = parse_override(
            &lookup,
            "CHECK_INTERVAL_SECONDS",
            file.poll_interval_secs,
            config.poll_interval_secs,
        )?;
        config.idle_shutdown_minutes = parse_override(
            &lookup,
            "IDLE_SHUTDOWN_MINUTES",
            file.idle_shutdown_minutes,
            config.idle_shutdown_minutes,
        )?;
        config.cpu_idle_threshold = parse_override(
            &lookup,
            "CPU_IDLE_THRESHOLD",
            file.cpu_idle_threshold,
            config.cpu_idle_threshold,
        )?;
        config.dry_run = match lookup("DEVWATCH_DRY_RUN") {
            Some(value) => parse_flag("DEVWATCH_DRY_RUN", &value)?,
            None => file.dry_run.unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user.trim().is_empty() {
            return Err(invalid("DEV_USER", "must not be empty"));
        }
        if !self.projects_root.is_absolute() {
            return Err(invalid(
                "PROJECTS_ROOT",
                format!("must be absolute, got {}", self.projects_root.display()),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(invalid("CHECK_INTERVAL_SECONDS", "must be at least 1"));
        }
        if self.idle_shutdown_minutes == 0 {
            return Err(invalid("IDLE_SHUTDOWN_MINUTES", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.cpu_idle_threshold) {
            return Err(invalid(
                "CPU_IDLE_THRESHOLD",
                format!("must be between 0 and 100, got {}", self.cpu_idle_threshold),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_shutdown_minutes.saturating_mul(60))
    }

    pub fn activity_log_path(&self) -> PathBuf {
        devwatch_events::activity_log_path(&self.log_dir, &self.user)
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.log_dir.join("screenshots")
    }

    pub fn keystroke_log_path(&self) -> PathBuf {
        self.log_dir.join("keystrokes").join("logkeys.log")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.log_dir.join("daemon")
    }

    /// `.Xauthority` of the monitored user, for commands run on their display.
    pub fn xauthority_path(&self) -> PathBuf {
        user_home(&self.user).join(".Xauthority")
    }
}

fn user_home(user: &str) -> PathBuf {
    PathBuf::from("/home").join(user)
}

fn default_projects_root(user: &str) -> PathBuf {
    user_home(user).join("projects")
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let content = fs_err::read_to_string(path)
        .map_err(|err| CoreError::io(format!("reading {}", path.display()), err))?;
    toml::from_str::<ConfigFile>(&content).map_err(|err| CoreError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

fn parse_override<F, T>(lookup: &F, key: &str, from_file: Option<T>, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| invalid(key, format!("{:?}: {}", raw, err))),
        None => Ok(from_file.unwrap_or(default)),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" | "" => Ok(false),
        other => Err(invalid(key, format!("{:?} is not a boolean", other))),
    }
}

fn invalid(key: &str, details: impl Into<String>) -> CoreError {
    CoreError::ConfigInvalid {
        key: key.to_string(),
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.user, "jerry");
        assert_eq!(config.projects_root, PathBuf::from("/home/jerry/projects"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/dev-activity"));
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.idle_shutdown_minutes, 30);
        assert_eq!(config.cpu_idle_threshold, 5.0);
        assert!(!config.dry_run);
    }

    #[test]
    fn projects_root_follows_user_when_unset() {
        let config = Config::from_lookup(lookup_from(&[("DEV_USER", "ana")])).expect("config");
        assert_eq!(config.projects_root, PathBuf::from("/home/ana/projects"));
        assert_eq!(
            config.activity_log_path(),
            PathBuf::from("/var/log/dev-activity/ana_activity.jsonl")
        );
    }

    #[test]
    fn env_values_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PROJECTS_ROOT", "/srv/code"),
            ("CHECK_INTERVAL_SECONDS", "10"),
            ("IDLE_SHUTDOWN_MINUTES", "1"),
            ("CPU_IDLE_THRESHOLD", "12.5"),
            ("DEVWATCH_DRY_RUN", "yes"),
        ]))
        .expect("config");
        assert_eq!(config.projects_root, PathBuf::from("/srv/code"));
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.idle_threshold(), Duration::from_secs(60));
        assert_eq!(config.cpu_idle_threshold, 12.5);
        assert!(config.dry_run);
    }

    #[test]
    fn unparseable_env_value_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("CHECK_INTERVAL_SECONDS", "five")]))
            .expect_err("should fail");
        assert!(matches!(err, CoreError::ConfigInvalid { ref key, .. } if key == "CHECK_INTERVAL_SECONDS"));
    }

    #[test]
    fn zero_interval_and_out_of_range_cpu_are_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("CHECK_INTERVAL_SECONDS", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("IDLE_SHUTDOWN_MINUTES", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("CPU_IDLE_THRESHOLD", "150")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("PROJECTS_ROOT", "projects")])).is_err());
    }

    #[test]
    fn toml_file_sits_between_defaults_and_env() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("devwatch.toml");
        fs_err::write(
            &path,
            r#"
user = "ana"
poll_interval_secs = 15
idle_shutdown_minutes = 45
backup_script = "/usr/local/bin/backup.sh"
"#,
        )
        .expect("write config");
        let path_str = path.to_string_lossy().to_string();

        let config = Config::from_lookup(lookup_from(&[
            (CONFIG_PATH_ENV, path_str.as_str()),
            ("IDLE_SHUTDOWN_MINUTES", "20"),
        ]))
        .expect("config");
        assert_eq!(config.user, "ana");
        assert_eq!(config.poll_interval_secs, 15);
        assert_eq!(config.idle_shutdown_minutes, 20);
        assert_eq!(config.backup_script, PathBuf::from("/usr/local/bin/backup.sh"));
        assert_eq!(config.projects_root, PathBuf::from("/home/ana/projects"));
    }

    #[test]
    fn missing_toml_file_means_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let path_str = path.to_string_lossy().to_string();
        let config =
            Config::from_lookup(lookup_from(&[(CONFIG_PATH_ENV, path_str.as_str())])).expect("config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_toml_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("bad.toml");
        fs_err::write(&path, "poll_interval_secs = \"soon\"\n").expect("write config");
        let path_str = path.to_string_lossy().to_string();
        let err = Config::from_lookup(lookup_from(&[(CONFIG_PATH_ENV, path_str.as_str())]))
            .expect_err("should fail");
        assert!(matches!(err, CoreError::ConfigMalformed { .. }));
    }
}
