use super::Probe;
use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::{DirEntry, WalkDir};

/// Files under the projects root modified within the last poll window.
///
/// Hidden files and directories (including `.git`) are skipped: tooling
/// churn inside them says nothing about whether a person is working.
pub struct ModifiedFilesProbe {
    root: PathBuf,
    window: Duration,
}

impl ModifiedFilesProbe {
    pub fn new(root: PathBuf, window: Duration) -> Self {
        Self { root, window }
    }
}

impl Probe for ModifiedFilesProbe {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "modified_files"
    }

    fn sample(&mut self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(CoreError::probe(
                "modified_files",
                format!("projects root {} is not a directory", self.root.display()),
            ));
        }
        let since = SystemTime::now()
            .checked_sub(self.window)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(modified_since(&self.root, since))
    }

    fn neutral(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Relative paths of regular files under `root` with an mtime after `since`,
/// sorted for stable output.
pub fn modified_since(root: &Path, since: SystemTime) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .map(|mtime| mtime > since)
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().to_string())
        })
        .collect();
    files.sort();
    files
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs_err as fs;

    #[test]
    fn finds_recent_files_and_skips_hidden() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("app/src")).expect("src dir");
        fs::create_dir_all(root.join("app/.git/objects")).expect("git dir");
        fs::write(root.join("app/src/main.rs"), "fn main() {}").expect("file");
        fs::write(root.join("app/.git/objects/abc"), "blob").expect("git file");
        fs::write(root.join("app/.env"), "SECRET=1").expect("dotfile");

        let since = SystemTime::now() - Duration::from_secs(60);
        let files = modified_since(root, since);
        assert_eq!(files, vec!["app/src/main.rs".to_string()]);
    }

    #[test]
    fn old_files_are_not_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path();
        fs::write(root.join("notes.md"), "old").expect("file");

        let since = SystemTime::now() + Duration::from_secs(60);
        assert!(modified_since(root, since).is_empty());
    }

    #[test]
    fn missing_root_is_neutral() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut probe =
            ModifiedFilesProbe::new(temp_dir.path().join("nope"), Duration::from_secs(5));
        assert!(probe.read().is_empty());
    }

    #[test]
    fn probe_reports_file_written_just_now() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        fs::write(temp_dir.path().join("lib.rs"), "pub fn f() {}").expect("file");
        let mut probe = ModifiedFilesProbe::new(temp_dir.path().to_path_buf(), Duration::from_secs(5));
        assert_eq!(probe.read(), vec!["lib.rs".to_string()]);
    }
}
