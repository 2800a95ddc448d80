use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runs the `daybook` binary against a throwaway database and state file.
pub struct CliTestHarness {
    _temp_dir: TempDir,
    db_path: PathBuf,
    state_path: PathBuf,
    remote_dir: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("daybook.db");
        let state_path = temp_dir.path().join("state.json");
        let remote_dir = temp_dir.path().join("remote");

        Self {
            _temp_dir: temp_dir,
            db_path,
            state_path,
            remote_dir,
        }
    }

    /// A command isolated from the user's own config and data.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("daybook").expect("Failed to find daybook binary");
        cmd.current_dir(self._temp_dir.path())
            .env("DAYBOOK_DATABASE_PATH", &self.db_path)
            .env("DAYBOOK_STATE_PATH", &self.state_path)
            .env("DAYBOOK_REMOTE_DIR", &self.remote_dir)
            .env("RUST_LOG", "off");
        cmd
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn remote_dir(&self) -> &Path {
        &self.remote_dir
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    /// Runs an `add` command and returns the short id it printed.
    pub fn add(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        extract_short_id(&String::from_utf8_lossy(&output))
            .unwrap_or_else(|| panic!("no id in output of {args:?}"))
    }

    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        strip_ansi(&String::from_utf8_lossy(&output))
    }
}

pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Pulls the `(abcd1234)` id out of an "Added ..." line.
pub fn extract_short_id(output: &str) -> Option<String> {
    let plain = strip_ansi(output);
    let open = plain.rfind('(')?;
    let close = plain[open..].find(')')? + open;
    let id = &plain[open + 1..close];
    (id.len() == 8 && id.chars().all(|c| c.is_ascii_hexdigit())).then(|| id.to_string())
}

pub mod assertions {
    use predicates::prelude::*;

    pub fn has_error() -> impl Predicate<str> {
        predicate::str::contains("Error")
    }

    pub fn cancelled() -> impl Predicate<str> {
        predicate::str::contains("cancelled")
    }
}
