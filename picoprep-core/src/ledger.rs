//! The step ledger: a persisted record of completed provisioning phases.
//!
//! The ledger is a single JSON file of the form
//! `{"completed_steps": ["repo_setup", ...]}`. It is loaded once at startup
//! and rewritten in full immediately after every completed phase, so a crash
//! at any point leaves a durable, consistent state: either the phase is
//! recorded (its side effects are assumed durable) or it is re-run on the
//! next invocation, which is safe because every phase is idempotent.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// The coarse-grained provisioning phases the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RepoSetup,
    DeviceFlashed,
    FilesCopied,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::RepoSetup => "repo_setup",
            Step::DeviceFlashed => "device_flashed",
            Step::FilesCopied => "files_copied",
        }
    }

    pub const ALL: [Step; 3] = [Step::RepoSetup, Step::DeviceFlashed, Step::FilesCopied];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    completed_steps: Vec<String>,
}

#[derive(Debug)]
pub struct StepLedger {
    path: PathBuf,
    completed: Vec<String>,
}

impl StepLedger {
    /// Load the ledger from `path`. An absent file means an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let completed = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let file: LedgerFile =
                serde_json::from_str(&raw).map_err(|source| ProvisionError::InvalidJson {
                    path: path.clone(),
                    source,
                })?;
            file.completed_steps
        } else {
            Vec::new()
        };
        Ok(StepLedger { path, completed })
    }

    pub fn has_completed(&self, step: Step) -> bool {
        self.completed.iter().any(|s| s == step.as_str())
    }

    /// Record `step` as done and persist immediately. Marking an
    /// already-recorded step is a no-op.
    pub fn mark_completed(&mut self, step: Step) -> Result<()> {
        if self.has_completed(step) {
            return Ok(());
        }
        self.completed.push(step.as_str().to_string());
        self.save()
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let file = LedgerFile {
            completed_steps: self.completed.clone(),
        };
        let raw = serde_json::to_string(&file).map_err(|source| ProvisionError::InvalidJson {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_means_empty_ledger() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = StepLedger::load(tmp.path().join("setup_state.json")).unwrap();
        assert!(!ledger.has_completed(Step::RepoSetup));
        assert!(ledger.completed().is_empty());
    }

    #[test]
    fn marked_step_survives_a_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("setup_state.json");

        let mut ledger = StepLedger::load(&path).unwrap();
        ledger.mark_completed(Step::DeviceFlashed).unwrap();

        let reloaded = StepLedger::load(&path).unwrap();
        assert!(reloaded.has_completed(Step::DeviceFlashed));
        assert!(!reloaded.has_completed(Step::FilesCopied));
    }

    #[test]
    fn mark_persists_immediately_not_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("setup_state.json");

        let mut ledger = StepLedger::load(&path).unwrap();
        ledger.mark_completed(Step::RepoSetup).unwrap();

        // Read the file while the first handle is still alive.
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("repo_setup"));
        drop(ledger);
    }

    #[test]
    fn duplicate_marks_do_not_duplicate_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("setup_state.json");

        let mut ledger = StepLedger::load(&path).unwrap();
        ledger.mark_completed(Step::RepoSetup).unwrap();
        ledger.mark_completed(Step::RepoSetup).unwrap();

        assert_eq!(ledger.completed(), ["repo_setup"]);
    }

    #[test]
    fn malformed_ledger_is_surfaced_not_silently_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("setup_state.json");
        fs::write(&path, "{broken").unwrap();

        let err = StepLedger::load(&path).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidJson { .. }));
    }
}
