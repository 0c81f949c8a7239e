//! Provisioning configuration.
//!
//! The orchestrator takes an explicit [`Config`] value at construction; there
//! is no process-wide mutable state. Defaults describe a Raspberry Pi Pico
//! being set up with CircuitPython, and every field can be overridden from a
//! JSON file via [`Config::load`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::volume::WaitTiming;

/// A firmware image to fetch once and reuse across runs.
///
/// The file's presence in the download directory is the cache signal. When
/// `sha256` is pinned, the fetcher enforces it; when absent, the digest is
/// computed for reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// The project repository to clone and deploy onto the runtime volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    pub url: String,
    pub folder: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mount point the board exposes in bootloader (BOOTSEL) mode.
    pub bootloader_volume: PathBuf,
    /// Mount point the board exposes once firmware is running.
    pub runtime_volume: PathBuf,
    /// Firmware images copied onto the bootloader volume, in order.
    pub artifacts: Vec<ArtifactSpec>,
    pub repo: RepoSpec,
    /// Where the step ledger lives. Never deleted by a provisioning run.
    pub ledger_path: PathBuf,
    /// Where fetched artifacts are cached until cleanup.
    pub download_dir: PathBuf,
    pub poll_interval_ms: u64,
    pub mount_timeout_ms: u64,
    /// Pause after a mount is observed or a copy completes; removable media
    /// is not done the instant the path shows up.
    pub settle_delay_ms: u64,
    /// Pause after each firmware copy while the board re-enumerates.
    pub reboot_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bootloader_volume: default_mount("RPI-RP2"),
            runtime_volume: default_mount("CIRCUITPY"),
            artifacts: vec![
                ArtifactSpec {
                    name: "flash_nuke.uf2".into(),
                    url: "https://cdn-learn.adafruit.com/assets/assets/000/099/419/original/flash_nuke.uf2".into(),
                    sha256: None,
                },
                ArtifactSpec {
                    name: "adafruit-circuitpython-raspberry_pi_pico-en_US-8.0.0.uf2".into(),
                    url: "https://downloads.circuitpython.org/bin/raspberry_pi_pico/en_US/adafruit-circuitpython-raspberry_pi_pico-en_US-8.0.0.uf2".into(),
                    sha256: None,
                },
            ],
            repo: RepoSpec {
                url: "https://github.com/rohanod/copy_to_py.git".into(),
                folder: PathBuf::from("copy_to_py"),
            },
            ledger_path: PathBuf::from("setup_state.json"),
            download_dir: PathBuf::from("."),
            poll_interval_ms: 1000,
            mount_timeout_ms: 30_000,
            settle_delay_ms: 2000,
            reboot_delay_ms: 5000,
        }
    }
}

impl Config {
    /// Read a JSON config file. Missing fields fall back to the defaults.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| ProvisionError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn wait_timing(&self) -> WaitTiming {
        WaitTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.mount_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }
}

/// Where removable volumes land on this OS.
fn default_mount(name: &str) -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/Volumes").join(name)
    } else {
        let user = env::var("USER").unwrap_or_else(|_| "root".into());
        PathBuf::from("/run/media").join(user).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_a_pico() {
        let config = Config::default();
        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(config.artifacts[0].name, "flash_nuke.uf2");
        assert!(config.bootloader_volume.ends_with("RPI-RP2"));
        assert!(config.runtime_volume.ends_with("CIRCUITPY"));
        assert_eq!(config.wait_timing().timeout, Duration::from_secs(30));
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mount_timeout_ms": 5000, "runtime_volume": "/mnt/CIRCUITPY"}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mount_timeout_ms, 5000);
        assert_eq!(config.runtime_volume, PathBuf::from("/mnt/CIRCUITPY"));
        // untouched fields keep their defaults
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.repo.folder, PathBuf::from("copy_to_py"));
    }

    #[test]
    fn malformed_config_is_reported_as_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidJson { .. }));
    }
}
