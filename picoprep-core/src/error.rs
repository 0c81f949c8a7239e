//! Typed errors for the provisioning pipeline.
//!
//! Every fallible operation in this crate surfaces one of these kinds.
//! `PermissionDenied` is split out from generic I/O so that front-ends can
//! give actionable guidance (re-run with elevated privileges) instead of a
//! bare errno message.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A volume never reported itself mounted within the deadline.
    #[error("timed out after {timeout:?} waiting for volume {} to mount", path.display())]
    DriveTimeout { path: PathBuf, timeout: Duration },

    /// An external command (download, clone) exited with a non-zero status.
    #[error("command `{program}` failed ({status}): {stderr}")]
    CommandFailure {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Insufficient OS privilege to touch a volume or spawn a subprocess.
    #[error("permission denied: {0}")]
    PermissionDenied(io::Error),

    /// A pinned artifact hash did not match the downloaded file.
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The shared running flag was cleared mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A persisted file (ledger, config) holds malformed JSON.
    #[error("invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for ProvisionError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ProvisionError::PermissionDenied(err),
            _ => ProvisionError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_routed_to_their_own_kind() {
        let err: ProvisionError =
            io::Error::new(io::ErrorKind::PermissionDenied, "EACCES").into();
        assert!(matches!(err, ProvisionError::PermissionDenied(_)));

        let err: ProvisionError = io::Error::new(io::ErrorKind::NotFound, "ENOENT").into();
        assert!(matches!(err, ProvisionError::Io(_)));
    }

    #[test]
    fn drive_timeout_names_the_volume() {
        let err = ProvisionError::DriveTimeout {
            path: PathBuf::from("/Volumes/RPI-RP2"),
            timeout: Duration::from_secs(30),
        };
        let msg = err.to_string();
        assert!(msg.contains("/Volumes/RPI-RP2"));
        assert!(msg.contains("30s"));
    }
}
