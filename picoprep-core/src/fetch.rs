//! Artifact fetching and content hashing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::ArtifactSpec;
use crate::error::{ProvisionError, Result};
use crate::runner::CommandRunner;

const BUFFER_SIZE: usize = 1024 * 1024; // 1 MiB

/// Make sure the artifact exists in `dir`, downloading it if absent, and
/// return the hex SHA-256 of the file on disk.
///
/// Repeated calls with the file already present skip the download entirely.
/// When a `sha256` is pinned, a differing digest is an error; unpinned
/// artifacts get their digest reported back for logging only.
pub fn ensure_artifact(
    runner: &dyn CommandRunner,
    spec: &ArtifactSpec,
    dir: &Path,
) -> Result<String> {
    let target = dir.join(&spec.name);

    if !target.exists() {
        log::info!("downloading {} from {}", spec.name, spec.url);
        let target_arg = target.to_string_lossy();
        runner.run("curl", &["-fSL", "-o", target_arg.as_ref(), &spec.url], None)?;
    } else {
        log::debug!("{} already present, skipping download", spec.name);
    }

    let digest = sha256_hex(&target)?;
    if let Some(expected) = &spec.sha256 {
        if !expected.eq_ignore_ascii_case(&digest) {
            return Err(ProvisionError::ChecksumMismatch {
                name: spec.name.clone(),
                expected: expected.clone(),
                actual: digest,
            });
        }
    }
    Ok(digest)
}

/// Streamed SHA-256 of a file, as lowercase hex.
pub fn sha256_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
