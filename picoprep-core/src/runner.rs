//! External command invocation.
//!
//! Downloads and clones go through a shell-level tool (`curl`, `git`). The
//! [`CommandRunner`] trait is the seam that lets tests assert a skipped phase
//! really invokes nothing.

use std::path::Path;
use std::process::Command;

use crate::error::{ProvisionError, Result};

pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()>;
}

/// Runs commands as real subprocesses.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        log::debug!("running `{} {}`", program, args.join(" "));
        let output = cmd.output()?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailure {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
