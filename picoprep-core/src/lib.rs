//! The core, UI-agnostic library for the `picoprep` provisioning utility.
//!
//! `picoprep-core` is designed to be used as a library by any front-end,
//! whether it's a command-line interface (like `picoprep`) or something
//! richer. It sequences the physically-constrained state transitions of
//! provisioning a USB microcontroller board: waiting for the bootloader
//! volume to mount, fetching and copying UF2 firmware onto it, waiting for
//! the board to re-enumerate as the runtime volume, and deploying project
//! files there. A persisted step ledger makes the whole flow resumable
//! across invocations.
//!
//! The library is structured into several key modules:
//! - [`config`]: The explicit configuration value handed to the orchestrator.
//! - [`volume`]: The `VolumeObserver` capability and the blocking drive
//!   watcher.
//! - [`runner`]: The external-command seam (`curl`, `git`).
//! - [`fetch`]: Idempotent artifact download and content hashing.
//! - [`copy`]: File and directory-replace copies onto mounted volumes.
//! - [`ledger`]: The persisted set of completed steps.
//! - [`provision`]: The phase state machine tying it all together.
//!
//! The primary entry point is [`provision::Provisioner::run`]. It reports
//! progress through a single event callback, allowing the calling
//! application to display progress in any way it chooses.
//!
//! ## Example: a full provisioning run
//!
//! ```rust,no_run
//! use picoprep_core::config::Config;
//! use picoprep_core::provision::Provisioner;
//! use picoprep_core::runner::ShellRunner;
//! use picoprep_core::volume::SystemVolumes;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! fn main() -> picoprep_core::error::Result<()> {
//!     // A shared flag to allow for graceful cancellation.
//!     let running = Arc::new(AtomicBool::new(true));
//!
//!     let mut provisioner =
//!         Provisioner::new(Config::default(), &SystemVolumes, &ShellRunner, running)?;
//!
//!     provisioner.run(&mut |event| {
//!         println!("{event:?}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod copy;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod provision;
pub mod runner;
pub mod volume;
