//! The provisioning orchestrator.
//!
//! Sequences the end-to-end flow as an explicit state machine, branching on
//! the hardware state observed at start: clone the project repository, flash
//! firmware onto the bootloader volume (unless the board already runs
//! firmware), deploy project files onto the runtime volume, clean up cached
//! downloads. Each phase checks the step ledger first and is a pure skip when
//! already recorded, which is what makes a re-invocation after any failure
//! resume at the first incomplete phase.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::copy;
use crate::error::{ProvisionError, Result};
use crate::fetch;
use crate::ledger::{Step, StepLedger};
use crate::runner::CommandRunner;
use crate::volume::{VolumeObserver, wait_for_volume};

/// Discrete states of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    RepoReady,
    Flashed,
    FilesCopied,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::RepoReady => "repo_ready",
            Phase::Flashed => "flashed",
            Phase::FilesCopied => "files_copied",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    /// Legal transitions out of this phase. `RepoReady` may go straight to
    /// `FilesCopied` when the runtime volume was already mounted at start.
    pub fn valid_next_phases(self) -> &'static [Phase] {
        match self {
            Phase::Start => &[Phase::RepoReady, Phase::Failed],
            Phase::RepoReady => &[Phase::Flashed, Phase::FilesCopied, Phase::Failed],
            Phase::Flashed => &[Phase::FilesCopied, Phase::Failed],
            Phase::FilesCopied => &[Phase::Done, Phase::Failed],
            Phase::Done => &[],
            // A fresh invocation is the recovery path.
            Phase::Failed => &[Phase::Start],
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

/// Progress notifications emitted during a run.
///
/// The library never prints; front-ends subscribe to this stream and render
/// it however they like.
#[derive(Debug)]
pub enum Event {
    PhaseChanged(Phase),
    /// The phase's work was already recorded in the ledger.
    StepSkipped(Step),
    StepCompleted(Step),
    /// Observed at start: the board already runs firmware, flashing will be
    /// skipped entirely.
    RuntimeAlreadyMounted(PathBuf),
    WaitingForVolume { path: PathBuf, waited: Duration },
    VolumeReady(PathBuf),
    Cloning { url: String },
    Downloading { name: String, url: String },
    /// Artifact present on disk with its content digest.
    ArtifactReady { name: String, sha256: String },
    Copying { src: PathBuf, dest: PathBuf },
    CleaningUp,
}

pub struct Provisioner<'a> {
    config: Config,
    volumes: &'a dyn VolumeObserver,
    runner: &'a dyn CommandRunner,
    running: Arc<AtomicBool>,
    ledger: StepLedger,
    phase: Phase,
}

impl<'a> Provisioner<'a> {
    /// Load the ledger and prepare a run. No side effects yet.
    pub fn new(
        config: Config,
        volumes: &'a dyn VolumeObserver,
        runner: &'a dyn CommandRunner,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let ledger = StepLedger::load(&config.ledger_path)?;
        Ok(Provisioner {
            config,
            volumes,
            runner,
            running,
            ledger,
            phase: Phase::Start,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ledger(&self) -> &StepLedger {
        &self.ledger
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the full flow. On error the orchestrator lands in
    /// [`Phase::Failed`] and the error is surfaced unchanged; the ledger
    /// already reflects every phase that completed, so the next invocation
    /// resumes from there.
    pub fn run(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        let result = self.run_inner(events);
        if result.is_err() {
            self.phase = Phase::Failed;
        }
        result
    }

    fn run_inner(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        // Branch on observed hardware: a mounted runtime volume means the
        // board already carries firmware from a prior run.
        let runtime_present = self.volumes.is_mounted(&self.config.runtime_volume);
        if runtime_present {
            log::info!(
                "{} already mounted, flashing will be skipped",
                self.config.runtime_volume.display()
            );
            events(Event::RuntimeAlreadyMounted(
                self.config.runtime_volume.clone(),
            ));
        }

        self.setup_repo(events)?;
        if !runtime_present {
            self.flash_device(events)?;
        }
        self.copy_files(events)?;
        self.cleanup(events)?;
        Ok(())
    }

    fn transition(&mut self, next: Phase, events: &mut dyn FnMut(Event)) {
        assert!(
            self.phase.can_transition_to(next),
            "illegal phase transition {} -> {}",
            self.phase.as_str(),
            next.as_str()
        );
        self.phase = next;
        events(Event::PhaseChanged(next));
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProvisionError::Cancelled)
        }
    }

    /// Clone the project repository unless its folder already exists.
    fn setup_repo(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        self.check_cancelled()?;
        if self.ledger.has_completed(Step::RepoSetup) {
            events(Event::StepSkipped(Step::RepoSetup));
        } else {
            if !self.config.repo.folder.exists() {
                events(Event::Cloning {
                    url: self.config.repo.url.clone(),
                });
                let folder = self.config.repo.folder.to_string_lossy();
                self.runner.run(
                    "git",
                    &["clone", &self.config.repo.url, folder.as_ref()],
                    None,
                )?;
            }
            self.ledger.mark_completed(Step::RepoSetup)?;
            events(Event::StepCompleted(Step::RepoSetup));
        }
        self.transition(Phase::RepoReady, events);
        Ok(())
    }

    /// Copy each firmware artifact onto the bootloader volume.
    ///
    /// Copying a UF2 image makes the board reboot and re-enumerate under a
    /// different volume identity, so after every artifact the bootloader
    /// volume is awaited afresh and a reboot delay elapses.
    fn flash_device(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        self.check_cancelled()?;
        if self.ledger.has_completed(Step::DeviceFlashed) {
            events(Event::StepSkipped(Step::DeviceFlashed));
            self.transition(Phase::Flashed, events);
            return Ok(());
        }

        let timing = self.config.wait_timing();
        let bootloader = self.config.bootloader_volume.clone();

        for spec in self.config.artifacts.clone() {
            log::info!("flashing {}", spec.name);
            wait_for_volume(self.volumes, &bootloader, &timing, &self.running, |waited| {
                events(Event::WaitingForVolume {
                    path: bootloader.clone(),
                    waited,
                });
            })?;
            events(Event::VolumeReady(bootloader.clone()));

            let cached = self.config.download_dir.join(&spec.name);
            if !cached.exists() {
                events(Event::Downloading {
                    name: spec.name.clone(),
                    url: spec.url.clone(),
                });
            }
            let sha256 = fetch::ensure_artifact(self.runner, &spec, &self.config.download_dir)?;
            events(Event::ArtifactReady {
                name: spec.name.clone(),
                sha256,
            });

            events(Event::Copying {
                src: cached.clone(),
                dest: bootloader.clone(),
            });
            copy::copy_onto_volume(
                self.volumes,
                &cached,
                &bootloader,
                &timing,
                &self.running,
                |waited| {
                    events(Event::WaitingForVolume {
                        path: bootloader.clone(),
                        waited,
                    });
                },
            )?;

            // Board reboots into the new image and re-enumerates.
            thread::sleep(self.config.reboot_delay());
        }

        self.ledger.mark_completed(Step::DeviceFlashed)?;
        events(Event::StepCompleted(Step::DeviceFlashed));
        self.transition(Phase::Flashed, events);
        Ok(())
    }

    /// Deploy every entry of the repo checkout onto the runtime volume.
    fn copy_files(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        self.check_cancelled()?;
        if self.ledger.has_completed(Step::FilesCopied) {
            events(Event::StepSkipped(Step::FilesCopied));
            self.transition(Phase::FilesCopied, events);
            return Ok(());
        }

        let timing = self.config.wait_timing();
        let runtime = self.config.runtime_volume.clone();

        wait_for_volume(self.volumes, &runtime, &timing, &self.running, |waited| {
            events(Event::WaitingForVolume {
                path: runtime.clone(),
                waited,
            });
        })?;
        events(Event::VolumeReady(runtime.clone()));

        for entry in fs::read_dir(&self.config.repo.folder)? {
            let entry = entry?;
            if entry.file_name() == copy::METADATA_FILE {
                continue;
            }
            let src = entry.path();
            events(Event::Copying {
                src: src.clone(),
                dest: runtime.clone(),
            });
            copy::copy_entry(&src, &runtime)?;
        }
        thread::sleep(timing.settle_delay);

        self.ledger.mark_completed(Step::FilesCopied)?;
        events(Event::StepCompleted(Step::FilesCopied));
        self.transition(Phase::FilesCopied, events);
        Ok(())
    }

    /// Delete locally cached artifacts; the repo checkout and the ledger
    /// stay.
    fn cleanup(&mut self, events: &mut dyn FnMut(Event)) -> Result<()> {
        events(Event::CleaningUp);
        for spec in &self.config.artifacts {
            let cached = self.config.download_dir.join(&spec.name);
            if cached.exists() {
                log::debug!("removing cached {}", cached.display());
                fs::remove_file(&cached)?;
            }
        }
        self.transition(Phase::Done, events);
        Ok(())
    }
}
