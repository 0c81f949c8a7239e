use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::fs;
use std::io::{IsTerminal, stdout};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use picoprep_core::config::Config;
use picoprep_core::error::ProvisionError;
use picoprep_core::ledger::{Step, StepLedger};
use picoprep_core::provision::{Event, Provisioner};
use picoprep_core::runner::ShellRunner;
use picoprep_core::volume::{SystemVolumes, VolumeObserver};

#[derive(Parser)]
#[command(name = "picoprep")]
#[command(about = "Resumable provisioning for CircuitPython boards", version)]
struct Cli {
    /// JSON config file overriding the built-in Pico defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provisioning flow, resuming at the first incomplete step
    Run {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show completed steps and current volume mount status
    Status,
    /// Delete the step ledger so the next run starts from scratch
    Reset {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Presents a final "Yes/No" confirmation to the user.
fn confirm_operation(prompt: &str) -> Result<bool> {
    let confirmation = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmation)
}

/// Maps the orchestrator's event stream onto terminal output. A spinner is
/// alive exactly while we are blocked waiting on a volume.
fn render_event(event: Event, spinner: &mut Option<ProgressBar>) {
    match event {
        Event::PhaseChanged(phase) => log::debug!("phase -> {}", phase.as_str()),
        Event::RuntimeAlreadyMounted(path) => println!(
            "{} already mounted, skipping the flashing phase",
            style(path.display()).cyan()
        ),
        Event::StepSkipped(step) => {
            println!("{}", style(format!("{step} already done, skipping")).dim())
        }
        Event::StepCompleted(step) => {
            println!("{} {step}", style("✔").green())
        }
        Event::WaitingForVolume { path, waited } => {
            let pb = spinner.get_or_insert_with(|| {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.blue} {msg}")
                        .unwrap(),
                );
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            });
            pb.set_message(format!(
                "[{:03}s] waiting for {} to mount...",
                waited.as_secs(),
                path.display()
            ));
        }
        Event::VolumeReady(path) => {
            if let Some(pb) = spinner.take() {
                pb.finish_with_message(format!("{} is ready", path.display()));
            }
        }
        Event::Cloning { url } => println!("cloning {}", style(url).cyan()),
        Event::Downloading { name, url } => {
            println!("downloading {} from {}", style(&name).cyan(), style(url).dim())
        }
        Event::ArtifactReady { name, sha256 } => {
            println!("{}", style(format!("{name} sha256={sha256}")).dim())
        }
        Event::Copying { src, dest } => println!(
            "copying {} -> {}",
            style(src.display()).cyan(),
            style(dest.display()).cyan()
        ),
        Event::CleaningUp => println!("cleaning up cached downloads"),
    }
}

fn cmd_run(config: Config, assume_yes: bool, running: Arc<AtomicBool>) -> Result<()> {
    println!(
        "Provisioning with {} firmware image(s) and project repo {}",
        config.artifacts.len(),
        style(&config.repo.url).cyan()
    );
    println!(
        "  Bootloader volume: {}",
        style(config.bootloader_volume.display()).cyan()
    );
    println!(
        "  Runtime volume:    {}",
        style(config.runtime_volume.display()).cyan()
    );
    println!();

    if !assume_yes && stdout().is_terminal() {
        if !confirm_operation("Proceed with provisioning?")? {
            println!("Provisioning cancelled.");
            return Ok(());
        }
        println!();
    }

    let mut provisioner = Provisioner::new(config, &SystemVolumes, &ShellRunner, running)?;

    let mut spinner: Option<ProgressBar> = None;
    let result = provisioner.run(&mut |event| render_event(event, &mut spinner));

    // On error, unblock the terminal before reporting.
    if let Some(pb) = spinner.take() {
        pb.finish_and_clear();
    }

    result?;
    println!("\n✨ Provisioning complete.");
    Ok(())
}

fn cmd_status(config: Config) -> Result<()> {
    let ledger = StepLedger::load(&config.ledger_path)?;

    println!("Ledger: {}", style(config.ledger_path.display()).cyan());
    for step in Step::ALL {
        let state = if ledger.has_completed(step) {
            style("done").green()
        } else {
            style("pending").yellow()
        };
        println!("  {:<16} {state}", step.as_str());
    }

    println!("\nVolumes:");
    for (label, path) in [
        ("bootloader", &config.bootloader_volume),
        ("runtime", &config.runtime_volume),
    ] {
        let state = if SystemVolumes.is_mounted(path) {
            style("mounted").green()
        } else {
            style("not mounted").dim()
        };
        let location = path.display().to_string();
        println!("  {:<11} {:<40} {state}", label, location);
    }
    Ok(())
}

fn cmd_reset(config: Config, assume_yes: bool) -> Result<()> {
    if !config.ledger_path.exists() {
        println!("No ledger at {}, nothing to reset.", config.ledger_path.display());
        return Ok(());
    }

    if !assume_yes && stdout().is_terminal() {
        let prompt = format!(
            "Delete {} so the next run repeats every step?",
            config.ledger_path.display()
        );
        if !confirm_operation(&prompt)? {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    fs::remove_file(&config.ledger_path)?;
    println!("Removed {}.", style(config.ledger_path.display()).cyan());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    // This flag allows for graceful cancellation of waits on volumes.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Run { yes } => cmd_run(config, yes, running),
        Commands::Status => cmd_status(config),
        Commands::Reset { yes } => cmd_reset(config, yes),
    };

    if let Err(err) = result {
        // Permission failures get an actionable hint instead of a bare errno.
        if matches!(
            err.downcast_ref::<ProvisionError>(),
            Some(ProvisionError::PermissionDenied(_))
        ) {
            eprintln!("{} {err:#}", style("error:").red().bold());
            eprintln!("Try re-running with elevated privileges, e.g. `sudo picoprep run`.");
            process::exit(1);
        }
        return Err(err);
    }
    Ok(())
}
