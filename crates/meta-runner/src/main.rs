//! Gamebuino META host binary.
//!
//! Opens a window with the console skin and runs the built-in test card
//! engine, or runs headless to capture screenshots.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use meta_runner::capture::{self, HeadlessOptions};
use meta_runner::config::{Background, ConfigFile};
use meta_runner::loader::{self, ProgramSource};
use meta_runner::testcard::TestCard;
use meta_runner::{HostConfig, RunnerConfig};

#[derive(Debug, Parser)]
#[command(name = "meta-runner", version, about = "Run Gamebuino META programs")]
struct Cli {
    /// Program image: a path, an http(s) URL, or `-` for stdin.
    source: Option<String>,

    /// Surround the screen with the console (`console`) or nothing (`none`).
    #[arg(long)]
    background: Option<Background>,

    /// Start in borderless fullscreen.
    #[arg(long)]
    fullscreen: bool,

    /// Integer window scale.
    #[arg(long)]
    scale: Option<u32>,

    /// TOML file with defaults for the options above.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without a window or audio.
    #[arg(long)]
    headless: bool,

    /// Frames to run in headless mode.
    #[arg(long, default_value_t = 200, requires = "headless")]
    frames: u32,

    /// Save the last headless frame as a PNG.
    #[arg(long, requires = "headless")]
    screenshot: Option<PathBuf>,

    /// Save every headless frame as a PNG into this directory.
    #[arg(long, requires = "headless")]
    record: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let file = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };

    let mut host = file.host_config();
    if let Some(source) = &cli.source {
        host.source = Some(source.clone());
    }
    if let Some(background) = cli.background {
        host.background = background;
    }
    host.fullscreen |= cli.fullscreen;

    // Stdin is read up front; everything else goes through the loader.
    let stdin_program = if host.source.as_deref() == Some("-") {
        host.source = None;
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        Some(ProgramSource::Bytes {
            name: "stdin".into(),
            data,
        })
    } else {
        None
    };

    if cli.headless {
        return run_headless(&cli, &host, stdin_program);
    }

    let config = RunnerConfig {
        scale: cli.scale.or(file.scale),
        program: stdin_program,
        ..RunnerConfig::default()
    };
    meta_runner::run(TestCard::new, config, host)?;
    Ok(())
}

fn run_headless(
    cli: &Cli,
    host: &HostConfig,
    stdin_program: Option<ProgramSource>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = match (stdin_program, &host.source) {
        (Some(program), _) => program,
        (None, Some(source)) => ProgramSource::parse(source),
        (None, None) => return Err("headless mode needs a program".into()),
    };
    let program = loader::acquire(&source)?;

    let options = HeadlessOptions {
        frames: cli.frames,
        screenshot: cli.screenshot.clone(),
        record: cli.record.clone(),
    };
    capture::run_headless(TestCard::new, &program, &options)?;
    log::info!("Ran {} frames of {source}", cli.frames);
    Ok(())
}
