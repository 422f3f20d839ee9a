use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod core;
pub mod display;
pub mod profiles;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the core: accept one display on a Unix socket and drive it.
    Core(CoreArgs),
    /// Act as a display: connect, handshake and print received state.
    Display(DisplayArgs),
    /// Load terrarium profiles and print the resulting slots.
    Profiles(ProfilesArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Core(args) => core::run(args),
        Command::Display(args) => display::run(args, format),
        Command::Profiles(args) => profiles::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CoreArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Profile directory to load at startup.
    #[arg(long, value_name = "DIR")]
    pub profiles: Option<PathBuf>,
    /// State publish period (e.g. 1s, 250ms).
    #[arg(long)]
    pub publish_interval: Option<String>,
    /// Send STATE_DELTA between full snapshots.
    #[arg(long)]
    pub delta: bool,
    /// Ping a silent display and drop readiness when it stops answering.
    #[arg(long)]
    pub watchdog: bool,
}

#[derive(Args, Debug)]
pub struct DisplayArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Panel width announced in DISPLAY_READY.
    #[arg(long, default_value = "1024")]
    pub width: u16,
    /// Panel height announced in DISPLAY_READY.
    #[arg(long, default_value = "600")]
    pub height: u16,
    /// Exit after printing N snapshots.
    #[arg(long)]
    pub count: Option<usize>,
    /// Press the panel at this X coordinate after the handshake.
    #[arg(long, value_name = "X")]
    pub touch: Option<u16>,
    /// Ask the core to reload profiles (optionally from DIR) after the handshake.
    #[arg(long, value_name = "DIR", num_args = 0..=1, default_missing_value = "")]
    pub reload: Option<String>,
    /// How long to keep retrying the connection.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Profile directory. Without it the built-in profiles are shown.
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
