use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use knobs_channel::{ChannelConfig, Endpoint};

use crate::exit::{channel_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod info;
pub mod serve;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print knob values as they change.
    Watch(WatchArgs),
    /// Connect, wait for one frame and print channel status.
    Info(InfoArgs),
    /// Run a knob server fed from stdin.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Watch(args) => watch::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where to connect and how many knobs to expect.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Knob server host. Default: localhost.
    #[arg(long, env = "KNOBS_HOST")]
    pub host: Option<String>,
    /// Knob server port. Default: 8008.
    #[arg(long, env = "KNOBS_PORT")]
    pub port: Option<u16>,
    /// Number of knobs per frame. Default: 24.
    #[arg(long)]
    pub knobs: Option<usize>,
    /// JSON channel config; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConnectArgs {
    pub fn channel_config(&self) -> CliResult<ChannelConfig> {
        let mut config = match &self.config {
            Some(path) => {
                ChannelConfig::load(path).map_err(|err| channel_error("config", err))?
            }
            None => ChannelConfig::default(),
        };

        if self.host.is_some() || self.port.is_some() {
            let host = self
                .host
                .clone()
                .unwrap_or_else(|| config.endpoint.host.clone());
            let port = self.port.unwrap_or(config.endpoint.port);
            config.endpoint = Endpoint::new(host, port);
        }
        if let Some(knobs) = self.knobs {
            config.capacity = knobs;
        }
        if config.capacity == 0 {
            return Err(CliError::usage("--knobs must be greater than zero"));
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Polling interval (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Exit after printing N updates.
    #[arg(long)]
    pub count: Option<usize>,
    /// Lower end of the printed range.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub min: f32,
    /// Upper end of the printed range.
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub max: f32,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// How long to wait for the server and its first frame (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8008")]
    pub bind: String,
    /// Number of knobs. Default: length of --values, else 24.
    #[arg(long)]
    pub knobs: Option<usize>,
    /// Initial raw values (comma-separated, 0-255).
    #[arg(long, value_delimiter = ',')]
    pub values: Option<Vec<u8>>,
    /// JSON file to restore values from on start; saved after each stdin
    /// update and on exit.
    #[arg(long, value_name = "FILE")]
    pub state_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
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
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
