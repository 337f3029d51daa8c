use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use knobs_channel::KnobServer;
use knobs_frame::{raw_from_normalized, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

/// On-disk knob state.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct KnobState {
    values: Vec<u8>,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let values = initial_values(&args)?;
    let server = Arc::new(
        KnobServer::spawn_with_values(&args.bind, values)
            .map_err(|err| channel_error("bind failed", err))?,
    );
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    print_listening(server.local_addr(), server.capacity(), format);

    let stdin_server = Arc::clone(&server);
    let stdin_state = args.state_file.clone();
    thread::Builder::new()
        .name("knobs-stdin".to_string())
        .spawn(move || {
            read_updates(&stdin_server, io::stdin().lock(), stdin_state.as_deref());
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to spawn stdin reader: {err}")))?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    if let Some(path) = &args.state_file {
        save_state(path, &server.values())?;
        info!(path = %path.display(), "saved knob state");
    }
    server.shutdown();
    Ok(SUCCESS)
}

fn initial_values(args: &ServeArgs) -> CliResult<Vec<u8>> {
    if let Some(values) = &args.values {
        if values.is_empty() {
            return Err(CliError::usage("--values must not be empty"));
        }
        if let Some(knobs) = args.knobs {
            if knobs != values.len() {
                return Err(CliError::usage(format!(
                    "--knobs {knobs} does not match {} --values",
                    values.len()
                )));
            }
        }
        return Ok(values.clone());
    }

    let knobs = args.knobs.unwrap_or(DEFAULT_CAPACITY);
    if knobs == 0 {
        return Err(CliError::usage("--knobs must be greater than zero"));
    }

    if let Some(path) = &args.state_file {
        if let Some(saved) = load_state(path)? {
            if saved.len() == knobs {
                info!(path = %path.display(), "restored knob state");
                return Ok(saved);
            }
            warn!(
                path = %path.display(),
                saved = saved.len(),
                knobs,
                "ignoring knob state with a different knob count"
            );
        }
    }

    Ok(vec![0u8; knobs])
}

fn load_state(path: &Path) -> CliResult<Option<Vec<u8>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_error(&format!("failed reading {}", path.display()), err)),
    };
    let state: KnobState = serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("invalid knob state in {}: {err}", path.display()),
        )
    })?;
    Ok(Some(state.values))
}

fn save_state(path: &Path, values: &[u8]) -> CliResult<()> {
    let state = KnobState {
        values: values.to_vec(),
    };
    let text = serde_json::to_string_pretty(&state)
        .map_err(|err| CliError::new(INTERNAL, format!("failed encoding knob state: {err}")))?;
    fs::write(path, text)
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))
}

/// Apply `<index> <value>` lines to `server` until the input ends, saving
/// to `state_file` after each applied update.
fn read_updates(server: &KnobServer, input: impl BufRead, state_file: Option<&Path>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        };

        match parse_update(&line) {
            Ok(Some((index, raw))) => match server.set(index, raw) {
                Ok(()) => {
                    debug!(index, raw, "knob updated");
                    if let Some(path) = state_file {
                        if let Err(err) = save_state(path, &server.values()) {
                            warn!(
                                path = %path.display(),
                                error = %err.message,
                                "failed saving knob state"
                            );
                        }
                    }
                }
                Err(err) => warn!(error = %err, "update rejected"),
            },
            Ok(None) => {}
            Err(reason) => warn!(line = %line, "{reason}"),
        }
    }
    debug!("stdin closed; serving current values");
}

/// Parse `<index> <value>`, where value is a raw byte or, with a decimal
/// point, a normalized value in `[0, 1]`. Blank lines and `#` comments
/// yield `None`.
fn parse_update(line: &str) -> Result<Option<(usize, u8)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let (Some(index), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("expected `<index> <value>`".to_string());
    };
    let index = index
        .parse::<usize>()
        .map_err(|_| format!("invalid knob index: {index}"))?;
    let raw = if value.contains('.') {
        let normalized = value
            .parse::<f32>()
            .map_err(|_| format!("invalid normalized value: {value}"))?;
        raw_from_normalized(normalized)
    } else {
        value
            .parse::<u8>()
            .map_err(|_| format!("invalid raw value (0-255): {value}"))?
    };
    Ok(Some((index, raw)))
}
