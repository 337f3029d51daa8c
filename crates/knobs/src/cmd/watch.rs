use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use knobs_channel::KnobChannel;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, WatchArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_values, OutputFormat, Range};

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let range = Range {
        min: args.min,
        max: args.max,
    };
    let config = args.connect.channel_config()?;
    let capacity = config.capacity;

    let channel = KnobChannel::new(config);
    channel
        .start(capacity)
        .map_err(|err| channel_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut last_sequence = 0u64;
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        // Check liveness first so the final frame before a disconnect is still printed.
        let connected = channel.is_running();
        let snapshot = channel.snapshot();

        if snapshot.sequence() != last_sequence {
            last_sequence = snapshot.sequence();
            print_values(&snapshot, range, format);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                channel.stop();
                return Ok(SUCCESS);
            }
        }

        if !connected {
            return match channel.status().last_error {
                Some(err) => Err(CliError::new(FAILURE, format!("connection lost: {err}"))),
                None => {
                    info!("knob server closed the connection");
                    Ok(SUCCESS)
                }
            };
        }

        thread::sleep(interval);
    }

    channel.stop();
    Ok(SUCCESS)
}
