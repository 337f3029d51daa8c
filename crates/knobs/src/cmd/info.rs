use std::thread;
use std::time::{Duration, Instant};

use knobs_channel::{ChannelError, KnobChannel};
use knobs_transport::TransportError;

use crate::cmd::{parse_duration, InfoArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_info, OutputFormat};

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = args.connect.channel_config()?.with_connect_timeout(timeout);
    let capacity = config.capacity;
    let deadline = Instant::now() + timeout;

    let channel = KnobChannel::new(config);
    start_with_retry(&channel, capacity, deadline, timeout)?;

    while channel.snapshot().sequence() == 0 {
        if !channel.is_running() {
            return Err(CliError::new(
                FAILURE,
                "knob server closed the connection before sending values",
            ));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("no knob frame received within {timeout:?}"),
            ));
        }
        thread::sleep(Duration::from_millis(10));
    }

    let snapshot = channel.snapshot();
    let status = channel.status();
    print_info(&status, &snapshot, format);

    channel.stop();
    Ok(SUCCESS)
}

fn start_with_retry(
    channel: &KnobChannel,
    capacity: usize,
    deadline: Instant,
    timeout: Duration,
) -> CliResult<()> {
    loop {
        match channel.start(capacity) {
            Ok(_) => return Ok(()),
            Err(err) => {
                if !is_retryable_connect_error(&err) {
                    return Err(channel_error("connect failed", err));
                }
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn is_retryable_connect_error(err: &ChannelError) -> bool {
    match err {
        ChannelError::Transport(TransportError::Connect { source, .. }) => matches!(
            source.kind(),
            std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::NotFound
                | std::io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}
