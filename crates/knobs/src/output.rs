use std::io::IsTerminal;
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use knobs_channel::{ChannelStatus, KnobSnapshot};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Output range for knob values.
#[derive(Clone, Copy, Debug)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Default for Range {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

#[derive(Serialize)]
struct ValuesOutput<'a> {
    sequence: u64,
    raw: &'a [u8],
    values: Vec<f32>,
}

#[derive(Serialize)]
struct InfoOutput<'a> {
    #[serde(flatten)]
    status: &'a ChannelStatus,
    sequence: u64,
    raw: &'a [u8],
    values: Vec<f32>,
}

#[derive(Serialize)]
struct ListeningOutput {
    listening: String,
    knobs: usize,
}

fn scaled(snapshot: &KnobSnapshot, range: Range) -> Vec<f32> {
    (0..snapshot.capacity())
        .filter_map(|i| snapshot.get_range(i, range.min, range.max).ok())
        .collect()
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn values_table(snapshot: &KnobSnapshot, values: &[f32]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["KNOB", "RAW", "VALUE"]);
    for (index, (raw, value)) in snapshot.as_bytes().iter().zip(values).enumerate() {
        table.add_row(vec![index.to_string(), raw.to_string(), format!("{value:.3}")]);
    }
    table
}

fn pretty_values(values: &[f32]) -> String {
    values
        .iter()
        .map(|value| format!("{value:.3}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print one frame of knob values.
pub fn print_values(snapshot: &KnobSnapshot, range: Range, format: OutputFormat) {
    let values = scaled(snapshot, range);
    match format {
        OutputFormat::Json => print_json(&ValuesOutput {
            sequence: snapshot.sequence(),
            raw: snapshot.as_bytes(),
            values,
        }),
        OutputFormat::Table => println!("{}", values_table(snapshot, &values)),
        OutputFormat::Pretty => {
            println!("#{:<6} {}", snapshot.sequence(), pretty_values(&values));
        }
    }
}

/// Print channel status followed by the values it has received.
pub fn print_info(status: &ChannelStatus, snapshot: &KnobSnapshot, format: OutputFormat) {
    let values = scaled(snapshot, Range::default());
    match format {
        OutputFormat::Json => print_json(&InfoOutput {
            status,
            sequence: snapshot.sequence(),
            raw: snapshot.as_bytes(),
            values,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["endpoint".to_string(), status.endpoint.clone()])
                .add_row(vec!["state".to_string(), status.state.to_string()])
                .add_row(vec!["knobs".to_string(), status.capacity.to_string()])
                .add_row(vec![
                    "frames".to_string(),
                    status.frames_received.to_string(),
                ]);
            println!("{table}");
            println!("{}", values_table(snapshot, &values));
        }
        OutputFormat::Pretty => {
            println!("Knob Server:");
            println!("  Endpoint:  {}", status.endpoint);
            println!("  State:     {}", status.state);
            println!("  Knobs:     {}", status.capacity);
            println!("  Frames:    {}", status.frames_received);
            if let Some(err) = &status.last_error {
                println!("  Error:     {err}");
            }
            println!("  Values:    {}", pretty_values(&values));
        }
    }
}

/// Announce a running server.
pub fn print_listening(addr: SocketAddr, knobs: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            listening: addr.to_string(),
            knobs,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {addr} ({knobs} knobs)");
        }
    }
}
