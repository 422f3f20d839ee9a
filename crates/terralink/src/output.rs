use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use terralink_link::{CommandAck, StateFrame, TerrariumSnapshot};

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

#[derive(Serialize)]
struct StateOutput<'a> {
    source: &'a str,
    epoch: u32,
    terrarium_count: usize,
    terrariums: &'a [TerrariumSnapshot],
}

pub fn print_state(frame: &StateFrame, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StateOutput {
                source,
                epoch: frame.epoch,
                terrarium_count: frame.terrariums.len(),
                terrariums: &frame.terrariums,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "ID", "SPECIES", "TEMP D/N", "HUM D/N", "LUX D/N", "HYDR", "STRESS", "HEALTH",
                    "ACT",
                ]);
            for t in &frame.terrariums {
                table.add_row(vec![
                    t.id.to_string(),
                    format!("{} ({})", t.common_name, t.scientific_name),
                    format!("{:.1}/{:.1}", t.temp_day_c, t.temp_night_c),
                    format!("{:.0}/{:.0}", t.humidity_day_pct, t.humidity_night_pct),
                    format!("{:.0}/{:.0}", t.lux_day, t.lux_night),
                    format!("{:.1}", t.hydration_pct),
                    format!("{:.1}", t.stress_pct),
                    format!("{:.1}", t.health_pct),
                    format!("{:.2}", t.activity_score),
                ]);
            }
            println!("{source} epoch={}", frame.epoch);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{source} epoch={} terrariums={}", frame.epoch, frame.terrariums.len());
            for t in &frame.terrariums {
                println!(
                    "  [{}] {} temp={:.1}/{:.1} hydration={:.1} stress={:.1} health={:.1} activity={:.2}",
                    t.id,
                    t.common_name,
                    t.temp_day_c,
                    t.temp_night_c,
                    t.hydration_pct,
                    t.stress_pct,
                    t.health_pct,
                    t.activity_score
                );
            }
        }
    }
}

pub fn print_command_ack(ack: &CommandAck, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(ack).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "command 0x{:02X}: {:?} (code {}) terrariums={}",
            ack.opcode,
            ack.status,
            ack.status.code(),
            ack.terrarium_count
        ),
    }
}
