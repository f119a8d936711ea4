use std::path::Path;

use anyhow::{Context as _, Result};
use kairos::{run_scenario, ScenarioConfig};
use tracing_subscriber::EnvFilter;

/// Path of an optional JSON scenario file.
const CONFIG_ENV: &str = "KAIROS_SCENARIO";
/// When set, the report is also printed as JSON.
const JSON_ENV: &str = "KAIROS_JSON";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(Path::new(&path))?,
        None => ScenarioConfig::default(),
    };

    println!("═══════════════════════════════════════════════════════");
    println!("  Kairos — access point scenario");
    println!(
        "  {} stations at {} m, {} B payload, {:.1} Mbit/s offered each",
        config.stations,
        config.distance_m,
        config.payload_size,
        config.data_rate_bps as f64 / 1e6
    );
    println!("═══════════════════════════════════════════════════════");
    println!();

    let report = run_scenario(&config).context("scenario run failed")?;

    for sample in &report.samples {
        println!("{:.1}s: \t{:.3} Mbit/s", sample.at.as_secs_f64(), sample.mbps);
    }
    println!();
    for (i, bytes) in report.station_bytes.iter().enumerate() {
        println!("  Station {}: {} bytes received", i + 1, bytes);
    }
    println!("  Dropped packets: {}", report.dropped_packets);
    println!("  Events processed: {} (trace {:016x})", report.events_processed, report.trace_hash);
    println!();
    println!("Average throughput: {:.3} Mbit/s", report.average_mbps);
    println!("Aggregate throughput: {:.3} Mbit/s", report.aggregate_mbps);

    if std::env::var_os(JSON_ENV).is_some() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<ScenarioConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file {}", path.display()))?;
    let config = ScenarioConfig::from_json(&text)
        .with_context(|| format!("parsing scenario file {}", path.display()))?;
    Ok(config)
}
