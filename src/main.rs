//! # Dryer Link
//!
//! Monitor and command a filament dryer over its JSON serial link.
//!
//! Headless operator front end: streams telemetry into the engine's rolling
//! window, logs it periodically and takes preset/custom commands from stdin.
//!
//! # Usage
//!
//! ```bash
//! dryer-link [config.toml]
//! ```
//!
//! Without a config path the built-in defaults are used (`/dev/ttyUSB0` at
//! 115200 baud). Set `RUST_LOG=dryer_link=debug` to see every frame.

use std::io::BufRead;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use dryer_link::config::{Config, LoggingConfig};
use dryer_link::console::{self, ConsoleCommand, HELP};
use dryer_link::engine::DryerEngine;
use dryer_link::protocol::types::TelemetrySample;

/// Log file name prefix inside `[logging] directory`
const LOG_FILE_PREFIX: &str = "dryer-link.log";

/// Operator lines queued ahead of the main loop
const INPUT_QUEUE_DEPTH: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading config {}", path))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging);
    info!("Dryer Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut input = spawn_input_thread(std::io::BufReader::new(std::io::stdin()))?;

    let engine = DryerEngine::connect(&config)
        .await
        .with_context(|| format!("opening dryer at {}", config.serial.port))?;
    engine.start_ingest();

    let mut report = interval(Duration::from_secs(config.telemetry.report_interval_s));
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Type 'help' for commands, Ctrl+C to exit");

    loop {
        tokio::select! {
            line = input.recv() => match line {
                Some(Ok(line)) => {
                    if !handle_line(&engine, &line).await {
                        break;
                    }
                }
                None => {
                    info!("Input closed, shutting down...");
                    break;
                }
                Some(Err(e)) => {
                    warn!("Failed to read operator input: {}", e);
                    break;
                }
            },

            _ = report.tick() => match engine.latest() {
                Some(sample) => info!("{}", describe(&sample)),
                None => info!("No telemetry yet (link {})", engine.connection_state()),
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    engine.stop().await;
    Ok(())
}

/// Read operator lines on a dedicated thread
///
/// The thread blocks in `read_line` outside the runtime, so shutdown does not
/// wait for the operator to press Enter. It ends once the receiver is gone.
fn spawn_input_thread<R>(
    input: R,
) -> dryer_link::error::Result<mpsc::Receiver<std::io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            for line in input.lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;

    Ok(rx)
}

/// Install the tracing subscriber, plus a daily log file when configured
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Run one operator line; returns `false` when the operator asked to quit
async fn handle_line(engine: &DryerEngine, line: &str) -> bool {
    let command = match console::parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            warn!("{}", e);
            println!("{}", HELP);
            return true;
        }
    };

    match command {
        ConsoleCommand::Preset(preset) => {
            if let Err(e) = engine.send_preset(preset).await {
                warn!("Preset {} not sent: {}", preset, e);
            }
        }
        ConsoleCommand::Custom(fields) => {
            if let Err(e) = engine.send_custom(&fields).await {
                warn!("Custom values not sent: {}", e);
            }
        }
        ConsoleCommand::Status => {
            let counters = engine.ingest_stats();
            info!(
                "Link {} on {}: {} samples buffered, {} lines read, {} discarded, {} faults",
                engine.connection_state(),
                engine.device_path(),
                engine.latest_snapshot().len(),
                counters.lines_read,
                counters.lines_discarded,
                counters.io_faults
            );
            if let Some(sample) = engine.latest() {
                info!("{}", describe(&sample));
            }
        }
        ConsoleCommand::History => {
            for sample in engine.latest_snapshot() {
                match serde_json::to_string(&sample) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to serialize sample: {}", e),
                }
            }
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => return false,
    }

    true
}

/// One-line summary of a sample for the log
fn describe(sample: &TelemetrySample) -> String {
    format!(
        "Status: {} | Preset: {} | Air: {:.1}°C | Bed: {:.1}°C | Humidity: {:.1} g/m³ ({})",
        display_or_dash(&sample.status),
        display_or_dash(&sample.preset),
        sample.air_temp,
        sample.bed_temp,
        sample.humidity,
        sample.received_at.format("%H:%M:%S")
    )
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::{Cursor, Read};
    use std::time::Instant;

    /// Input that never delivers a byte, like an idle terminal
    struct IdleInput;

    impl Read for IdleInput {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_input_thread_forwards_lines_then_closes() {
        let mut input = spawn_input_thread(Cursor::new("status\nquit\n")).unwrap();

        assert_eq!(input.recv().await.unwrap().unwrap(), "status");
        assert_eq!(input.recv().await.unwrap().unwrap(), "quit");
        assert!(input.recv().await.is_none());
    }

    #[test]
    fn test_runtime_shutdown_not_blocked_by_idle_input() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let waited = runtime.block_on(async {
            let mut input =
                spawn_input_thread(std::io::BufReader::new(IdleInput)).unwrap();
            tokio::time::timeout(Duration::from_millis(50), input.recv()).await
        });
        assert!(waited.is_err());

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_describe_formats_one_decimal() {
        let sample = TelemetrySample {
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap(),
            air_temp: 45.24,
            bed_temp: 99.96,
            humidity: 3.0,
            status: "RUNNING".to_string(),
            preset: "PLA".to_string(),
        };

        assert_eq!(
            describe(&sample),
            "Status: RUNNING | Preset: PLA | Air: 45.2°C | Bed: 100.0°C | Humidity: 3.0 g/m³ (12:30:05)"
        );
    }

    #[test]
    fn test_describe_marks_missing_status() {
        let sample = TelemetrySample {
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            air_temp: 20.0,
            bed_temp: 20.0,
            humidity: 8.0,
            status: String::new(),
            preset: String::new(),
        };

        assert!(describe(&sample).starts_with("Status: - | Preset: - |"));
    }
}
