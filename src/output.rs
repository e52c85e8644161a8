use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::classifier::TrainReport;
use crate::pipeline::{ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_training(report: &TrainReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogOutput;

impl ProgressSink for LogOutput {
    fn event(&self, event: ProgressEvent) {
        let stage = event
            .stage
            .map(|stage| format!("[{stage}] "))
            .unwrap_or_default();
        match event.elapsed {
            Some(elapsed) => info!("{stage}{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => info!("{stage}{}", event.message),
        }
    }
}
