use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{Action, OutputReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub operation: String,
    pub outputs: Vec<OutputReport>,
    pub finished_at: String,
}

impl RunSummary {
    pub fn new(operation: &str, outputs: Vec<OutputReport>) -> Self {
        Self {
            operation: operation.to_string(),
            outputs,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let json = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_summary(summary: &RunSummary, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print_summary(summary),
        OutputMode::Text => {
            let mut stdout = io::stdout();
            if summary.outputs.is_empty() {
                writeln!(stdout, "{}: nothing to do", summary.operation)?;
            }
            for report in &summary.outputs {
                let action = match report.action {
                    Action::Written => "written",
                    Action::Skipped => "skipped (exists)",
                    Action::Empty => "empty source",
                    Action::Failed => "failed",
                };
                writeln!(
                    stdout,
                    "{}: {} {} rows={}",
                    summary.operation, action, report.path, report.rows
                )?;
                if let Some(error) = &report.error {
                    writeln!(stdout, "  {error}")?;
                }
            }
            Ok(())
        }
    }
}
