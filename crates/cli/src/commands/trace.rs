//! Trace rendering and screenshot export

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use momos_common::{TraceData, TraceStep};

use crate::output::{print_list, truncate, OutputFormat, TableDisplay};

/// Trace step display wrapper (screenshot omitted)
#[derive(Serialize)]
pub struct StepDisplay {
    pub index: usize,
    pub action: String,
    pub details: String,
    pub url: String,
    pub time: String,
}

impl From<&TraceStep> for StepDisplay {
    fn from(step: &TraceStep) -> Self {
        Self {
            index: step.index,
            action: step.action.clone(),
            details: step.details.clone(),
            url: step.url.clone(),
            time: chrono::DateTime::from_timestamp_millis(step.timestamp)
                .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_default(),
        }
    }
}

impl TableDisplay for StepDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Action", "Details", "URL", "Time"]
    }

    fn row(&self) -> Vec<String> {
        let action = if self.action == momos_common::ERROR_STEP_ACTION {
            self.action.red().to_string()
        } else {
            self.action.clone()
        };
        vec![
            self.index.to_string(),
            action,
            truncate(&self.details, 60),
            truncate(&self.url, 50),
            self.time.clone(),
        ]
    }
}

/// Print the outcome line and the step table.
pub fn print_trace(trace: &TraceData, format: OutputFormat) {
    if trace.success {
        println!(
            "{} {} steps in {}ms",
            "✓ Passed".green().bold(),
            trace.steps.len(),
            trace.duration
        );
    } else {
        println!(
            "{} after {}ms: {}",
            "✗ Failed".red().bold(),
            trace.duration,
            trace.error.as_deref().unwrap_or("unknown error")
        );
    }

    let steps: Vec<StepDisplay> = trace.steps.iter().map(StepDisplay::from).collect();
    print_list(&steps, format);
}

/// File name for a step screenshot: `<index>-<action>.jpg`
pub fn screenshot_file_name(step: &TraceStep) -> String {
    let action: String = step
        .action
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}-{}.jpg", step.index, action)
}

/// Decode every step screenshot into `dir`. Steps without a screenshot are
/// skipped.
pub fn export_screenshots(trace: &TraceData, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = Vec::new();
    for step in trace.steps.iter().filter(|s| !s.screenshot.is_empty()) {
        let bytes = STANDARD
            .decode(step.screenshot.as_bytes())
            .with_context(|| format!("step {} screenshot is not valid base64", step.index))?;
        let path = dir.join(screenshot_file_name(step));
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn step(index: usize, action: &str, screenshot: &str) -> TraceStep {
        TraceStep {
            index,
            action: action.into(),
            details: String::new(),
            timestamp: 1_700_000_000_000,
            screenshot: screenshot.into(),
            url: "https://example.com/".into(),
        }
    }

    #[test]
    fn test_export_screenshots() {
        let dir = TempDir::new().unwrap();
        let trace = TraceData {
            start_time: 0,
            end_time: 10,
            duration: 10,
            success: false,
            error: Some("boom".into()),
            steps: vec![
                step(0, "goto", &STANDARD.encode([0xFF, 0xD8, 0xFF])),
                step(1, "click", ""),
                step(2, "error", &STANDARD.encode(b"jpeg")),
            ],
        };

        let out = dir.path().join("shots");
        let written = export_screenshots(&trace, &out).unwrap();
        assert_eq!(written, vec![out.join("0-goto.jpg"), out.join("2-error.jpg")]);
        assert_eq!(std::fs::read(out.join("0-goto.jpg")).unwrap(), vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(std::fs::read(out.join("2-error.jpg")).unwrap(), b"jpeg");
    }

    #[test]
    fn test_invalid_base64() {
        let dir = TempDir::new().unwrap();
        let trace = TraceData {
            start_time: 0,
            end_time: 0,
            duration: 0,
            success: true,
            error: None,
            steps: vec![step(0, "goto", "***")],
        };
        assert!(export_screenshots(&trace, dir.path()).is_err());
    }

    #[test]
    fn test_step_display_time() {
        let display = StepDisplay::from(&step(0, "goto", ""));
        assert_eq!(display.time, "22:13:20.000");
    }
}
