//! Commands that talk to the service: generate and run

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::Duration;

use momos_common::{ExecutionResult, GenerateRequest};

use crate::client::ServiceClient;
use crate::commands::script::{load_script, print_actions};
use crate::commands::trace::{export_screenshots, print_trace};
use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Site under test
    #[arg(long)]
    pub url: String,

    /// What the check should do
    #[arg(long)]
    pub prompt: String,

    /// Existing script to revise
    #[arg(long)]
    pub previous: Option<PathBuf>,

    /// Write the generated script to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn generate(args: GenerateArgs, client: &ServiceClient, format: OutputFormat) -> Result<()> {
    let previous_script = match &args.previous {
        Some(path) => Some(load_script(path)?),
        None => None,
    };
    let request = GenerateRequest {
        url: args.url,
        prompt: args.prompt,
        previous_script,
    };

    let pb = spinner("Generating script...");
    let response = client.generate(&request).await;
    pb.finish_and_clear();
    let response = response?;

    if let Some(path) = &args.output {
        let text = serde_json::to_string_pretty(&response.script.to_value())?;
        std::fs::write(path, text + "\n")?;
    }

    match format {
        OutputFormat::Json => print_json(&response),
        _ => {
            println!("{}", response.message);
            println!();
            print_actions(&response.script, format);
            if let Some(path) = &args.output {
                print_success(&format!("Script written to {}", path.display()));
            }
        }
    }
    Ok(())
}

#[derive(Args)]
pub struct RunArgs {
    /// Script file (`-` for stdin)
    pub file: PathBuf,

    /// Save step screenshots into this directory
    #[arg(long)]
    pub screenshots: Option<PathBuf>,
}

/// Whether a run counts as passed.
pub fn run_passed(result: &ExecutionResult) -> bool {
    result.trace.as_ref().map(|t| t.success).unwrap_or(false)
}

pub async fn run(args: RunArgs, client: &ServiceClient, format: OutputFormat) -> Result<()> {
    let script = load_script(&args.file)?;

    let pb = spinner(&format!("Running {} actions...", script.actions.len()));
    let result = client.run(&script).await;
    pb.finish_and_clear();
    let result = result?;

    if let (Some(dir), Some(trace)) = (&args.screenshots, &result.trace) {
        let written = export_screenshots(trace, dir)?;
        if format != OutputFormat::Json {
            print_info(&format!("{} screenshots saved to {}", written.len(), dir.display()));
        }
    }

    if format == OutputFormat::Json {
        print_json(&result);
    } else {
        print_result(&result, format);
    }

    if !run_passed(&result) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &ExecutionResult, format: OutputFormat) {
    if !result.stdout.is_empty() {
        println!("{}", "stdout".bold());
        println!("{}", result.stdout);
        println!();
    }
    if !result.stderr.trim().is_empty() {
        println!("{}", "stderr".bold());
        println!("{}", result.stderr.trim_end().dimmed());
        println!();
    }

    match &result.trace {
        Some(trace) => print_trace(trace, format),
        None => print_warning(&format!(
            "Program produced no trace (exit code {})",
            result.exit_code
        )),
    }

    if let Some(events) = &result.spotlight {
        let errors = events.iter().filter(|e| e.is_error()).count();
        println!("{} telemetry events, {} errors", events.len(), errors);
    }
}
