//! Offline script commands: validate, compile, demux

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::json;
use std::io::Read;
use std::path::{Path, PathBuf};

use momos_common::{Action, ActionScript};
use momos_runner::{compile, demux, Assembler, AssemblerOptions};

use crate::commands::trace::print_trace;
use crate::output::{print_json, print_list, print_success, truncate, OutputFormat, TableDisplay};

/// Read a file, or stdin when the path is `-`.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Load and validate an action script.
pub fn load_script(path: &Path) -> Result<ActionScript> {
    let text = read_input(path)?;
    let script = ActionScript::from_json(&text)
        .with_context(|| format!("{} is not a valid action script", path.display()))?;
    Ok(script)
}

/// Action display wrapper
#[derive(Serialize)]
pub struct ActionDisplay {
    pub index: usize,
    pub action: String,
    pub details: String,
}

impl ActionDisplay {
    pub fn from_action(index: usize, action: &Action) -> Self {
        Self {
            index,
            action: action.kind().to_string(),
            details: action.details(),
        }
    }
}

impl TableDisplay for ActionDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Action", "Details"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.action.clone(),
            truncate(&self.details, 80),
        ]
    }
}

/// Print the actions of a script.
pub fn print_actions(script: &ActionScript, format: OutputFormat) {
    let rows: Vec<ActionDisplay> = script
        .actions
        .iter()
        .enumerate()
        .map(|(i, a)| ActionDisplay::from_action(i, a))
        .collect();
    print_list(&rows, format);
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Script file (`-` for stdin)
    pub file: PathBuf,
}

pub fn validate(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let script = load_script(&args.file)?;
    match format {
        OutputFormat::Json => print_json(&script.to_value()),
        _ => {
            print_success(&format!(
                "{} is a valid {} script with {} actions",
                args.file.display(),
                script.version,
                script.actions.len()
            ));
            print_actions(&script, format);
        }
    }
    Ok(())
}

#[derive(Args)]
pub struct CompileArgs {
    /// Script file (`-` for stdin)
    pub file: PathBuf,

    /// Print the complete program instead of the step body
    #[arg(long)]
    pub assembled: bool,

    /// CDP endpoint written into the assembled program
    #[arg(long, default_value = "ws://localhost:9222/devtools/browser/<id>")]
    pub target: String,

    /// Leave telemetry capture out of the assembled program
    #[arg(long)]
    pub no_telemetry: bool,

    /// Screenshot JPEG quality
    #[arg(long, default_value_t = 60)]
    pub screenshot_quality: u8,
}

pub fn compile_script(args: CompileArgs, format: OutputFormat) -> Result<()> {
    let script = load_script(&args.file)?;
    let block = compile(&script)?;

    let text = if args.assembled {
        let mut options = AssemblerOptions {
            screenshot_quality: args.screenshot_quality,
            ..Default::default()
        };
        options.telemetry.enabled = !args.no_telemetry;
        Assembler::new(options)
            .assemble(&block, &args.target)
            .into_string()
    } else {
        block.render()
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "version": block.version.as_str(),
            "actions": block.action_count,
            "program": text,
        })),
        _ => print!("{}", text),
    }
    Ok(())
}

#[derive(Args)]
pub struct DemuxArgs {
    /// Captured program stdout (`-` for stdin)
    pub file: PathBuf,
}

pub fn demux_output(args: DemuxArgs, format: OutputFormat) -> Result<()> {
    let stdout = read_input(&args.file)?;
    let out = demux(&stdout);

    if format == OutputFormat::Json {
        print_json(&json!({
            "trace": out.trace,
            "spotlight": out.spotlight,
            "stdout": out.clean_stdout,
        }));
        return Ok(());
    }

    if !out.clean_stdout.is_empty() {
        println!("{}", out.clean_stdout);
        println!();
    }
    match &out.trace {
        Some(trace) => print_trace(trace, format),
        None => println!("No trace found."),
    }
    match &out.spotlight {
        Some(events) => println!("{} telemetry events", events.len()),
        None => println!("No telemetry captured."),
    }
    Ok(())
}
