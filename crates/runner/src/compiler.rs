//! Action script compiler
//!
//! Lowers a script into a flat list of [`Statement`]s. Every action is
//! followed by exactly one `CaptureStep` carrying its index, and every `goto`
//! additionally re-injects telemetry because page instrumentation does not
//! survive a full navigation. Rendering to JavaScript is left to
//! [`crate::js`].

use momos_common::{Action, ActionKind, ActionScript, Error, Result, ScriptVersion};

use crate::js::JsWriter;

/// One generated statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Navigate { url: String },
    Click { selector: String },
    Sleep { milliseconds: u64 },
    /// Re-establish telemetry capture on the current page
    InjectTelemetry,
    /// Record a screenshot step in the trace
    CaptureStep {
        index: usize,
        action: ActionKind,
        details: String,
    },
}

/// Compiler output: the program body for one script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBlock {
    pub version: ScriptVersion,
    pub action_count: usize,
    pub statements: Vec<Statement>,
}

impl CompiledBlock {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render the body at the given indentation level.
    pub fn render_indented(&self, indent: usize) -> String {
        let mut writer = JsWriter::with_indent(indent);
        for stmt in &self.statements {
            writer.statement(stmt);
        }
        writer.finish()
    }

    pub fn render(&self) -> String {
        self.render_indented(0)
    }

    /// Indices carried by the capture statements, in emission order.
    pub fn capture_indices(&self) -> Vec<usize> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Statement::CaptureStep { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

type Lowering = fn(usize, &Action, &mut Vec<Statement>);

/// Lowering function per script version. A version missing here cannot be
/// compiled even if the schema knows about it.
const LOWERINGS: &[(ScriptVersion, Lowering)] = &[(ScriptVersion::V1_0_0, lower_v1)];

fn lowering_for(version: ScriptVersion) -> Option<Lowering> {
    LOWERINGS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, lower)| *lower)
}

/// Compile a script into its statement block.
pub fn compile(script: &ActionScript) -> Result<CompiledBlock> {
    let version = script
        .script_version()
        .ok_or_else(|| Error::UnsupportedVersion(script.version.clone()))?;
    let lower = lowering_for(version).ok_or_else(|| Error::UnsupportedVersion(script.version.clone()))?;

    let mut statements = Vec::with_capacity(script.actions.len() * 3);
    for (index, action) in script.actions.iter().enumerate() {
        lower(index, action, &mut statements);
    }

    Ok(CompiledBlock {
        version,
        action_count: script.actions.len(),
        statements,
    })
}

fn lower_v1(index: usize, action: &Action, out: &mut Vec<Statement>) {
    match action {
        Action::Goto { url } => {
            out.push(Statement::Navigate { url: url.clone() });
            out.push(Statement::InjectTelemetry);
        }
        Action::Click { selector } => {
            out.push(Statement::Click {
                selector: selector.clone(),
            });
        }
        Action::Sleep { milliseconds } => {
            out.push(Statement::Sleep {
                milliseconds: *milliseconds,
            });
        }
    }
    out.push(Statement::CaptureStep {
        index,
        action: action.kind(),
        details: action.details(),
    });
}
