//! Versioned action script schema
//!
//! A script is a version tag plus an ordered list of actions. The action set is
//! closed per version: a payload is checked against the vocabulary of the
//! version it declares, and a new action kind only ever arrives with a new
//! version.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The only script version currently accepted.
pub const SUPPORTED_VERSION: &str = "1.0.0";

/// Largest `sleep` duration; above this JS numbers lose integer precision.
pub const MAX_SLEEP_MS: u64 = 9_007_199_254_740_991;

/// Known script versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptVersion {
    V1_0_0,
}

impl ScriptVersion {
    pub const ALL: &'static [ScriptVersion] = &[ScriptVersion::V1_0_0];

    /// Look up a version by its literal tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.as_str() == tag)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptVersion::V1_0_0 => SUPPORTED_VERSION,
        }
    }

    /// Action kinds a script of this version may contain.
    pub fn vocabulary(&self) -> &'static [ActionKind] {
        match self {
            ScriptVersion::V1_0_0 => &[ActionKind::Goto, ActionKind::Click, ActionKind::Sleep],
        }
    }
}

impl fmt::Display for ScriptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Goto,
    Click,
    Sleep,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Goto => "goto",
            ActionKind::Click => "click",
            ActionKind::Sleep => "sleep",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "goto" => Some(ActionKind::Goto),
            "click" => Some(ActionKind::Click),
            "sleep" => Some(ActionKind::Sleep),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single browser action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Navigate the page to an absolute URL
    Goto { url: String },

    /// Click the first element matching a selector
    Click { selector: String },

    /// Pause for a fixed duration
    Sleep { milliseconds: u64 },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Goto { .. } => ActionKind::Goto,
            Action::Click { .. } => ActionKind::Click,
            Action::Sleep { .. } => ActionKind::Sleep,
        }
    }

    /// Human-readable summary shown next to the step in a trace.
    pub fn details(&self) -> String {
        match self {
            Action::Goto { url } => url.clone(),
            Action::Click { selector } => selector.clone(),
            Action::Sleep { milliseconds } => format!("{}ms", milliseconds),
        }
    }
}

/// A versioned, ordered list of actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionScript {
    pub version: String,
    pub actions: Vec<Action>,
}

impl ActionScript {
    /// Build a script at the supported version.
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            version: SUPPORTED_VERSION.to_string(),
            actions,
        }
    }

    /// Validate an untyped payload and convert it into a script.
    pub fn from_value(value: &Value) -> Result<Self, SchemaValidationError> {
        let obj = value.as_object().ok_or_else(|| {
            SchemaValidationError::new(SchemaErrorKind::NotAnObject, "$", "script must be a JSON object")
        })?;

        let version = match obj.get("version") {
            None => {
                return Err(SchemaValidationError::new(
                    SchemaErrorKind::MissingField,
                    "version",
                    "required field is missing",
                ))
            }
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(SchemaValidationError::invalid_type("version", "string", other));
            }
        };

        let version = ScriptVersion::parse(version).ok_or_else(|| {
            SchemaValidationError::new(
                SchemaErrorKind::UnsupportedVersion,
                "version",
                format!("expected \"{}\", got \"{}\"", SUPPORTED_VERSION, version),
            )
        })?;

        let raw_actions = match obj.get("actions") {
            None => {
                return Err(SchemaValidationError::new(
                    SchemaErrorKind::MissingField,
                    "actions",
                    "required field is missing",
                ))
            }
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(SchemaValidationError::invalid_type("actions", "array", other));
            }
        };

        let actions = raw_actions
            .iter()
            .enumerate()
            .map(|(i, item)| parse_action(version, i, item))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: version.as_str().to_string(),
            actions,
        })
    }

    /// Validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SchemaValidationError> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            SchemaValidationError::new(SchemaErrorKind::NotAnObject, "$", format!("invalid JSON: {}", e))
        })?;
        Self::from_value(&value)
    }

    /// JSON form of the script, the inverse of [`ActionScript::from_value`].
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The declared version, if it is one this build understands.
    pub fn script_version(&self) -> Option<ScriptVersion> {
        ScriptVersion::parse(&self.version)
    }
}

fn parse_action(version: ScriptVersion, index: usize, item: &Value) -> Result<Action, SchemaValidationError> {
    let path = format!("actions[{}]", index);
    let obj = match item {
        Value::Object(obj) => obj,
        other => return Err(SchemaValidationError::invalid_type(&path, "object", other)),
    };

    let tag = match obj.get("type") {
        None => {
            return Err(SchemaValidationError::new(
                SchemaErrorKind::MissingField,
                format!("{}.type", path),
                "required field is missing",
            ))
        }
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            return Err(SchemaValidationError::invalid_type(&format!("{}.type", path), "string", other));
        }
    };

    let kind = ActionKind::from_tag(tag)
        .filter(|k| version.vocabulary().contains(k))
        .ok_or_else(|| {
            SchemaValidationError::new(
                SchemaErrorKind::UnknownAction,
                format!("{}.type", path),
                format!("unknown action \"{}\" for script version {}", tag, version),
            )
        })?;

    match kind {
        ActionKind::Goto => Ok(Action::Goto {
            url: string_field(obj, &path, "url")?,
        }),
        ActionKind::Click => Ok(Action::Click {
            selector: string_field(obj, &path, "selector")?,
        }),
        ActionKind::Sleep => {
            let field = format!("{}.milliseconds", path);
            match obj.get("milliseconds") {
                None => Err(SchemaValidationError::new(
                    SchemaErrorKind::MissingField,
                    field,
                    "required field is missing",
                )),
                Some(v) => v
                    .as_u64()
                    .filter(|ms| *ms <= MAX_SLEEP_MS)
                    .map(|milliseconds| Action::Sleep { milliseconds })
                    .ok_or_else(|| {
                        SchemaValidationError::invalid_type(&field, "integer between 0 and 2^53 - 1", v)
                    }),
            }
        }
    }
}

fn string_field(obj: &Map<String, Value>, path: &str, name: &str) -> Result<String, SchemaValidationError> {
    let field = format!("{}.{}", path, name);
    match obj.get(name) {
        None => Err(SchemaValidationError::new(
            SchemaErrorKind::MissingField,
            field,
            "required field is missing",
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(SchemaValidationError::invalid_type(&field, "string", other)),
    }
}

/// Why a payload was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    NotAnObject,
    MissingField,
    InvalidType,
    UnknownAction,
    UnsupportedVersion,
}

/// A payload that does not describe a valid script
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaValidationError {
    pub kind: SchemaErrorKind,
    /// Location of the offending value, e.g. `actions[1].selector`
    pub path: String,
    pub message: String,
}

impl SchemaValidationError {
    pub fn new(kind: SchemaErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    fn invalid_type(path: &str, expected: &str, found: &Value) -> Self {
        Self::new(
            SchemaErrorKind::InvalidType,
            path,
            format!("expected {}, found {}", expected, json_type_name(found)),
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
