pub mod ansi;
pub mod json;
pub mod registry;


use crate::controller::ControllerError;
use crate::engine::EngineError;
use crate::wire::{DecodeError, DecodeErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Points at a node of a payload by its JSON path.
#[derive(Debug, Clone)]
pub struct Label {
    pub path: String,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    /// JSON text of the offending node, shown under the primary label.
    pub node: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            node: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.push(Label { path: path.into(), message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_path(mut self, path: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.push(Label { path: path.into(), message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_node(mut self, json: impl Into<String>) -> Self {
        self.node = Some(json.into());
        self
    }
}

// ---- From impls for error types ----

impl From<&DecodeError> for Diagnostic {
    fn from(e: &DecodeError) -> Self {
        let label = match &e.kind {
            DecodeErrorKind::TypeMismatch { expected, .. } => format!("expected {expected}"),
            DecodeErrorKind::MissingField { field } => format!("'{field}' is missing here"),
            DecodeErrorKind::UnknownTag { tag, .. } => format!("'{tag}' is not recognised"),
            DecodeErrorKind::Untagged { .. } => "no tag".to_string(),
            DecodeErrorKind::AmbiguousTag { .. } => "more than one tag".to_string(),
            DecodeErrorKind::ConflictingFields { .. } => "both fields present".to_string(),
            DecodeErrorKind::Arity { expected, .. } => format!("expected {expected} elements"),
            DecodeErrorKind::Schema { .. } => "not in this dialect".to_string(),
        };
        let mut d = Diagnostic::error(format!("payload does not match the snapshot model: {}", e.kind))
            .with_code(e.code())
            .with_path(e.path.to_string(), label);
        match &e.kind {
            DecodeErrorKind::AmbiguousTag { .. } | DecodeErrorKind::Untagged { .. } => {
                d = d.with_note("tagged nodes carry exactly one key naming the variant");
            }
            DecodeErrorKind::Schema { .. } => {
                d = d.with_suggestion("decode with `--schema lenient` to accept either dialect");
            }
            DecodeErrorKind::ConflictingFields { first, second } => {
                d = d.with_secondary_path(e.path.child_key(*second).to_string(), format!("conflicts with '{first}'"));
            }
            _ => {}
        }
        d
    }
}

impl From<&EngineError> for Diagnostic {
    fn from(e: &EngineError) -> Self {
        let mut d = Diagnostic::error(e.to_string()).with_code(e.code());
        match e {
            EngineError::Spawn { .. } => d = d.with_suggestion("check the engine command or set VMSCOPE_ENGINE"),
            EngineError::Malformed(_) => d = d.with_note("the engine must print exactly one JSON result"),
            _ => {}
        }
        d
    }
}

impl From<&ControllerError> for Diagnostic {
    fn from(e: &ControllerError) -> Self {
        match e {
            ControllerError::Engine(inner) => Diagnostic::from(inner),
            ControllerError::Init(inner) => Diagnostic::error(e.to_string())
                .with_code(e.code())
                .with_note(format!("caused by {}", inner.code())),
            ControllerError::NoSource => {
                Diagnostic::error(e.to_string()).with_code(e.code()).with_suggestion("load or type some source first")
            }
            ControllerError::StepUnavailable { .. } => {
                Diagnostic::error(e.to_string()).with_code(e.code()).with_suggestion("use `run` to start over")
            }
        }
    }
}
