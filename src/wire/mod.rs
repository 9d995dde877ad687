//! The wire boundary: raw JSON payloads from the engine in, typed snapshots
//! out, and back again for `step`.

pub mod decode;
pub mod encode;
pub mod path;

pub use decode::{Decoder, decode_result, decode_snapshot};
pub use encode::{encode_expr, encode_result, encode_snapshot};
pub use path::{Path, Segment};

/// Known dialects of the engine's snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    /// Environment under `globals`, `Constant` indexes the constant pool.
    Legacy,
    /// Environment under `envs`, `Constant` inlines its value.
    Current,
    /// Either of the above, decided per node. Never coerces between them.
    #[default]
    Lenient,
}

impl Schema {
    pub fn name(self) -> &'static str {
        match self {
            Schema::Legacy => "legacy",
            Schema::Current => "current",
            Schema::Lenient => "lenient",
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "legacy" => Ok(Schema::Legacy),
            "current" => Ok(Schema::Current),
            "lenient" => Ok(Schema::Lenient),
            other => Err(format!("unknown schema '{other}' (expected legacy, current or lenient)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeErrorKind {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },
    #[error("unknown {what} tag '{tag}'")]
    UnknownTag { what: &'static str, tag: String },
    #[error("{what} object has no tag")]
    Untagged { what: &'static str },
    #[error("{what} object has several tags: {}", keys.join(", "))]
    AmbiguousTag { what: &'static str, keys: Vec<String> },
    #[error("fields '{first}' and '{second}' are mutually exclusive")]
    ConflictingFields { first: &'static str, second: &'static str },
    #[error("expected {expected} elements, found {found}")]
    Arity { expected: &'static str, found: usize },
    #[error("not allowed by the {schema} schema: {detail}")]
    Schema { schema: Schema, detail: &'static str },
}

/// A payload that does not match the snapshot model. Carries the location of
/// the offending node so it can be logged and explained.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct DecodeError {
    pub path: Path,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    /// Stable error code, see `diagnostic::registry`.
    pub fn code(&self) -> &'static str {
        match self.kind {
            DecodeErrorKind::TypeMismatch { .. } => "VMS-D001",
            DecodeErrorKind::MissingField { .. } => "VMS-D002",
            DecodeErrorKind::UnknownTag { .. } => "VMS-D003",
            DecodeErrorKind::Untagged { .. } => "VMS-D004",
            DecodeErrorKind::AmbiguousTag { .. } => "VMS-D005",
            DecodeErrorKind::ConflictingFields { .. } => "VMS-D006",
            DecodeErrorKind::Arity { .. } => "VMS-D007",
            DecodeErrorKind::Schema { .. } => "VMS-D008",
        }
    }
}

/// Short description of a JSON node's shape, used for `found` in errors.
pub fn describe(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(items) => format!("array of {} elements", items.len()),
        Value::Object(map) if map.is_empty() => "empty object".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
    }
}
