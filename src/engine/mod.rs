//! The external compiler/VM, seen only through its call surface. Every call
//! yields a raw `RawResult` payload; decoding is the caller's job.

pub mod process;
pub mod replay;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::Snapshot;

pub use process::ProcessEngine;
pub use replay::{ReplayEngine, Trace};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("engine initialization failed: {message}")]
    Init { message: String },
    #[error("failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine produced malformed output: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("engine rejected the call: {message}")]
    Rejected { message: String },
    #[error("engine does not support '{op}'")]
    Unsupported { op: &'static str },
}

impl EngineError {
    /// Stable error code, see `diagnostic::registry`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotInitialized | EngineError::Init { .. } => "VMS-E001",
            EngineError::Spawn { .. } => "VMS-E002",
            EngineError::Exit { .. } | EngineError::Rejected { .. } => "VMS-E003",
            EngineError::Io(_) => "VMS-E004",
            EngineError::Malformed(_) => "VMS-E005",
            EngineError::Unsupported { .. } => "VMS-E006",
        }
    }
}

/// Call surface of the compiler + VM. `initialize` must have completed
/// before any other call; callers never have two calls in flight.
#[async_trait]
pub trait Engine: Send {
    async fn initialize(&mut self) -> Result<(), EngineError>;

    /// Compile source text into an initial snapshot.
    async fn compile(&mut self, source: &str) -> Result<Value, EngineError>;

    /// Advance `snapshot` by exactly one instruction.
    async fn step(&mut self, snapshot: &Snapshot) -> Result<Value, EngineError>;

    /// Recompile and execute to completion or to the first fault.
    async fn run(&mut self, source: &str) -> Result<Value, EngineError>;
}

#[async_trait]
impl<E: Engine + ?Sized> Engine for Box<E> {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        (**self).initialize().await
    }

    async fn compile(&mut self, source: &str) -> Result<Value, EngineError> {
        (**self).compile(source).await
    }

    async fn step(&mut self, snapshot: &Snapshot) -> Result<Value, EngineError> {
        (**self).step(snapshot).await
    }

    async fn run(&mut self, source: &str) -> Result<Value, EngineError> {
        (**self).run(source).await
    }
}

/// Parses engine output. List payloads nest two JSON levels per element, far
/// past serde_json's default recursion limit, so the limit is lifted and the
/// parser grows its stack on the heap as it descends.
pub fn parse_payload(text: &str) -> Result<Value, serde_json::Error> {
    use serde::Deserialize;
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}

/// Serializes a request or payload of any depth to JSON text.
pub fn payload_bytes(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    use serde::Serialize;
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::new(&mut out);
    value.serialize(serde_stacker::Serializer::new(&mut ser))?;
    Ok(out)
}

/// Drops a payload without recursing. `Value`'s own drop glue recurses once
/// per nesting level, which a long list overflows.
pub fn release(value: Value) {
    let mut pending = vec![value];
    while let Some(mut node) = pending.pop() {
        match &mut node {
            Value::Array(items) => pending.append(items),
            Value::Object(map) => pending.extend(std::mem::take(map).into_iter().map(|(_, v)| v)),
            _ => {}
        }
    }
}
