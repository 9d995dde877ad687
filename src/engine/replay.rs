use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::debug;

use super::{Engine, EngineError, parse_payload};
use crate::model::Snapshot;

/// A recorded session: the payload `compile` produced, then one payload per
/// `step`, in order. `run` is optional. Payloads are kept as JSON text and
/// parsed when replayed.
#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub source: Option<String>,
    pub compile: Box<RawValue>,
    #[serde(default)]
    pub steps: Vec<Box<RawValue>>,
    #[serde(default)]
    pub run: Option<Box<RawValue>>,
}

/// Plays a [`Trace`] back. The snapshot passed to `step` is ignored; replies
/// come from the trace in recorded order.
pub struct ReplayEngine {
    trace: Trace,
    cursor: usize,
    ready: bool,
}

impl ReplayEngine {
    pub fn new(trace: Trace) -> Self {
        ReplayEngine { trace, cursor: 0, ready: false }
    }

    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let mut de = serde_json::Deserializer::from_str(text);
        de.disable_recursion_limit();
        let trace = Trace::deserialize(&mut de)?;
        de.end()?;
        Ok(ReplayEngine::new(trace))
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.trace.steps.len().saturating_sub(self.cursor)
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.ready { Ok(()) } else { Err(EngineError::NotInitialized) }
    }

    fn check_source(&self, source: &str) -> Result<(), EngineError> {
        match &self.trace.source {
            Some(recorded) if recorded != source => Err(EngineError::Rejected {
                message: "source differs from the recorded trace".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for ReplayEngine {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        self.ready = true;
        Ok(())
    }

    async fn compile(&mut self, source: &str) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        self.check_source(source)?;
        self.cursor = 0;
        debug!(steps = self.trace.steps.len(), "replaying trace");
        Ok(parse_payload(self.trace.compile.get())?)
    }

    async fn step(&mut self, _snapshot: &Snapshot) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        let Some(payload) = self.trace.steps.get(self.cursor) else {
            return Err(EngineError::Rejected {
                message: format!("trace exhausted after {} steps", self.trace.steps.len()),
            });
        };
        let payload = parse_payload(payload.get())?;
        self.cursor += 1;
        Ok(payload)
    }

    async fn run(&mut self, source: &str) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        self.check_source(source)?;
        match &self.trace.run {
            Some(payload) => Ok(parse_payload(payload.get())?),
            None => Err(EngineError::Unsupported { op: "run" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> ReplayEngine {
        let text = json!({
            "source": "(+ 1 2)",
            "compile": {"Ok": {"callframes": [], "stack": [], "globals": {}}},
            "steps": [{"Err": "first"}, {"Err": "second"}]
        })
        .to_string();
        ReplayEngine::from_json(&text).unwrap()
    }

    #[tokio::test]
    async fn replays_steps_in_order_then_exhausts() {
        let mut e = engine();
        e.initialize().await.unwrap();
        e.compile("(+ 1 2)").await.unwrap();
        let snap = Snapshot::default();
        assert_eq!(e.step(&snap).await.unwrap(), json!({"Err": "first"}));
        assert_eq!(e.remaining(), 1);
        assert_eq!(e.step(&snap).await.unwrap(), json!({"Err": "second"}));
        assert!(matches!(e.step(&snap).await, Err(EngineError::Rejected { .. })));
    }

    #[tokio::test]
    async fn compile_rewinds_the_cursor() {
        let mut e = engine();
        e.initialize().await.unwrap();
        e.compile("(+ 1 2)").await.unwrap();
        e.step(&Snapshot::default()).await.unwrap();
        e.compile("(+ 1 2)").await.unwrap();
        assert_eq!(e.remaining(), 2);
    }

    #[tokio::test]
    async fn other_source_is_rejected() {
        let mut e = engine();
        e.initialize().await.unwrap();
        assert!(matches!(e.compile("(+ 2 2)").await, Err(EngineError::Rejected { .. })));
    }

    #[tokio::test]
    async fn missing_run_is_unsupported() {
        let mut e = engine();
        e.initialize().await.unwrap();
        assert!(matches!(e.run("(+ 1 2)").await, Err(EngineError::Unsupported { op: "run" })));
    }

    #[tokio::test]
    async fn requires_initialize() {
        let mut e = engine();
        assert!(matches!(e.compile("(+ 1 2)").await, Err(EngineError::NotInitialized)));
    }

    #[tokio::test]
    async fn long_recorded_lists_replay() {
        let mut list = String::new();
        for i in 0..20_000 {
            list.push_str(&format!("{{\"Pair\":[{{\"Num\":{i}}},"));
        }
        list.push_str("\"Nil\"");
        list.push_str(&"]}".repeat(20_000));
        let text = format!(
            r#"{{"compile": {{"Ok": {{"callframes": [], "stack": [{list}], "envs": {{}}}}}}, "steps": []}}"#
        );
        let mut e = ReplayEngine::from_json(&text).unwrap();
        e.initialize().await.unwrap();
        let raw = e.compile("").await.unwrap();
        assert_eq!(raw["Ok"]["stack"][0]["Pair"][0]["Num"], 0);
        crate::engine::release(raw);
    }

    #[test]
    fn trace_without_compile_is_malformed() {
        assert!(matches!(ReplayEngine::from_json("{\"steps\": []}"), Err(EngineError::Malformed(_))));
    }
}
