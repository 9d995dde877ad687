use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Engine, EngineError, parse_payload, payload_bytes, release};
use crate::model::Snapshot;
use crate::wire::encode_snapshot;

/// Runs the engine as an external command, one process per call.
///
/// The request is a single JSON object on stdin:
/// `{"op":"init"}`, `{"op":"compile","source":..}`, `{"op":"step","vm":..}`
/// or `{"op":"run","source":..}`. The reply is one `RawResult` on stdout.
/// A non-zero exit is an invocation failure, not an engine `Err`.
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
    ready: bool,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        ProcessEngine { program: program.into(), args, ready: false }
    }

    /// Splits a whitespace-separated command line such as `rispy-engine --json`.
    pub fn from_command_line(line: &str) -> Result<Self, EngineError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| EngineError::Init { message: "empty engine command".to_string() })?;
        Ok(ProcessEngine::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn call(&self, op: &'static str, request: Value) -> Result<Value, EngineError> {
        debug!(program = %self.program, op, "engine call");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a superseded call drops this future; take the process with it
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn { program: self.program.clone(), source })?;

        let body = payload_bytes(&request)?;
        release(request);
        let mut stdin = child.stdin.take();
        let write = async move {
            if let Some(pipe) = stdin.as_mut() {
                pipe.write_all(&body).await?;
                pipe.shutdown().await?;
            }
            drop(stdin);
            Ok::<(), std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            return Err(EngineError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let Err(e) = written {
            // engines that answer without reading the request close the pipe early
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }
        let text = std::str::from_utf8(&output.stdout)
            .map_err(|e| EngineError::Rejected { message: format!("output is not UTF-8: {e}") })?;
        Ok(parse_payload(text)?)
    }

    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.ready { Ok(()) } else { Err(EngineError::NotInitialized) }
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        if self.ready {
            return Ok(());
        }
        // the init reply carries no snapshot; only the exit status matters
        let probe = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = probe.map_err(|e| EngineError::Init { message: format!("{}: {e}", self.program) })?;
        if let Some(mut pipe) = child.stdin.take() {
            let body = serde_json::to_vec(&json!({ "op": "init" }))?;
            // ignore write errors; an engine may exit before reading
            let _ = pipe.write_all(&body).await;
            let _ = pipe.shutdown().await;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Init { message: e.to_string() })?;
        if !output.status.success() {
            return Err(EngineError::Init {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        self.ready = true;
        Ok(())
    }

    async fn compile(&mut self, source: &str) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        self.call("compile", json!({ "op": "compile", "source": source })).await
    }

    async fn step(&mut self, snapshot: &Snapshot) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        self.call("step", json!({ "op": "step", "vm": encode_snapshot(snapshot) })).await
    }

    async fn run(&mut self, source: &str) -> Result<Value, EngineError> {
        self.ensure_ready()?;
        self.call("run", json!({ "op": "run", "source": source })).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::{CallFrame, Chunk, Expr, Instruction, Opcode};

    fn shell(script: &str) -> ProcessEngine {
        ProcessEngine::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let e = ProcessEngine::from_command_line("  rispy-engine --json ").unwrap();
        assert_eq!(e.program(), "rispy-engine");
        assert_eq!(e.args, vec!["--json"]);
        assert!(ProcessEngine::from_command_line("   ").is_err());
    }

    #[tokio::test]
    async fn calls_before_initialize_are_refused() {
        let mut e = shell("cat");
        assert!(matches!(e.compile("(+ 1 2)").await, Err(EngineError::NotInitialized)));
    }

    #[tokio::test]
    async fn step_sends_the_encoded_snapshot() {
        // `cat` echoes the request back, which is valid JSON
        let mut e = ProcessEngine::new("cat", vec![]);
        e.initialize().await.unwrap();
        let snap = Snapshot {
            callframes: vec![CallFrame::new(0, Chunk::new(vec![Instruction::Bare(Opcode::Return)]))],
            stack: vec![Expr::num(3.0)],
            ..Snapshot::default()
        };
        let echoed = e.step(&snap).await.unwrap();
        assert_eq!(echoed["op"], "step");
        assert_eq!(echoed["vm"]["stack"][0]["Num"], 3.0);
        assert_eq!(echoed["vm"]["callframes"][0]["chunk"]["code"][0], "Return");
    }

    #[tokio::test]
    async fn long_lists_cross_the_pipe_both_ways() {
        let mut e = ProcessEngine::new("cat", vec![]);
        e.initialize().await.unwrap();
        let snap = Snapshot { stack: vec![Expr::list((0..20_000).map(|i| Expr::num(i as f64)))], ..Snapshot::default() };
        let echoed = e.step(&snap).await.unwrap();
        assert_eq!(echoed["vm"]["stack"][0]["Pair"][0]["Num"], 0.0);
        super::release(echoed);
    }

    #[tokio::test]
    async fn reply_is_returned_raw() {
        let mut e = shell("cat > /dev/null; printf '%s' '{\"Err\":\"parse error\"}'");
        e.initialize().await.unwrap();
        let raw = e.compile("(").await.unwrap();
        assert_eq!(raw, json!({"Err": "parse error"}));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_invocation_failure() {
        let mut e = shell("cat > /dev/null; echo panicked >&2; exit 3");
        e.ready = true;
        let err = e.run("(+ 1 2)").await.unwrap_err();
        assert!(matches!(&err, EngineError::Exit { stderr, .. } if stderr == "panicked"), "{err}");
    }

    #[tokio::test]
    async fn garbage_output_is_malformed() {
        let mut e = shell("cat > /dev/null; echo not json");
        e.ready = true;
        assert!(matches!(e.compile("x").await, Err(EngineError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_program_fails_initialization() {
        let mut e = ProcessEngine::new("/nonexistent/vmscope-engine", vec![]);
        assert!(matches!(e.initialize().await, Err(EngineError::Init { .. })));
    }

    #[tokio::test]
    async fn failing_probe_fails_initialization() {
        let mut e = shell("exit 1");
        assert!(matches!(e.initialize().await, Err(EngineError::Init { .. })));
    }
}
