//! In-process engine for controller tests. Understands one program,
//! `(+ 1 2)`, and interprets the handful of instructions it compiles to.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::wire::encode_result;

pub(crate) const ADD_ONE_TWO: &str = "(+ 1 2)";

#[derive(Default)]
pub(crate) struct FakeEngine {
    pub init_fails: bool,
    pub init_calls: usize,
    /// Returned from every `step` instead of interpreting.
    pub step_reply: Option<Value>,
    pub step_fails: bool,
    /// When set, `step` parks until notified.
    pub gate: Option<Arc<Notify>>,
}

pub(crate) fn compiled() -> Snapshot {
    let code = vec![
        Instruction::Lookup("+".into()),
        Instruction::Constant(Operand::Index(0)),
        Instruction::Constant(Operand::Index(1)),
        Instruction::Call(2),
    ];
    let chunk = Chunk::with_constants(code, vec![Expr::num(1.0), Expr::num(2.0)]);
    let mut bindings = BTreeMap::new();
    bindings.insert("+".to_string(), Binding::Value(Expr::BuiltIn(vec![Instruction::Bare(Opcode::Add)])));
    Snapshot {
        callframes: vec![CallFrame::new(0, chunk)],
        environment: Environment { field: EnvironmentField::Globals, bindings },
        ..Snapshot::default()
    }
}

pub(crate) fn advance(snapshot: &Snapshot) -> ExecutionResult {
    let mut next = snapshot.clone();
    let Some(frame) = next.callframes.last_mut() else {
        return Err("no frame to step".into());
    };
    let Some(instruction) = frame.chunk.code.get(frame.ip).cloned() else {
        return Err("instruction pointer out of range".into());
    };
    let constant = match &instruction {
        Instruction::Constant(Operand::Index(i)) => frame.chunk.constant(*i).cloned(),
        _ => None,
    };
    frame.ip += 1;
    let finished = frame.ip >= frame.chunk.code.len();

    match instruction {
        Instruction::Lookup(name) => {
            let value = next.environment.resolve(None, &name).cloned();
            next.stack.push(value.ok_or_else(|| format!("unbound symbol {name}"))?);
        }
        Instruction::Constant(Operand::Index(_)) => {
            next.stack.push(constant.ok_or("constant out of range")?);
        }
        Instruction::Constant(Operand::Inline(expr)) => next.stack.push(expr),
        Instruction::Call(argc) => {
            if next.stack.len() < argc + 1 {
                return Err("stack underflow".into());
            }
            let args = next.stack.split_off(next.stack.len() - argc);
            next.stack.pop();
            let mut sum = 0.0;
            for arg in &args {
                match arg {
                    Expr::Num(n) => sum += n,
                    _ => return Err("expected a number".into()),
                }
            }
            next.stack.push(Expr::num(sum));
        }
        other => return Err(format!("unsupported instruction {}", other.tag())),
    }
    if finished {
        next.callframes.pop();
    }
    Ok(next)
}

#[async_trait]
impl Engine for FakeEngine {
    async fn initialize(&mut self) -> Result<(), EngineError> {
        self.init_calls += 1;
        if self.init_fails {
            return Err(EngineError::Init { message: "wasm module failed to load".into() });
        }
        Ok(())
    }

    async fn compile(&mut self, source: &str) -> Result<Value, EngineError> {
        match source {
            ADD_ONE_TWO => Ok(encode_result(&Ok(compiled()))),
            "garbage" => Ok(json!({"Ok": {"callframes": 1}})),
            "panic" => Err(EngineError::Rejected { message: "engine panicked".into() }),
            _ => Ok(json!({"Err": "parse error"})),
        }
    }

    async fn step(&mut self, snapshot: &Snapshot) -> Result<Value, EngineError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.step_fails {
            return Err(EngineError::Rejected { message: "engine panicked".into() });
        }
        if let Some(reply) = &self.step_reply {
            return Ok(reply.clone());
        }
        Ok(encode_result(&advance(snapshot)))
    }

    async fn run(&mut self, source: &str) -> Result<Value, EngineError> {
        if source != ADD_ONE_TWO {
            return Ok(json!({"Err": "parse error"}));
        }
        let mut snapshot = compiled();
        while !snapshot.is_terminal() {
            snapshot = match advance(&snapshot) {
                Ok(next) => next,
                Err(message) => return Ok(json!({ "Err": message })),
            };
        }
        Ok(encode_result(&Ok(snapshot)))
    }
}
