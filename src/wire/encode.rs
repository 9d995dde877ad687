use serde_json::{Map, Value, json};

use crate::model::*;

/// Serializes a result back into the `RawResult` wire shape.
pub fn encode_result(result: &ExecutionResult) -> Value {
    match result {
        Ok(snapshot) => json!({ "Ok": encode_snapshot(snapshot) }),
        Err(message) => json!({ "Err": message }),
    }
}

/// Serializes a snapshot in the dialect it was decoded from: the environment
/// goes back under the same key, constants keep their indexed or inline form.
pub fn encode_snapshot(snapshot: &Snapshot) -> Value {
    let mut out = Map::new();
    out.insert("callframes".into(), Value::Array(snapshot.callframes.iter().map(encode_frame).collect()));
    out.insert("stack".into(), Value::Array(snapshot.stack.iter().map(encode_expr).collect()));

    let mut bindings = Map::new();
    for (name, binding) in &snapshot.environment.bindings {
        let value = match binding {
            Binding::Value(expr) => encode_expr(expr),
            Binding::Scope(scope) => {
                let map: Map<String, Value> =
                    scope.map.iter().map(|(k, v)| (k.clone(), encode_expr(v))).collect();
                json!({ "map": map, "parent": scope.parent })
            }
        };
        bindings.insert(name.clone(), value);
    }
    out.insert(snapshot.environment.field.key().into(), Value::Object(bindings));

    if let Some(log) = &snapshot.log {
        out.insert("log".into(), json!(log));
    }
    Value::Object(out)
}

fn encode_frame(frame: &CallFrame) -> Value {
    let mut out = Map::new();
    out.insert("ip".into(), json!(frame.ip));
    out.insert("chunk".into(), encode_chunk(&frame.chunk));
    if let Some(env) = &frame.env {
        out.insert("env".into(), json!(env));
    }
    Value::Object(out)
}

fn encode_chunk(chunk: &Chunk) -> Value {
    let mut out = Map::new();
    out.insert("code".into(), Value::Array(chunk.code.iter().map(encode_instruction).collect()));
    if let Some(constants) = &chunk.constants {
        out.insert("constants".into(), Value::Array(constants.iter().map(encode_expr).collect()));
    }
    Value::Object(out)
}

pub fn encode_instruction(instruction: &Instruction) -> Value {
    let payload = match instruction {
        Instruction::Bare(op) => return json!(op.name()),
        Instruction::Constant(Operand::Index(i)) => json!(i),
        Instruction::Constant(Operand::Inline(expr)) => encode_expr(expr),
        Instruction::Lookup(name) | Instruction::Define(name) | Instruction::BuiltIn(name) => json!(name),
        Instruction::Call(n) | Instruction::CondJump(n) | Instruction::CondJumpPop(n) => json!(n),
        Instruction::If(offset) => json!(offset),
    };
    tagged(instruction.tag(), payload)
}

/// Pair spines are folded from the tail, so only car nesting recurses.
pub fn encode_expr(expr: &Expr) -> Value {
    if let Expr::Pair(..) = expr {
        let (items, tail) = expr.spine();
        let mut acc = encode_expr(tail);
        for item in items.into_iter().rev() {
            acc = tagged("Pair", Value::Array(vec![encode_expr(item), acc]));
        }
        return acc;
    }
    match expr {
        Expr::Num(n) => tagged("Num", json!(n)),
        Expr::Boolean(b) => tagged("Boolean", json!(b)),
        Expr::Keyword(name) => tagged("Keyword", json!(name)),
        Expr::Str(text) => tagged("String", json!(text)),
        Expr::Symbol(name) => json!(name),
        Expr::Nil => json!(NIL_TAG),
        Expr::Quote(inner) => tagged("Quote", encode_expr(inner)),
        Expr::BuiltIn(code) => tagged("BuiltIn", Value::Array(code.iter().map(encode_instruction).collect())),
        Expr::Lambda(lambda) => {
            let chunk = encode_chunk(&lambda.chunk);
            let tuple = if lambda.env.is_some() || lambda.variadic.is_some() {
                json!([chunk, lambda.params, lambda.variadic, lambda.env.clone().unwrap_or_default()])
            } else {
                json!([chunk, lambda.params, lambda.label])
            };
            tagged("Lambda", tuple)
        }
        Expr::LambdaDefinition(def) => {
            let chunk = encode_chunk(&def.chunk);
            let tuple = match &def.variadic {
                Some(rest) => json!([chunk, rest, def.params]),
                None => json!([chunk, def.params]),
            };
            tagged("LambdaDefinition", tuple)
        }
        Expr::Pair(..) => unreachable!("pairs are encoded above"),
    }
}

fn tagged(tag: &str, payload: Value) -> Value {
    let mut map = Map::new();
    map.insert(tag.to_string(), payload);
    Value::Object(map)
}
