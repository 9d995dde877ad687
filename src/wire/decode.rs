use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{DecodeError, DecodeErrorKind, Path, Schema, Segment, describe};
use crate::model::*;

type DecodeResult<T> = Result<T, DecodeError>;

const SNAPSHOT_KEYS: &[&str] = &["callframes", "stack", "globals", "envs", "log"];
const FRAME_KEYS: &[&str] = &["ip", "instruction_pointer", "chunk", "env"];
const CHUNK_KEYS: &[&str] = &["code", "constants"];

/// Decode a `RawResult` (`{"Ok": snapshot}` or `{"Err": message}`) with the
/// lenient schema.
pub fn decode_result(raw: &Value) -> DecodeResult<ExecutionResult> {
    Decoder::new(Schema::default()).result(raw)
}

/// Decode a bare snapshot object with the lenient schema.
pub fn decode_snapshot(raw: &Value) -> DecodeResult<Snapshot> {
    Decoder::new(Schema::default()).snapshot(raw)
}

/// Pending work for the expression decoder. Pair and quote nesting is walked
/// with this explicit stack so list depth never turns into call depth.
enum Task<'v> {
    Visit(&'v Value),
    Enter(Segment),
    Leave,
    BuildPair,
    BuildQuote,
}

/// Validating decoder for one payload. Strict on tagged unions: exactly one
/// recognised key per node, no guessing between variants.
pub struct Decoder {
    schema: Schema,
    path: Path,
    quiet: bool,
}

impl Decoder {
    pub fn new(schema: Schema) -> Self {
        Decoder { schema, path: Path::root(), quiet: false }
    }

    /// Does not log failures. For callers that expect some payloads not to
    /// decode and handle that themselves.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn result(mut self, raw: &Value) -> DecodeResult<ExecutionResult> {
        let out = self.result_node(raw);
        self.log_failure(&out);
        out
    }

    pub fn snapshot(mut self, raw: &Value) -> DecodeResult<Snapshot> {
        let out = self.snapshot_node(raw);
        self.log_failure(&out);
        out
    }

    pub fn expr(mut self, raw: &Value) -> DecodeResult<Expr> {
        let out = self.expr_node(raw);
        self.log_failure(&out);
        out
    }

    // ---- Error helpers ----

    fn log_failure<T>(&self, out: &DecodeResult<T>) {
        if let (false, Err(e)) = (self.quiet, out) {
            warn!(path = %e.path, code = e.code(), error = %e.kind, "payload failed to decode");
        }
    }

    fn fail<T>(&self, kind: DecodeErrorKind) -> DecodeResult<T> {
        Err(DecodeError { path: self.path.clone(), kind })
    }

    fn mismatch<T>(&self, expected: &'static str, found: &Value) -> DecodeResult<T> {
        self.fail(DecodeErrorKind::TypeMismatch { expected, found: describe(found) })
    }

    fn at_key<T>(&mut self, key: &str, f: impl FnOnce(&mut Self) -> DecodeResult<T>) -> DecodeResult<T> {
        self.path.push_key(key);
        let out = f(self);
        self.path.pop();
        out
    }

    fn at_index<T>(&mut self, index: usize, f: impl FnOnce(&mut Self) -> DecodeResult<T>) -> DecodeResult<T> {
        self.path.push_index(index);
        let out = f(self);
        self.path.pop();
        out
    }

    // ---- Primitive shapes ----

    fn object<'v>(&self, value: &'v Value, expected: &'static str) -> DecodeResult<&'v Map<String, Value>> {
        match value {
            Value::Object(map) => Ok(map),
            other => self.mismatch(expected, other),
        }
    }

    fn array<'v>(&self, value: &'v Value, expected: &'static str) -> DecodeResult<&'v Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items),
            other => self.mismatch(expected, other),
        }
    }

    fn string(&self, value: &Value, expected: &'static str) -> DecodeResult<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => self.mismatch(expected, other),
        }
    }

    fn index(&self, value: &Value, expected: &'static str) -> DecodeResult<usize> {
        match value.as_u64().and_then(|n| usize::try_from(n).ok()) {
            Some(n) => Ok(n),
            None => self.mismatch(expected, value),
        }
    }

    fn optional_name(&self, value: &Value) -> DecodeResult<Option<String>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            other => self.mismatch("name or null", other),
        }
    }

    fn names(&mut self, value: &Value) -> DecodeResult<Vec<String>> {
        self.list(value, "array of names", |d, v| d.string(v, "name"))
    }

    fn list<T>(
        &mut self,
        value: &Value,
        expected: &'static str,
        mut item: impl FnMut(&mut Self, &Value) -> DecodeResult<T>,
    ) -> DecodeResult<Vec<T>> {
        let items = self.array(value, expected)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, v) in items.iter().enumerate() {
            out.push(self.at_index(i, |d| item(d, v))?);
        }
        Ok(out)
    }

    fn required<T>(
        &mut self,
        map: &Map<String, Value>,
        key: &'static str,
        f: impl FnOnce(&mut Self, &Value) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        match map.get(key) {
            Some(v) => self.at_key(key, |d| f(d, v)),
            None => self.fail(DecodeErrorKind::MissingField { field: key }),
        }
    }

    fn optional<T>(
        &mut self,
        map: &Map<String, Value>,
        key: &'static str,
        f: impl FnOnce(&mut Self, &Value) -> DecodeResult<T>,
    ) -> DecodeResult<Option<T>> {
        match map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => self.at_key(key, |d| f(d, v)).map(Some),
        }
    }

    /// The sole key of a tagged-union object, checked against `allowed`.
    fn tagged<'v>(
        &self,
        map: &'v Map<String, Value>,
        allowed: &[&str],
        what: &'static str,
    ) -> DecodeResult<(&'v str, &'v Value)> {
        let mut entries = map.iter();
        match (entries.next(), entries.next()) {
            (None, _) => self.fail(DecodeErrorKind::Untagged { what }),
            (Some((key, payload)), None) => {
                if allowed.contains(&key.as_str()) {
                    Ok((key.as_str(), payload))
                } else {
                    self.fail(DecodeErrorKind::UnknownTag { what, tag: key.clone() })
                }
            }
            _ => self.fail(DecodeErrorKind::AmbiguousTag { what, keys: map.keys().cloned().collect() }),
        }
    }

    fn ignore_unknown(&self, map: &Map<String, Value>, known: &[&str]) {
        for key in map.keys().filter(|k| !known.contains(&k.as_str())) {
            debug!(path = %self.path, key = %key, "ignoring unknown field");
        }
    }

    // ---- Records ----

    fn result_node(&mut self, raw: &Value) -> DecodeResult<ExecutionResult> {
        let map = self.object(raw, "result object with 'Ok' or 'Err'")?;
        let (tag, payload) = self.tagged(map, &["Ok", "Err"], "result")?;
        if tag == "Ok" {
            self.at_key("Ok", |d| d.snapshot_node(payload)).map(Ok)
        } else {
            self.at_key("Err", |d| d.string(payload, "error message")).map(Err)
        }
    }

    fn snapshot_node(&mut self, raw: &Value) -> DecodeResult<Snapshot> {
        let map = self.object(raw, "snapshot object")?;
        let callframes = self.required(map, "callframes", |d, v| d.list(v, "array of call frames", Self::frame))?;
        let stack = self.required(map, "stack", |d, v| d.list(v, "array of expressions", Self::expr_node))?;

        let field = match (map.contains_key("globals"), map.contains_key("envs")) {
            (true, true) => {
                return self.fail(DecodeErrorKind::ConflictingFields { first: "globals", second: "envs" });
            }
            (true, false) => EnvironmentField::Globals,
            (false, true) => EnvironmentField::Envs,
            (false, false) => {
                let field = if self.schema == Schema::Legacy { "globals" } else { "envs" };
                return self.fail(DecodeErrorKind::MissingField { field });
            }
        };
        match (self.schema, field) {
            (Schema::Legacy, EnvironmentField::Envs) => {
                return self.fail(DecodeErrorKind::Schema {
                    schema: self.schema,
                    detail: "environment must be under 'globals'",
                });
            }
            (Schema::Current, EnvironmentField::Globals) => {
                return self.fail(DecodeErrorKind::Schema {
                    schema: self.schema,
                    detail: "environment must be under 'envs'",
                });
            }
            _ => {}
        }
        let bindings = self.required(map, field.key(), Self::bindings)?;
        let log = self.optional(map, "log", Self::names)?;
        self.ignore_unknown(map, SNAPSHOT_KEYS);

        Ok(Snapshot { callframes, stack, environment: Environment { field, bindings }, log })
    }

    fn frame(&mut self, raw: &Value) -> DecodeResult<CallFrame> {
        let map = self.object(raw, "call frame object")?;
        let ip_key = match (map.contains_key("ip"), map.contains_key("instruction_pointer")) {
            (true, true) => {
                return self.fail(DecodeErrorKind::ConflictingFields {
                    first: "ip",
                    second: "instruction_pointer",
                });
            }
            (false, true) => "instruction_pointer",
            _ => "ip",
        };
        let ip = self.required(map, ip_key, |d, v| d.index(v, "non-negative instruction pointer"))?;
        let chunk = self.required(map, "chunk", Self::chunk)?;
        let env = self.optional(map, "env", |d, v| d.string(v, "environment name"))?;
        self.ignore_unknown(map, FRAME_KEYS);
        Ok(CallFrame { ip, chunk, env })
    }

    fn chunk(&mut self, raw: &Value) -> DecodeResult<Chunk> {
        let map = self.object(raw, "chunk object")?;
        let code = self.required(map, "code", |d, v| d.list(v, "array of instructions", Self::instruction))?;
        let constants =
            self.optional(map, "constants", |d, v| d.list(v, "array of constants", Self::expr_node))?;
        self.ignore_unknown(map, CHUNK_KEYS);
        Ok(Chunk { code, constants })
    }

    fn bindings(&mut self, raw: &Value) -> DecodeResult<BTreeMap<String, Binding>> {
        let map = self.object(raw, "environment object")?;
        let mut out = BTreeMap::new();
        for (name, value) in map {
            let binding = self.at_key(name, |d| d.binding(value))?;
            out.insert(name.clone(), binding);
        }
        Ok(out)
    }

    fn binding(&mut self, raw: &Value) -> DecodeResult<Binding> {
        if let Value::Object(map) = raw {
            if map.contains_key("map") && map.keys().all(|k| k == "map" || k == "parent") {
                let bindings = self.required(map, "map", |d, v| {
                    let scope = d.object(v, "scope bindings object")?;
                    let mut out = BTreeMap::new();
                    for (name, value) in scope {
                        let expr = d.at_key(name, |d| d.expr_node(value))?;
                        out.insert(name.clone(), expr);
                    }
                    Ok(out)
                })?;
                let parent = self.optional(map, "parent", |d, v| d.string(v, "parent scope name"))?;
                return Ok(Binding::Scope(Scope { map: bindings, parent }));
            }
        }
        self.expr_node(raw).map(Binding::Value)
    }

    // ---- Instructions ----

    fn instruction(&mut self, raw: &Value) -> DecodeResult<Instruction> {
        match raw {
            Value::String(tag) => match Opcode::from_name(tag) {
                Some(op) => Ok(Instruction::Bare(op)),
                None => self.fail(DecodeErrorKind::UnknownTag { what: "instruction", tag: tag.clone() }),
            },
            Value::Object(map) => {
                let (tag, payload) = self.tagged(map, INSTRUCTION_TAGS, "instruction")?;
                self.at_key(tag, |d| d.instruction_payload(tag, payload))
            }
            other => self.mismatch("instruction", other),
        }
    }

    fn instruction_payload(&mut self, tag: &str, payload: &Value) -> DecodeResult<Instruction> {
        Ok(match tag {
            "Constant" => Instruction::Constant(self.operand(payload)?),
            "Lookup" => Instruction::Lookup(self.string(payload, "name")?),
            "Define" => Instruction::Define(self.string(payload, "name")?),
            "BuiltIn" => Instruction::BuiltIn(self.string(payload, "built-in name")?),
            "Call" => Instruction::Call(self.index(payload, "non-negative argument count")?),
            "CondJump" => Instruction::CondJump(self.index(payload, "non-negative jump offset")?),
            "CondJumpPop" => Instruction::CondJumpPop(self.index(payload, "non-negative jump offset")?),
            "If" => match payload.as_i64() {
                Some(offset) => Instruction::If(offset),
                None => return self.mismatch("integer jump offset", payload),
            },
            other => {
                return self.fail(DecodeErrorKind::UnknownTag { what: "instruction", tag: other.to_string() });
            }
        })
    }

    fn operand(&mut self, payload: &Value) -> DecodeResult<Operand> {
        if payload.is_number() {
            if self.schema == Schema::Current {
                return self.fail(DecodeErrorKind::Schema {
                    schema: self.schema,
                    detail: "Constant must inline its value",
                });
            }
            self.index(payload, "constant pool index").map(Operand::Index)
        } else {
            if self.schema == Schema::Legacy {
                return self.fail(DecodeErrorKind::Schema {
                    schema: self.schema,
                    detail: "Constant must be a constant pool index",
                });
            }
            self.expr_node(payload).map(Operand::Inline)
        }
    }

    // ---- Expressions ----

    fn expr_node(&mut self, root: &Value) -> DecodeResult<Expr> {
        let mut tasks = vec![Task::Visit(root)];
        let mut done: Vec<Expr> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Enter(segment) => self.path.push(segment),
                Task::Leave => self.path.pop(),
                Task::BuildPair => {
                    let (Some(cdr), Some(car)) = (done.pop(), done.pop()) else {
                        unreachable!("pair assembled from fewer than two values");
                    };
                    done.push(Expr::pair(car, cdr));
                }
                Task::BuildQuote => {
                    let Some(inner) = done.pop() else {
                        unreachable!("quote assembled without a value");
                    };
                    done.push(Expr::quote(inner));
                }
                Task::Visit(value) => match value {
                    Value::String(s) if s == NIL_TAG => done.push(Expr::Nil),
                    Value::String(s) => done.push(Expr::Symbol(s.clone())),
                    Value::Object(map) => {
                        let (tag, payload) = self.tagged(map, EXPR_TAGS, "expression")?;
                        self.path.push_key(tag);
                        // compound nodes schedule their own Leave
                        if let Some(atom) = self.expand(tag, payload, &mut tasks)? {
                            self.path.pop();
                            done.push(atom);
                        }
                    }
                    other => return self.mismatch("expression", other),
                },
            }
        }

        let Some(expr) = done.pop() else {
            unreachable!("expression work list finished without a value");
        };
        Ok(expr)
    }

    /// Decodes leaf-like variants directly; for `Pair` and `Quote` pushes the
    /// child visits and returns `None`.
    fn expand<'v>(&mut self, tag: &str, payload: &'v Value, tasks: &mut Vec<Task<'v>>) -> DecodeResult<Option<Expr>> {
        let atom = match tag {
            "Num" => Expr::Num(self.number(payload)?),
            "Boolean" => Expr::Boolean(self.boolean(payload)?),
            "Keyword" => Expr::Keyword(self.text(payload)?),
            "String" => Expr::Str(self.text(payload)?),
            "BuiltIn" => Expr::BuiltIn(self.list(payload, "array of instructions", Self::instruction)?),
            "Lambda" => Expr::Lambda(self.lambda(payload)?),
            "LambdaDefinition" => Expr::LambdaDefinition(self.lambda_definition(payload)?),
            "Quote" => {
                tasks.push(Task::BuildQuote);
                tasks.push(Task::Leave);
                match payload {
                    Value::Array(items) if items.len() == 2 => {
                        tasks.push(Task::Leave);
                        tasks.push(Task::Visit(&items[0]));
                        tasks.push(Task::Enter(Segment::Index(0)));
                    }
                    Value::Array(items) => {
                        return self.fail(DecodeErrorKind::Arity { expected: "2 ([expr, srcloc])", found: items.len() });
                    }
                    inner => tasks.push(Task::Visit(inner)),
                }
                return Ok(None);
            }
            "Pair" => {
                let items = self.array(payload, "[car, cdr] array")?;
                if !matches!(items.len(), 2 | 3) {
                    return self.fail(DecodeErrorKind::Arity { expected: "2 or 3", found: items.len() });
                }
                tasks.extend([
                    Task::BuildPair,
                    Task::Leave,
                    Task::Leave,
                    Task::Visit(&items[1]),
                    Task::Enter(Segment::Index(1)),
                    Task::Leave,
                    Task::Visit(&items[0]),
                    Task::Enter(Segment::Index(0)),
                ]);
                return Ok(None);
            }
            other => {
                return self.fail(DecodeErrorKind::UnknownTag { what: "expression", tag: other.to_string() });
            }
        };
        Ok(Some(atom))
    }

    fn number(&self, payload: &Value) -> DecodeResult<f64> {
        match annotated(payload).unwrap_or(payload).as_f64() {
            Some(n) => Ok(n),
            None => self.mismatch("number or {value, srcloc}", payload),
        }
    }

    fn boolean(&self, payload: &Value) -> DecodeResult<bool> {
        match annotated(payload).unwrap_or(payload).as_bool() {
            Some(b) => Ok(b),
            None => self.mismatch("boolean or {value, srcloc}", payload),
        }
    }

    fn text(&self, payload: &Value) -> DecodeResult<String> {
        match payload {
            Value::String(s) => Ok(s.clone()),
            Value::Array(items) if items.len() == 2 => match &items[0] {
                Value::String(s) => Ok(s.clone()),
                _ => self.mismatch("string or [string, srcloc]", payload),
            },
            other => self.mismatch("string or [string, srcloc]", other),
        }
    }

    fn lambda(&mut self, payload: &Value) -> DecodeResult<Lambda> {
        let items = self.array(payload, "lambda tuple")?;
        match items.len() {
            3 => Ok(Lambda {
                chunk: self.at_index(0, |d| d.chunk(&items[0]))?,
                params: self.at_index(1, |d| d.names(&items[1]))?,
                label: self.at_index(2, |d| d.string(&items[2], "display name"))?,
                variadic: None,
                env: None,
            }),
            4 => Ok(Lambda {
                chunk: self.at_index(0, |d| d.chunk(&items[0]))?,
                params: self.at_index(1, |d| d.names(&items[1]))?,
                label: String::new(),
                variadic: self.at_index(2, |d| d.optional_name(&items[2]))?,
                env: Some(self.at_index(3, |d| d.string(&items[3], "environment name"))?),
            }),
            n => self.fail(DecodeErrorKind::Arity { expected: "3 or 4", found: n }),
        }
    }

    fn lambda_definition(&mut self, payload: &Value) -> DecodeResult<LambdaDefinition> {
        let items = self.array(payload, "lambda definition tuple")?;
        match items.len() {
            2 => Ok(LambdaDefinition {
                chunk: self.at_index(0, |d| d.chunk(&items[0]))?,
                params: self.at_index(1, |d| d.names(&items[1]))?,
                variadic: None,
            }),
            3 => Ok(LambdaDefinition {
                chunk: self.at_index(0, |d| d.chunk(&items[0]))?,
                variadic: self.at_index(1, |d| d.optional_name(&items[1]))?,
                params: self.at_index(2, |d| d.names(&items[2]))?,
            }),
            n => self.fail(DecodeErrorKind::Arity { expected: "2 or 3", found: n }),
        }
    }
}

/// `{value, srcloc}` wrapper used by engines that track source locations.
fn annotated(payload: &Value) -> Option<&Value> {
    match payload {
        Value::Object(map) if map.keys().all(|k| k == "value" || k == "srcloc") => map.get("value"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn err(raw: Value) -> DecodeError {
        decode_result(&raw).expect_err("payload should not decode")
    }

    fn snapshot_with_code(code: Value) -> Value {
        json!({"Ok": {
            "callframes": [{"ip": 0, "chunk": {"code": code, "constants": []}}],
            "stack": [],
            "globals": {}
        }})
    }

    fn snapshot_with_stack(stack: Value) -> Value {
        json!({"Ok": {"callframes": [], "stack": stack, "envs": {}}})
    }

    #[test]
    fn terminal_snapshot() {
        let out = decode_result(&json!({"Ok": {"callframes": [], "stack": [], "envs": {}}})).unwrap();
        let snap = out.unwrap();
        assert!(snap.is_terminal());
        assert!(snap.stack.is_empty());
        assert_eq!(snap.environment.field, EnvironmentField::Envs);
    }

    #[test]
    fn engine_error_is_not_a_decode_error() {
        let out = decode_result(&json!({"Err": "parse error"})).unwrap();
        assert_eq!(out, Err("parse error".to_string()));
    }

    #[test]
    fn legacy_payload_with_constant_pool() {
        let raw = json!({"Ok": {
            "callframes": [{
                "ip": 2,
                "chunk": {
                    "code": [{"Lookup": "+"}, {"Constant": 0}, {"Constant": 1}, {"Call": 2}, "Return"],
                    "constants": [{"Num": 1}, {"Num": 2}]
                }
            }],
            "stack": [{"BuiltIn": ["Add", "Return"]}, {"Num": 1}],
            "globals": {"x": {"Num": 1}}
        }});
        let snap = decode_result(&raw).unwrap().unwrap();
        let frame = snap.current_frame().unwrap();
        assert_eq!(frame.ip, 2);
        assert_eq!(frame.chunk.code[1], Instruction::Constant(Operand::Index(0)));
        assert_eq!(frame.chunk.code[3], Instruction::Call(2));
        assert_eq!(frame.chunk.code[4], Instruction::Bare(Opcode::Return));
        assert_eq!(frame.chunk.constant(1), Some(&Expr::num(2.0)));
        assert_eq!(
            snap.stack[0],
            Expr::BuiltIn(vec![Instruction::Bare(Opcode::Add), Instruction::Bare(Opcode::Return)])
        );
        assert_eq!(snap.environment.field, EnvironmentField::Globals);
        assert_eq!(snap.environment.resolve(None, "x"), Some(&Expr::num(1.0)));
    }

    #[test]
    fn current_payload_with_source_locations_and_scopes() {
        let raw = json!({"Ok": {
            "callframes": [{
                "ip": 0,
                "env": "initial_env",
                "chunk": {"code": [
                    {"Constant": {"Keyword": ["+", null]}},
                    {"Constant": {"Num": {"value": 1.0, "srcloc": {"line": 1, "col": 3}}}},
                    {"Constant": {"Boolean": {"value": true, "srcloc": null}}},
                    {"CondJumpPop": 3},
                    "PopStack"
                ]}
            }],
            "stack": [{"Pair": [{"Num": 1}, "Nil", null]}],
            "envs": {"initial_env": {"map": {"y": {"Num": 5}}, "parent": null}},
            "log": ["hello"]
        }});
        let snap = decode_result(&raw).unwrap().unwrap();
        let frame = snap.current_frame().unwrap();
        assert_eq!(frame.env.as_deref(), Some("initial_env"));
        assert_eq!(frame.chunk.constants, None);
        assert_eq!(frame.chunk.code[0], Instruction::Constant(Operand::Inline(Expr::keyword("+"))));
        assert_eq!(frame.chunk.code[1], Instruction::Constant(Operand::Inline(Expr::num(1.0))));
        assert_eq!(frame.chunk.code[2], Instruction::Constant(Operand::Inline(Expr::Boolean(true))));
        assert_eq!(snap.stack[0], Expr::list([Expr::num(1.0)]));
        assert_eq!(snap.environment.resolve(Some("initial_env"), "y"), Some(&Expr::num(5.0)));
        assert_eq!(snap.log, Some(vec!["hello".to_string()]));
    }

    #[test]
    fn lambda_forms() {
        let chunk = json!({"code": ["Return"], "constants": []});
        let raw = snapshot_with_stack(json!([
            {"Lambda": [chunk, ["n"], "fib"]},
            {"Lambda": [chunk, ["a"], "rest", "3"]},
            {"LambdaDefinition": [chunk, ["n"]]},
            {"LambdaDefinition": [chunk, null, ["n"]]}
        ]));
        let snap = decode_result(&raw).unwrap().unwrap();
        let Expr::Lambda(fib) = &snap.stack[0] else { panic!("expected lambda") };
        assert_eq!(fib.label, "fib");
        assert_eq!(fib.params, vec!["n"]);
        let Expr::Lambda(closure) = &snap.stack[1] else { panic!("expected lambda") };
        assert_eq!(closure.variadic.as_deref(), Some("rest"));
        assert_eq!(closure.env.as_deref(), Some("3"));
        assert!(matches!(&snap.stack[2], Expr::LambdaDefinition(d) if d.variadic.is_none()));
        assert!(matches!(&snap.stack[3], Expr::LambdaDefinition(d) if d.params == vec!["n"]));
    }

    #[test]
    fn bare_strings_are_symbols_except_nil() {
        let snap = decode_result(&snapshot_with_stack(json!(["foo", "Nil"]))).unwrap().unwrap();
        assert_eq!(snap.stack, vec![Expr::symbol("foo"), Expr::Nil]);
    }

    #[test]
    fn instruction_with_two_tags_is_rejected() {
        let e = err(snapshot_with_code(json!([{"Call": 2, "Lookup": "x"}])));
        assert!(matches!(e.kind, DecodeErrorKind::AmbiguousTag { .. }), "{e}");
        assert_eq!(e.path.to_string(), "$.Ok.callframes[0].chunk.code[0]");
    }

    #[test]
    fn expr_with_two_tags_is_rejected() {
        let e = err(snapshot_with_stack(json!([{"Num": 1, "Boolean": true}])));
        assert!(matches!(e.kind, DecodeErrorKind::AmbiguousTag { what: "expression", .. }));
        assert_eq!(e.path.to_string(), "$.Ok.stack[0]");
    }

    #[test]
    fn empty_object_is_untagged() {
        let e = err(snapshot_with_stack(json!([{}])));
        assert_eq!(e.kind, DecodeErrorKind::Untagged { what: "expression" });
    }

    #[test]
    fn unknown_bare_opcode_is_rejected() {
        let e = err(snapshot_with_code(json!(["Jump"])));
        assert_eq!(e.kind, DecodeErrorKind::UnknownTag { what: "instruction", tag: "Jump".to_string() });
    }

    #[test]
    fn call_payload_must_be_an_integer() {
        let e = err(snapshot_with_code(json!([{"Call": "two"}])));
        assert!(matches!(e.kind, DecodeErrorKind::TypeMismatch { .. }));
        assert_eq!(e.path.to_string(), "$.Ok.callframes[0].chunk.code[0].Call");
        let e = err(snapshot_with_code(json!([{"Call": -1}])));
        assert!(matches!(e.kind, DecodeErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn error_path_points_into_nested_pairs() {
        let raw = snapshot_with_stack(json!([{"Pair": [{"Num": 1}, {"Pair": [{"Num": "x"}, "Nil"]}]}]));
        let e = err(raw);
        assert_eq!(e.path.to_string(), "$.Ok.stack[0].Pair[1].Pair[0].Num");
    }

    #[test]
    fn pair_arity_is_checked() {
        let e = err(snapshot_with_stack(json!([{"Pair": [{"Num": 1}]}])));
        assert_eq!(e.kind, DecodeErrorKind::Arity { expected: "2 or 3", found: 1 });
    }

    #[test]
    fn missing_and_conflicting_fields() {
        let e = err(json!({"Ok": {"stack": [], "envs": {}}}));
        assert_eq!(e.kind, DecodeErrorKind::MissingField { field: "callframes" });
        let e = err(json!({"Ok": {"callframes": [], "stack": []}}));
        assert_eq!(e.kind, DecodeErrorKind::MissingField { field: "envs" });
        let e = err(json!({"Ok": {"callframes": [], "stack": [], "envs": {}, "globals": {}}}));
        assert!(matches!(e.kind, DecodeErrorKind::ConflictingFields { .. }));
    }

    #[test]
    fn result_needs_exactly_one_of_ok_or_err() {
        let e = err(json!({"Ok": {"callframes": [], "stack": [], "envs": {}}, "Err": "x"}));
        assert!(matches!(e.kind, DecodeErrorKind::AmbiguousTag { what: "result", .. }));
        let e = err(json!({"Maybe": 1}));
        assert!(matches!(e.kind, DecodeErrorKind::UnknownTag { what: "result", .. }));
        let e = err(json!("An error occured"));
        assert!(matches!(e.kind, DecodeErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn legacy_schema_rejects_inline_constants_and_envs() {
        let inline = snapshot_with_code(json!([{"Constant": {"Num": 1}}]));
        let e = Decoder::new(Schema::Legacy).result(&inline).unwrap_err();
        assert!(matches!(e.kind, DecodeErrorKind::Schema { schema: Schema::Legacy, .. }));

        let envs = json!({"Ok": {"callframes": [], "stack": [], "envs": {}}});
        assert!(Decoder::new(Schema::Legacy).result(&envs).is_err());
    }

    #[test]
    fn current_schema_rejects_indexed_constants() {
        let raw = json!({"Ok": {
            "callframes": [{"ip": 0, "chunk": {"code": [{"Constant": 0}]}}],
            "stack": [],
            "envs": {}
        }});
        let e = Decoder::new(Schema::Current).result(&raw).unwrap_err();
        assert!(matches!(e.kind, DecodeErrorKind::Schema { schema: Schema::Current, .. }));
        assert!(decode_result(&raw).is_ok());
    }

    #[test]
    fn ip_alias_and_conflict() {
        let raw = json!({"callframes": [{"instruction_pointer": 1, "chunk": {"code": ["Return"]}}],
                         "stack": [], "globals": {}});
        assert_eq!(decode_snapshot(&raw).unwrap().callframes[0].ip, 1);
        let raw = json!({"callframes": [{"ip": 1, "instruction_pointer": 1, "chunk": {"code": []}}],
                         "stack": [], "globals": {}});
        assert!(decode_snapshot(&raw).is_err());
    }

    #[test]
    fn unknown_record_fields_are_ignored() {
        let raw = json!({"callframes": [], "stack": [], "globals": {}, "heap_size": 12});
        assert!(decode_snapshot(&raw).is_ok());
    }

    #[test]
    fn deep_list_decodes_iteratively() {
        const DEPTH: usize = 20_000;
        let mut raw = json!("Nil");
        for i in 0..DEPTH {
            raw = json!({"Pair": [{"Num": i}, raw]});
        }
        let expr = Decoder::new(Schema::Lenient).expr(&raw).unwrap();
        let (items, tail) = expr.spine();
        assert_eq!(items.len(), DEPTH);
        assert_eq!(tail, &Expr::Nil);
        assert_eq!(items[0], &Expr::num((DEPTH - 1) as f64));
        drop(items);
        drop(expr);
        crate::engine::release(raw);
    }
}
