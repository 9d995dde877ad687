use std::collections::BTreeMap;

// ---- Instructions ----

/// Zero-argument control instructions. On the wire these are bare string tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Return,
    Print,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    MakeLambda,
    PopStack,
    Apply,
    Display,
}

impl Opcode {
    pub const ALL: [Opcode; 11] = [
        Opcode::Return,
        Opcode::Print,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Negate,
        Opcode::MakeLambda,
        Opcode::PopStack,
        Opcode::Apply,
        Opcode::Display,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Return => "Return",
            Opcode::Print => "Print",
            Opcode::Add => "Add",
            Opcode::Subtract => "Subtract",
            Opcode::Multiply => "Multiply",
            Opcode::Divide => "Divide",
            Opcode::Negate => "Negate",
            Opcode::MakeLambda => "MakeLambda",
            Opcode::PopStack => "PopStack",
            Opcode::Apply => "Apply",
            Opcode::Display => "Display",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.name() == name)
    }
}

/// Payload of a `Constant` instruction. Older engines index into the chunk's
/// constant pool, newer ones inline the value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Index(usize),
    Inline(Expr),
}

/// One bytecode op. Every payload-bearing variant is a single-key object on
/// the wire; `Bare` is a plain string.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Constant(Operand),
    Lookup(String),
    Call(usize),
    Define(String),
    If(i64),
    CondJump(usize),
    CondJumpPop(usize),
    BuiltIn(String),
    Bare(Opcode),
}

impl Instruction {
    /// Discriminant name, identical to the wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Instruction::Constant(_) => "Constant",
            Instruction::Lookup(_) => "Lookup",
            Instruction::Call(_) => "Call",
            Instruction::Define(_) => "Define",
            Instruction::If(_) => "If",
            Instruction::CondJump(_) => "CondJump",
            Instruction::CondJumpPop(_) => "CondJumpPop",
            Instruction::BuiltIn(_) => "BuiltIn",
            Instruction::Bare(op) => op.name(),
        }
    }
}

/// Tags accepted for single-key instruction objects.
pub const INSTRUCTION_TAGS: &[&str] =
    &["Constant", "Lookup", "Call", "Define", "If", "CondJump", "CondJumpPop", "BuiltIn"];

// ---- Runtime values ----

/// A closure: compiled body, formal parameters and a label.
///
/// Engines that track the defining environment send `env` (and possibly a
/// variadic rest parameter) instead of a display label.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub chunk: Chunk,
    pub params: Vec<String>,
    pub label: String,
    pub variadic: Option<String>,
    pub env: Option<String>,
}

/// A lambda template that has not been closed over an environment yet.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaDefinition {
    pub chunk: Chunk,
    pub params: Vec<String>,
    pub variadic: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Boolean(bool),
    Keyword(String),
    Str(String),
    /// A bare string on the wire.
    Symbol(String),
    /// List terminator, the bare string `"Nil"` on the wire.
    Nil,
    Quote(Box<Expr>),
    Pair(Box<Expr>, Box<Expr>),
    BuiltIn(Vec<Instruction>),
    Lambda(Lambda),
    LambdaDefinition(LambdaDefinition),
}

/// Tags accepted for single-key expression objects.
pub const EXPR_TAGS: &[&str] = &[
    "Num",
    "Boolean",
    "Keyword",
    "String",
    "Quote",
    "Pair",
    "BuiltIn",
    "Lambda",
    "LambdaDefinition",
];

/// Bare string reserved for the list terminator.
pub const NIL_TAG: &str = "Nil";

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Num(value)
    }

    pub fn keyword(name: impl Into<String>) -> Self {
        Expr::Keyword(name.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn quote(inner: Expr) -> Self {
        Expr::Quote(Box::new(inner))
    }

    pub fn pair(car: Expr, cdr: Expr) -> Self {
        Expr::Pair(Box::new(car), Box::new(cdr))
    }

    /// Builds a `Nil`-terminated list.
    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::improper_list(items, Expr::Nil)
    }

    /// Builds a pair chain ending in `tail`.
    pub fn improper_list(items: impl IntoIterator<Item = Expr>, tail: Expr) -> Self {
        let items: Vec<Expr> = items.into_iter().collect();
        items.into_iter().rev().fold(tail, |acc, item| Expr::pair(item, acc))
    }

    /// Walks the cdr spine of a pair chain without recursion.
    /// Returns the elements and the final non-pair tail.
    pub fn spine(&self) -> (Vec<&Expr>, &Expr) {
        let mut items = Vec::new();
        let mut cursor = self;
        while let Expr::Pair(car, cdr) = cursor {
            items.push(car.as_ref());
            cursor = cdr.as_ref();
        }
        (items, cursor)
    }

    fn is_compound(&self) -> bool {
        matches!(self, Expr::Pair(..) | Expr::Quote(_))
    }
}

// Pair chains can be thousands deep; the derived drop glue would recurse once
// per link.
impl Drop for Expr {
    fn drop(&mut self) {
        if !self.is_compound() {
            return;
        }
        let mut pending: Vec<Box<Expr>> = Vec::new();
        detach_children(self, &mut pending);
        while let Some(mut node) = pending.pop() {
            detach_children(&mut node, &mut pending);
        }
    }
}

fn detach_children(expr: &mut Expr, pending: &mut Vec<Box<Expr>>) {
    match expr {
        Expr::Pair(car, cdr) => {
            for child in [car, cdr] {
                if child.is_compound() {
                    pending.push(std::mem::replace(child, Box::new(Expr::Nil)));
                }
            }
        }
        Expr::Quote(inner) if inner.is_compound() => {
            pending.push(std::mem::replace(inner, Box::new(Expr::Nil)));
        }
        _ => {}
    }
}

// ---- Code and frames ----

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    /// Absent on engines that inline constants.
    pub constants: Option<Vec<Expr>>,
}

impl Chunk {
    pub fn new(code: Vec<Instruction>) -> Self {
        Chunk { code, constants: None }
    }

    pub fn with_constants(code: Vec<Instruction>, constants: Vec<Expr>) -> Self {
        Chunk { code, constants: Some(constants) }
    }

    /// Resolves an indexed constant against this chunk's pool.
    pub fn constant(&self, index: usize) -> Option<&Expr> {
        self.constants.as_ref().and_then(|pool| pool.get(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    /// May equal `chunk.code.len()` when the frame is about to return.
    pub ip: usize,
    pub chunk: Chunk,
    pub env: Option<String>,
}

impl CallFrame {
    pub fn new(ip: usize, chunk: Chunk) -> Self {
        CallFrame { ip, chunk, env: None }
    }

    pub fn active_instruction(&self) -> Option<&Instruction> {
        self.chunk.code.get(self.ip)
    }
}

// ---- Environment ----

/// Which key the environment arrived under. Kept so re-encoding speaks the
/// engine's dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentField {
    #[default]
    Globals,
    Envs,
}

impl EnvironmentField {
    pub fn key(self) -> &'static str {
        match self {
            EnvironmentField::Globals => "globals",
            EnvironmentField::Envs => "envs",
        }
    }
}

/// A named scope in a chained environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scope {
    pub map: BTreeMap<String, Expr>,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Expr),
    Scope(Scope),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Environment {
    pub field: EnvironmentField,
    pub bindings: BTreeMap<String, Binding>,
}

impl Environment {
    /// Looks `name` up starting from `scope`, following parent links, then
    /// falling back to flat top-level bindings.
    pub fn resolve(&self, scope: Option<&str>, name: &str) -> Option<&Expr> {
        let mut hops = 0;
        let mut cursor = scope;
        while let Some(scope_name) = cursor {
            // a parent cycle would otherwise spin forever
            if hops > self.bindings.len() {
                break;
            }
            hops += 1;
            match self.bindings.get(scope_name) {
                Some(Binding::Scope(s)) => {
                    if let Some(value) = s.map.get(name) {
                        return Some(value);
                    }
                    cursor = s.parent.as_deref();
                }
                _ => break,
            }
        }
        match self.bindings.get(name) {
            Some(Binding::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Every name visible from `scope`, inner bindings shadowing outer ones.
    pub fn visible(&self, scope: Option<&str>) -> BTreeMap<&str, &Expr> {
        let mut out: BTreeMap<&str, &Expr> = self
            .bindings
            .iter()
            .filter_map(|(k, b)| match b {
                Binding::Value(v) => Some((k.as_str(), v)),
                Binding::Scope(_) => None,
            })
            .collect();
        let mut chain = Vec::new();
        let mut cursor = scope;
        while let Some(scope_name) = cursor {
            if chain.len() > self.bindings.len() {
                break;
            }
            match self.bindings.get(scope_name) {
                Some(Binding::Scope(s)) => {
                    chain.push(s);
                    cursor = s.parent.as_deref();
                }
                _ => break,
            }
        }
        for s in chain.into_iter().rev() {
            for (k, v) in &s.map {
                out.insert(k.as_str(), v);
            }
        }
        out
    }
}

// ---- Snapshot ----

/// Fully materialized VM state at one point in execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// Innermost last. Empty once the program has finished.
    pub callframes: Vec<CallFrame>,
    /// Top last.
    pub stack: Vec<Expr>,
    pub environment: Environment,
    pub log: Option<Vec<String>>,
}

impl Snapshot {
    pub fn is_terminal(&self) -> bool {
        self.callframes.is_empty()
    }

    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.callframes.last()
    }
}

/// What every engine call produces once decoded: a snapshot or the engine's
/// own error message.
pub type ExecutionResult = Result<Snapshot, String>;
