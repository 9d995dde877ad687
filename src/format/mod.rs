//! Pure rendering of model values to display text. Total over the model:
//! every variant has a rendering, undecodable payloads get [`UNKNOWN`].

pub mod text;
pub mod view;

use serde_json::Value;

use crate::model::*;
use crate::wire::{Decoder, Schema};

pub use text::TextRenderer;
pub use view::{BindingView, ControllerView, FrameView, InstructionView, ScopeView, SnapshotView};

/// Rendered in place of a payload that is not a valid expression.
pub const UNKNOWN: &str = "<unknown>";

/// Integral values print without a fractional part. `Display` for `f64`
/// already does this at every magnitude and keeps the sign of `-0`.
pub fn format_number(n: f64) -> String {
    format!("{n}")
}

/// `Tag` for bare instructions, `Tag(payload)` otherwise. Inline constants
/// are rendered as expressions.
pub fn format_instruction(instruction: &Instruction) -> String {
    let payload = match instruction {
        Instruction::Bare(op) => return op.name().to_string(),
        Instruction::Constant(Operand::Index(i)) => i.to_string(),
        Instruction::Constant(Operand::Inline(expr)) => format_expr(expr, true),
        Instruction::Lookup(name) | Instruction::Define(name) | Instruction::BuiltIn(name) => name.clone(),
        Instruction::Call(n) | Instruction::CondJump(n) | Instruction::CondJumpPop(n) => n.to_string(),
        Instruction::If(offset) => offset.to_string(),
    };
    format!("{}({})", instruction.tag(), payload)
}

enum Piece<'a> {
    Expr(&'a Expr, bool),
    Text(&'static str),
}

/// Renders `expr` in list syntax. `(a b c)` for proper lists, `(a b . c)`
/// for improper ones; `show_outer_parens` drops the parentheses of the
/// outermost chain only. Elements that are lists keep their own.
pub fn format_expr(expr: &Expr, show_outer_parens: bool) -> String {
    let mut out = String::new();
    let mut work = vec![Piece::Expr(expr, show_outer_parens)];
    while let Some(piece) = work.pop() {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Expr(expr, parens) => fmt_node(&mut out, &mut work, expr, parens),
        }
    }
    out
}

/// Writes what can be written now and schedules children on `work`, last
/// first.
fn fmt_node<'a>(out: &mut String, work: &mut Vec<Piece<'a>>, expr: &'a Expr, parens: bool) {
    match expr {
        Expr::Pair(..) => {
            let (items, tail) = expr.spine();
            if parens {
                out.push('(');
                work.push(Piece::Text(")"));
            }
            if !matches!(tail, Expr::Nil) {
                work.push(Piece::Expr(tail, true));
                work.push(Piece::Text(" . "));
            }
            for (i, &item) in items.iter().enumerate().rev() {
                work.push(Piece::Expr(item, true));
                if i > 0 {
                    work.push(Piece::Text(" "));
                }
            }
        }
        Expr::Quote(inner) => {
            out.push('\'');
            work.push(Piece::Expr(inner, true));
        }
        Expr::Nil => out.push_str("'()"),
        Expr::Num(n) => out.push_str(&format_number(*n)),
        Expr::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Keyword(name) | Expr::Symbol(name) | Expr::Str(name) => out.push_str(name),
        Expr::BuiltIn(_) => out.push_str("BuiltIn"),
        Expr::Lambda(lambda) => {
            out.push_str("Lambda(");
            if lambda.label.is_empty() {
                fmt_params(out, &lambda.params, lambda.variadic.as_deref());
            } else {
                out.push_str(&lambda.label);
            }
            out.push(')');
        }
        Expr::LambdaDefinition(def) => {
            out.push_str("LambdaDefinition(");
            fmt_params(out, &def.params, def.variadic.as_deref());
            out.push(')');
        }
    }
}

fn fmt_params(out: &mut String, params: &[String], variadic: Option<&str>) {
    out.push_str(&params.join(" "));
    if let Some(rest) = variadic {
        if !params.is_empty() {
            out.push(' ');
        }
        out.push_str(". ");
        out.push_str(rest);
    }
}

/// Renders a payload that has not been decoded yet. Anything that is not a
/// valid expression renders as [`UNKNOWN`].
pub fn format_raw_expr(raw: &Value) -> String {
    match Decoder::new(Schema::Lenient).quiet().expr(raw) {
        Ok(expr) => format_expr(&expr, true),
        Err(_) => UNKNOWN.to_string(),
    }
}
