//! Display-ready views over snapshots and controller state. Everything here
//! is already formatted text; renderers only lay it out.

use serde::Serialize;

use super::{format_expr, format_instruction};
use crate::controller::{Phase, StepController};
use crate::engine::Engine;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionView {
    pub label: String,
    /// The instruction at the frame's instruction pointer.
    pub active: bool,
    /// Pool entry an indexed `Constant` refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub ip: usize,
    /// Only the innermost frame is active.
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    pub instructions: Vec<InstructionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingView {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub bindings: Vec<BindingView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotView {
    pub terminal: bool,
    /// Top of stack first.
    pub stack: Vec<String>,
    /// Innermost frame first.
    pub frames: Vec<FrameView>,
    /// Names visible from the innermost frame, sorted.
    pub bindings: Vec<BindingView>,
    pub scopes: Vec<ScopeView>,
    pub log: Vec<String>,
}

impl SnapshotView {
    pub fn of(snapshot: &Snapshot) -> Self {
        let stack = snapshot.stack.iter().rev().map(|e| format_expr(e, true)).collect();
        let frames = snapshot
            .callframes
            .iter()
            .rev()
            .enumerate()
            .map(|(depth, frame)| frame_view(frame, depth == 0))
            .collect();

        let scope = snapshot.current_frame().and_then(|f| f.env.as_deref());
        let bindings = binding_views(snapshot.environment.visible(scope).into_iter());
        let scopes = snapshot
            .environment
            .bindings
            .iter()
            .filter_map(|(name, binding)| match binding {
                Binding::Scope(s) => Some(ScopeView {
                    name: name.clone(),
                    parent: s.parent.clone(),
                    bindings: binding_views(s.map.iter().map(|(k, v)| (k.as_str(), v))),
                }),
                Binding::Value(_) => None,
            })
            .collect();

        SnapshotView {
            terminal: snapshot.is_terminal(),
            stack,
            frames,
            bindings,
            scopes,
            log: snapshot.log.clone().unwrap_or_default(),
        }
    }
}

fn frame_view(frame: &CallFrame, active: bool) -> FrameView {
    let instructions = frame
        .chunk
        .code
        .iter()
        .enumerate()
        .map(|(i, instruction)| InstructionView {
            label: format_instruction(instruction),
            active: i == frame.ip,
            constant: match instruction {
                Instruction::Constant(Operand::Index(k)) => frame.chunk.constant(*k).map(|e| format_expr(e, true)),
                _ => None,
            },
        })
        .collect();
    FrameView { ip: frame.ip, active, env: frame.env.clone(), instructions }
}

fn binding_views<'a>(pairs: impl Iterator<Item = (&'a str, &'a Expr)>) -> Vec<BindingView> {
    let mut out: Vec<BindingView> =
        pairs.map(|(name, value)| BindingView { name: name.to_string(), value: format_expr(value, true) }).collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// Everything a front end needs to draw the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerView {
    pub phase: &'static str,
    /// Failure of the current result: verbatim for engine errors, generic
    /// for decode failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// An action that failed without producing a result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotView>,
    /// `snapshot` is the previous known-good state, not the current one.
    pub fallback: bool,
    pub can_step: bool,
    pub can_run: bool,
}

impl ControllerView {
    pub fn of<E: Engine>(controller: &StepController<E>) -> Self {
        let (error, snapshot, fallback) = match controller.current() {
            Some(Ok(current)) => (None, Some(SnapshotView::of(current)), false),
            Some(Err(failure)) => {
                let previous = controller.previous().map(SnapshotView::of);
                let fallback = previous.is_some();
                (Some(failure.message().to_string()), previous, fallback)
            }
            None => (None, None, false),
        };
        ControllerView {
            phase: match controller.phase() {
                Phase::Empty => "empty",
                Phase::Compiled => "compiled",
            },
            error,
            notice: controller.notice().map(str::to_string),
            snapshot,
            fallback,
            can_step: controller.can_step(),
            can_run: controller.can_run(),
        }
    }
}
