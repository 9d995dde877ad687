use super::view::{BindingView, ControllerView, FrameView, SnapshotView};
use crate::diagnostic::ansi::Paint;

/// Plain-text layout of views for the terminal.
pub struct TextRenderer {
    pub use_color: bool,
}

impl TextRenderer {
    fn paint(&self) -> Paint {
        Paint { use_color: self.use_color }
    }

    pub fn render_snapshot(&self, view: &SnapshotView) -> String {
        let p = self.paint();
        let mut out = String::new();

        out.push_str(&format!("{}\n", p.bold("stack:")));
        if view.stack.is_empty() {
            out.push_str(&format!("  {}\n", p.dim("(empty)")));
        }
        for item in &view.stack {
            out.push_str(&format!("  {item}\n"));
        }

        out.push_str(&format!("{}\n", p.bold("frames:")));
        if view.frames.is_empty() {
            out.push_str(&format!("  {}\n", p.dim("(none)")));
        }
        for (depth, frame) in view.frames.iter().enumerate() {
            self.render_frame(&mut out, depth, frame);
        }

        if !view.bindings.is_empty() {
            out.push_str(&format!("{}\n", p.bold("bindings:")));
            self.render_bindings(&mut out, &view.bindings, "  ");
        }
        for scope in &view.scopes {
            let parent = scope.parent.as_deref().map(|parent| format!(" <- {parent}")).unwrap_or_default();
            out.push_str(&format!("{}\n", p.bold(&format!("scope {}{parent}:", scope.name))));
            self.render_bindings(&mut out, &scope.bindings, "  ");
        }

        if !view.log.is_empty() {
            out.push_str(&format!("{}\n", p.bold("log:")));
            for line in &view.log {
                out.push_str(&format!("  {line}\n"));
            }
        }

        if view.terminal {
            out.push_str(&format!("{}\n", p.green("finished")));
        }
        out
    }

    fn render_frame(&self, out: &mut String, depth: usize, frame: &FrameView) {
        let p = self.paint();
        let env = frame.env.as_deref().map(|e| format!(", env {e}")).unwrap_or_default();
        let header = format!("  #{depth} (ip {}{env})", frame.ip);
        out.push_str(&format!("{}\n", if frame.active { p.cyan(&header) } else { p.dim(&header) }));
        for instruction in &frame.instructions {
            let constant = instruction.constant.as_deref().map(|c| format!("  ; {c}")).unwrap_or_default();
            if instruction.active {
                out.push_str(&format!("  {} {}{}\n", p.green(">"), p.bold(&instruction.label), p.dim(&constant)));
            } else {
                out.push_str(&format!("    {}{}\n", instruction.label, p.dim(&constant)));
            }
        }
    }

    fn render_bindings(&self, out: &mut String, bindings: &[BindingView], indent: &str) {
        for binding in bindings {
            out.push_str(&format!("{indent}{} = {}\n", binding.name, binding.value));
        }
    }

    pub fn render_error(&self, message: &str) -> String {
        let p = self.paint();
        format!("{}: {}\n", p.bold_red("error"), p.bold(message))
    }

    pub fn render_controller(&self, view: &ControllerView) -> String {
        let p = self.paint();
        let mut out = String::new();
        if let Some(notice) = &view.notice {
            out.push_str(&format!("{}: {notice}\n", p.cyan("notice")));
        }
        if let Some(error) = &view.error {
            out.push_str(&self.render_error(error));
        }
        if view.fallback {
            out.push_str(&format!("{}\n", p.dim("showing the last good snapshot")));
        }
        match &view.snapshot {
            Some(snapshot) => out.push_str(&self.render_snapshot(snapshot)),
            None if view.error.is_none() => out.push_str(&format!("{}\n", p.dim("nothing compiled"))),
            None => {}
        }

        let mut actions = Vec::new();
        if view.can_step {
            actions.push("step");
        }
        if view.can_run {
            actions.push("run");
        }
        let actions = if actions.is_empty() { "none".to_string() } else { actions.join(", ") };
        out.push_str(&format!("{} {actions}\n", p.dim("actions:")));
        out
    }
}
