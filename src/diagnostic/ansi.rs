use super::{Diagnostic, Severity};

/// Longest node excerpt shown under a label, in characters.
const SNIPPET_WIDTH: usize = 72;

/// ANSI styling that collapses to plain text when colour is off. Shared by
/// every terminal renderer.
#[derive(Debug, Clone, Copy)]
pub struct Paint {
    pub use_color: bool,
}

impl Paint {
    fn apply(self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn bold(self, s: &str) -> String {
        self.apply("1", s)
    }

    pub fn bold_red(self, s: &str) -> String {
        self.apply("1;31", s)
    }

    pub fn bold_cyan(self, s: &str) -> String {
        self.apply("1;36", s)
    }

    pub fn green(self, s: &str) -> String {
        self.apply("32", s)
    }

    pub fn cyan(self, s: &str) -> String {
        self.apply("36", s)
    }

    pub fn dim(self, s: &str) -> String {
        self.apply("2", s)
    }
}

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    pub fn render(&self, d: &Diagnostic) -> String {
        let p = Paint { use_color: self.use_color };
        let mut out = String::new();

        // "error[VMS-D005]: message"
        let severity_label = match d.severity {
            Severity::Error => p.bold_red("error"),
            Severity::Warning => p.bold_cyan("warning"),
        };
        let code = d.code.map(|c| format!("[{c}]")).unwrap_or_default();
        out.push_str(&format!("{}{}: {}\n", severity_label, p.bold_red(&code), p.bold(&d.message)));

        let primary = d.labels.iter().find(|l| l.is_primary);
        if let Some(label) = primary {
            // "  --> $.Ok.stack[0]"
            out.push_str(&format!("  {} {}\n", p.cyan("-->"), label.path));

            if let Some(node) = &d.node {
                let pipe = p.cyan("|");
                let snippet = excerpt(node);
                out.push_str(&format!("   {pipe}\n"));
                out.push_str(&format!("   {pipe} {snippet}\n"));
                let carets = p.bold_red(&"^".repeat(snippet.chars().count().max(1)));
                if label.message.is_empty() {
                    out.push_str(&format!("   {pipe} {carets}\n"));
                } else {
                    out.push_str(&format!("   {pipe} {carets} {}\n", p.bold_red(&label.message)));
                }
                out.push_str(&format!("   {pipe}\n"));
            } else if !label.message.is_empty() {
                out.push_str(&format!("  {} {}\n", p.dim("="), label.message));
            }
        }

        for label in d.labels.iter().filter(|l| !l.is_primary) {
            out.push_str(&format!("  {} {}: {}\n", p.dim("="), label.path, label.message));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", p.dim("="), note));
        }

        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} suggestion: {}\n", p.dim("="), suggestion));
        }

        out
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= SNIPPET_WIDTH {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(SNIPPET_WIDTH - 3).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_diag() -> Diagnostic {
        Diagnostic::error("payload does not match")
            .with_code("VMS-D005")
            .with_path("$.Ok.stack[0]", "more than one tag")
            .with_node(json!({"Num": 1, "Boolean": true}).to_string())
            .with_note("tagged nodes carry exactly one key")
            .with_suggestion("fix the engine")
    }

    #[test]
    fn render_contains_code_and_message() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag());
        assert!(out.starts_with("error[VMS-D005]: payload does not match\n"), "{out}");
    }

    #[test]
    fn render_contains_location() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag());
        assert!(out.contains("--> $.Ok.stack[0]"), "{out}");
    }

    #[test]
    fn carets_underline_the_node() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag());
        let node = json!({"Num": 1, "Boolean": true}).to_string();
        assert!(out.contains(&node), "{out}");
        assert!(out.contains(&format!("{} more than one tag", "^".repeat(node.len()))), "{out}");
    }

    #[test]
    fn long_nodes_are_cut() {
        let d = Diagnostic::error("bad").with_path("$", "here").with_node(json!("x".repeat(200)).to_string());
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("..."), "{out}");
        assert!(out.lines().all(|l| l.chars().count() < 100), "{out}");
    }

    #[test]
    fn render_contains_note_and_suggestion() {
        let out = AnsiRenderer { use_color: false }.render(&make_diag());
        assert!(out.contains("note: tagged nodes"), "{out}");
        assert!(out.contains("suggestion: fix the engine"), "{out}");
    }

    #[test]
    fn render_without_path_still_works() {
        let out = AnsiRenderer { use_color: false }.render(&Diagnostic::error("something bad"));
        assert_eq!(out, "error: something bad\n");
    }

    #[test]
    fn color_only_when_asked() {
        assert!(AnsiRenderer { use_color: true }.render(&make_diag()).contains("\x1b["));
        assert!(!AnsiRenderer { use_color: false }.render(&make_diag()).contains("\x1b["));
    }

    #[test]
    fn warnings_are_labelled() {
        let out = AnsiRenderer { use_color: false }.render(&Diagnostic::warning("trace has 2 unreplayed steps"));
        assert_eq!(out, "warning: trace has 2 unreplayed steps\n");
    }

    #[test]
    fn secondary_labels_follow_the_primary() {
        let d = Diagnostic::error("both present")
            .with_path("$.Ok", "both fields present")
            .with_secondary_path("$.Ok.envs", "conflicts with 'globals'");
        let out = AnsiRenderer { use_color: false }.render(&d);
        assert!(out.contains("--> $.Ok\n"), "{out}");
        assert!(out.contains("= $.Ok.envs: conflicts with 'globals'"), "{out}");
    }

    #[test]
    fn paint_is_plain_without_color() {
        assert_eq!(Paint { use_color: false }.bold_red("error"), "error");
        assert_eq!(Paint { use_color: true }.green("ok"), "\x1b[32mok\x1b[0m");
    }
}
