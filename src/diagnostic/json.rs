use super::{Diagnostic, Severity};

pub fn render(d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };

    let labels: Vec<serde_json::Value> = d
        .labels
        .iter()
        .map(|l| {
            serde_json::json!({
                "path": l.path,
                "message": l.message,
                "primary": l.is_primary,
            })
        })
        .collect();

    let mut obj = serde_json::json!({
        "severity": severity,
        "message": d.message,
        "labels": labels,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    if let Some(node) = &d.node {
        obj["node"] = serde_json::Value::String(node.clone());
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("decoding failed")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "decoding failed");
        assert!(v["labels"].as_array().unwrap().is_empty());
        assert!(v.get("code").is_none());
    }

    #[test]
    fn render_with_path_and_code() {
        let d = Diagnostic::error("bad").with_code("VMS-D001").with_path("$.Ok.stack[2].Num", "expected number");
        let v = parse_json(&render(&d));
        assert_eq!(v["code"], "VMS-D001");
        let label = &v["labels"][0];
        assert_eq!(label["path"], "$.Ok.stack[2].Num");
        assert_eq!(label["primary"], true);
    }

    #[test]
    fn render_with_node_and_notes() {
        let d = Diagnostic::error("bad")
            .with_node(r#"{"Jump":3}"#)
            .with_note("first")
            .with_note("second");
        let v = parse_json(&render(&d));
        assert_eq!(v["node"], r#"{"Jump":3}"#);
        assert_eq!(v["notes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn render_no_suggestion_key_absent() {
        let v = parse_json(&render(&Diagnostic::error("bad")));
        assert!(v.get("suggestion").is_none());
    }

    #[test]
    fn render_warning_severity() {
        let v = parse_json(&render(&Diagnostic::warning("unknown field ignored")));
        assert_eq!(v["severity"], "warning");
    }

    #[test]
    fn render_is_single_line() {
        let d = Diagnostic::error("multi\nline").with_secondary_path("$", "root").with_suggestion("fix it");
        assert!(!render(&d).contains('\n'));
    }
}
