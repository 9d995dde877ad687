/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str, // one line, for listings
    pub long: &'static str,  // full explanation for `vmscope explain`
}

/// All stable error codes.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Decode ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "VMS-D001",
        short: "node has the wrong JSON type",
        long: r#"## VMS-D001: node has the wrong JSON type

A node in the payload exists but holds the wrong kind of JSON value.

**Example:**

    {"Call": "2"}

`Call` carries an argument count, so its payload must be a non-negative
integer. The error path points at the payload itself, e.g.
`$.Ok.callframes[0].chunk.code[3].Call`.
"#,
    },
    ErrorEntry {
        code: "VMS-D002",
        short: "required field missing",
        long: r#"## VMS-D002: required field missing

A snapshot, call frame or chunk lacks a field it must have.

Snapshots need `callframes`, `stack` and an environment (`globals` or
`envs`). Call frames need `ip` and `chunk`. Chunks need `code`.
The constant pool (`constants`) is optional.
"#,
    },
    ErrorEntry {
        code: "VMS-D003",
        short: "unknown tag",
        long: r#"## VMS-D003: unknown tag

A tagged node names a variant that does not exist.

**Example:**

    {"Jump": 3}

Instructions, expressions and results form closed sets. The usual cause
is an engine newer than this inspector; upgrade vmscope or the engine so
they agree.
"#,
    },
    ErrorEntry {
        code: "VMS-D004",
        short: "node has no tag",
        long: r#"## VMS-D004: node has no tag

A tagged node is an empty object, so there is nothing to say which
variant it is.

**Example:**

    {"Ok": {"callframes": [], "stack": [{}], "envs": {}}}
"#,
    },
    ErrorEntry {
        code: "VMS-D005",
        short: "node has several tags",
        long: r#"## VMS-D005: node has several tags

A tagged node carries more than one key. Each node must name exactly one
variant; the decoder never picks the first match.

**Example:**

    {"Num": 1, "Boolean": true}
"#,
    },
    ErrorEntry {
        code: "VMS-D006",
        short: "mutually exclusive fields",
        long: r#"## VMS-D006: mutually exclusive fields

Two spellings of the same field are present at once, for example a
snapshot with both `globals` and `envs`, or a frame with both `ip` and
`instruction_pointer`. Keep one of them.
"#,
    },
    ErrorEntry {
        code: "VMS-D007",
        short: "tuple has the wrong length",
        long: r#"## VMS-D007: tuple has the wrong length

A positional payload has the wrong number of elements.

`Pair` takes `[car, cdr]` (plus an optional source location), `Lambda`
takes `[chunk, params, name]` or `[chunk, params, variadic, env]`, and
`LambdaDefinition` takes `[chunk, params]` or `[chunk, variadic, params]`.
"#,
    },
    ErrorEntry {
        code: "VMS-D008",
        short: "not allowed by the selected schema",
        long: r#"## VMS-D008: not allowed by the selected schema

The payload uses a form that the selected dialect does not have.

The legacy schema stores the environment under `globals` and has
`Constant` index the chunk's constant pool. The current schema stores it
under `envs` and inlines the constant value. The lenient schema (the
default) accepts either, node by node.

**Fix:**

    vmscope --schema lenient render payload.json
"#,
    },
    // ── Engine ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "VMS-E001",
        short: "engine not ready",
        long: r#"## VMS-E001: engine not ready

The engine was used before its initialization finished, or the
initialization itself failed. Nothing was compiled or stepped.

Check that the engine command starts and exits successfully when sent
`{"op":"init"}` on stdin.
"#,
    },
    ErrorEntry {
        code: "VMS-E002",
        short: "engine could not be started",
        long: r#"## VMS-E002: engine could not be started

The engine command could not be spawned. Usually the program is not on
`PATH` or is not executable.

Pass the command with `--engine` or set `VMSCOPE_ENGINE`.
"#,
    },
    ErrorEntry {
        code: "VMS-E003",
        short: "engine call failed",
        long: r#"## VMS-E003: engine call failed

The engine exited with a failure status, or refused the call, instead of
returning a result. This is different from a compile or runtime error,
which the engine reports as `{"Err": message}`.

The snapshots on screen are unchanged; retry with `run`.
"#,
    },
    ErrorEntry {
        code: "VMS-E004",
        short: "engine i/o failed",
        long: r#"## VMS-E004: engine i/o failed

Reading from or writing to the engine process failed part way through.
"#,
    },
    ErrorEntry {
        code: "VMS-E005",
        short: "engine output is not JSON",
        long: r#"## VMS-E005: engine output is not JSON

The engine must print exactly one JSON value, `{"Ok": snapshot}` or
`{"Err": message}`, on stdout. Diagnostics belong on stderr.
"#,
    },
    ErrorEntry {
        code: "VMS-E006",
        short: "operation not supported",
        long: r#"## VMS-E006: operation not supported

The engine cannot perform this operation. A replayed trace without a
recorded `run` payload, for example, cannot run.
"#,
    },
    // ── Controller ───────────────────────────────────────────────────────────
    ErrorEntry {
        code: "VMS-C001",
        short: "engine initialization failed",
        long: r#"## VMS-C001: engine initialization failed

The engine failed to initialize, so no source could be compiled. This
is reported apart from compile errors. The note names the underlying
engine error code.
"#,
    },
    ErrorEntry {
        code: "VMS-C002",
        short: "nothing to run",
        long: r#"## VMS-C002: nothing to run

`run` recompiles the last source, but no source has been given yet.
Use `load <file>` or `source <text>` first.
"#,
    },
    ErrorEntry {
        code: "VMS-C003",
        short: "step unavailable",
        long: r#"## VMS-C003: step unavailable

There is no snapshot to step from. Either nothing has been compiled,
the current result is an error, or the program has finished (its
snapshot has no call frames).

`run` is always available once source has been given.
"#,
    },
];

/// One line per code, `CODE  short`, for `vmscope explain --list`.
pub fn listing() -> String {
    let mut out = String::new();
    for entry in REGISTRY {
        out.push_str(entry.code);
        out.push_str("  ");
        out.push_str(entry.short);
        out.push('\n');
    }
    out
}

/// Look up an error entry by code (e.g. `"VMS-D005"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerError;
    use crate::engine::EngineError;

    #[test]
    fn lookup_known_code() {
        let e = lookup("VMS-D005").expect("VMS-D005 should be in registry");
        assert_eq!(e.code, "VMS-D005");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("VMS-D005"));
        assert!(lookup("vms-d005").is_some());
    }

    #[test]
    fn listing_has_a_line_per_code() {
        let text = listing();
        assert_eq!(text.lines().count(), REGISTRY.len());
        assert!(text.lines().any(|l| l == "VMS-D001  node has the wrong JSON type"), "{text}");
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("VMS-X999").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn all_codes_have_content() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.contains(entry.code), "{} long text does not name it", entry.code);
        }
    }

    #[test]
    fn every_emitted_code_is_registered() {
        let emitted = [
            EngineError::NotInitialized.code(),
            EngineError::Io(std::io::Error::other("x")).code(),
            EngineError::Unsupported { op: "run" }.code(),
            EngineError::Exit { status: "1".into(), stderr: String::new() }.code(),
            ControllerError::Init(EngineError::NotInitialized).code(),
            ControllerError::NoSource.code(),
            ControllerError::StepUnavailable { reason: "done" }.code(),
        ];
        for code in emitted {
            assert!(lookup(code).is_some(), "{code} is not registered");
        }
        for n in 1..=8 {
            let code = format!("VMS-D{n:03}");
            assert!(lookup(&code).is_some(), "{code} is not registered");
        }
    }
}
