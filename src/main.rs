//! vmscope command line.
//!
//! ```bash
//! # Decode one engine result and show it
//! vmscope render result.json
//!
//! # Step through a recorded trace
//! vmscope replay trace.json
//!
//! # Drive a live engine
//! vmscope session --engine "rispy-engine --json" --source fib.lisp
//!
//! # Explain an error code
//! vmscope explain VMS-D005
//! ```

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use vmscope::config::{ColorChoice, Config};
use vmscope::controller::{Action, ControllerError, StepController, channel};
use vmscope::diagnostic::ansi::AnsiRenderer;
use vmscope::diagnostic::{Diagnostic, json, registry};
use vmscope::engine::{ProcessEngine, ReplayEngine, parse_payload, payload_bytes, release};
use vmscope::format::{ControllerView, SnapshotView, TextRenderer, format_raw_expr};
use vmscope::session::{HELP, interact};
use vmscope::wire::{Decoder, Schema};

/// Step-through inspector for a Lisp bytecode VM
#[derive(Parser)]
#[command(name = "vmscope")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Snapshot dialect: lenient, legacy or current
    #[arg(long, global = true, env = "VMSCOPE_SCHEMA", default_value = "lenient")]
    schema: Schema,

    /// Colour output: auto, always or never
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a result payload and print the snapshot
    Render {
        /// Payload file, or `-` for stdin
        input: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compile and step through a recorded trace until it finishes
    Replay {
        /// Trace file: {"compile": .., "steps": [..], "run": ..}
        trace: PathBuf,

        /// Print one JSON view per line
        #[arg(long)]
        json: bool,
    },

    /// Drive an engine interactively from stdin
    Session {
        /// Engine command line
        #[arg(long, env = "VMSCOPE_ENGINE")]
        engine: String,

        /// Compile this file first
        #[arg(long)]
        source: Option<PathBuf>,

        /// Print one JSON view per line
        #[arg(long)]
        json: bool,
    },

    /// Print the explanation for an error code
    Explain {
        /// Error code, e.g. VMS-D005
        #[arg(required_unless_present = "list")]
        code: Option<String>,

        /// List every code with a one-line summary
        #[arg(long, conflicts_with = "code")]
        list: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render { input, json } => {
            run_render(&input, Config::resolve(cli.schema, cli.color, json, None))
        }
        Commands::Replay { trace, json } => {
            run_replay(&trace, Config::resolve(cli.schema, cli.color, json, None)).await
        }
        Commands::Session { engine, source, json } => {
            let config = Config::resolve(cli.schema, cli.color, json, Some(engine));
            run_session(source.as_deref(), config).await
        }
        Commands::Explain { code, list } => run_explain(code.as_deref(), list),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            failure.report();
            ExitCode::FAILURE
        }
    }
}

/// A failed command: the diagnostic to print and how to print it.
struct Failure {
    diagnostic: Diagnostic,
    json: bool,
    use_color: bool,
}

impl Failure {
    fn new(diagnostic: Diagnostic, config: &Config) -> Self {
        Failure { diagnostic, json: config.json, use_color: config.use_color }
    }

    fn report(&self) {
        report(&self.diagnostic, self.json, self.use_color);
    }
}

fn report(diagnostic: &Diagnostic, json: bool, use_color: bool) {
    if json {
        eprintln!("{}", json::render(diagnostic));
    } else {
        eprint!("{}", AnsiRenderer { use_color }.render(diagnostic));
    }
}

/// Longest rendering of one stack entry in a decode-failure note.
const NOTE_ENTRY_WIDTH: usize = 32;

/// How the top-level stack of an undecodable payload reads, entry by entry.
/// Entries that do not decode show as `<unknown>`.
fn stack_note(raw: &serde_json::Value) -> Option<String> {
    let stack = raw.get("Ok")?.get("stack")?.as_array()?;
    let entries: Vec<String> = stack
        .iter()
        .map(|entry| {
            let text = format_raw_expr(entry);
            if text.chars().count() <= NOTE_ENTRY_WIDTH {
                text
            } else {
                text.chars().take(NOTE_ENTRY_WIDTH - 3).chain("...".chars()).collect()
            }
        })
        .collect();
    Some(format!("stack reads as: [{}]", entries.join(", ")))
}

fn read_input(path: &Path, config: &Config) -> Result<String, Failure> {
    let mut text = String::new();
    let read = if path.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut text).map(|_| ())
    } else {
        std::fs::read_to_string(path).map(|t| text = t)
    };
    read.map_err(|e| Failure::new(Diagnostic::error(format!("cannot read {}: {e}", path.display())), config))?;
    Ok(text)
}

fn print_json(value: &impl serde::Serialize, pretty: bool) {
    let text = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    match text {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("error: cannot serialize view: {e}"),
    }
}

fn run_render(input: &Path, config: Config) -> Result<(), Failure> {
    let text = read_input(input, &config)?;
    let raw = parse_payload(&text).map_err(|e| {
        Failure::new(Diagnostic::error(format!("{} is not valid JSON: {e}", input.display())), &config)
    })?;

    // a failure is reported as a diagnostic, so the decoder need not log it
    let decoded = match Decoder::new(config.schema).quiet().result(&raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            let mut d = Diagnostic::from(&e);
            if let Some(text) = e.path.resolve(&raw).and_then(|node| payload_bytes(node).ok()) {
                d = d.with_node(String::from_utf8_lossy(&text));
            }
            if let Some(note) = stack_note(&raw) {
                d = d.with_note(note);
            }
            release(raw);
            return Err(Failure::new(d, &config));
        }
    };
    release(raw);

    let renderer = TextRenderer { use_color: config.use_color };
    match decoded {
        Ok(snapshot) => {
            let view = SnapshotView::of(&snapshot);
            if config.json {
                print_json(&view, true);
            } else {
                print!("{}", renderer.render_snapshot(&view));
            }
        }
        Err(message) => {
            if config.json {
                print_json(&serde_json::json!({ "error": message }), true);
            } else {
                print!("{}", renderer.render_error(&message));
            }
        }
    }
    Ok(())
}

fn print_view(view: &ControllerView, config: &Config, heading: &str) {
    if config.json {
        print_json(view, false);
    } else {
        let renderer = TextRenderer { use_color: config.use_color };
        println!("── {heading} ──");
        print!("{}", renderer.render_controller(view));
    }
}

async fn run_replay(trace: &Path, config: Config) -> Result<(), Failure> {
    let text = read_input(trace, &config)?;
    let engine = ReplayEngine::from_json(&text).map_err(|e| Failure::new(Diagnostic::from(&e), &config))?;
    let source = engine.trace().source.clone().unwrap_or_default();
    let mut controller = StepController::new(engine, config.schema);

    let fail = |e: ControllerError| Failure::new(Diagnostic::from(&e), &config);
    controller.apply(Action::Compile(source)).await.map_err(fail)?;
    print_view(&ControllerView::of(&controller), &config, "compile");

    let mut steps = 0;
    while controller.can_step() {
        controller.apply(Action::Step).await.map_err(fail)?;
        steps += 1;
        print_view(&ControllerView::of(&controller), &config, &format!("step {steps}"));
    }

    let unreplayed = controller.engine().remaining();
    if unreplayed > 0 {
        let plural = if unreplayed == 1 { "" } else { "s" };
        let warning = Diagnostic::warning(format!("trace has {unreplayed} unreplayed step{plural}"))
            .with_note(format!("replay stopped after step {steps}"));
        report(&warning, config.json, config.use_color);
    }
    Ok(())
}

async fn run_session(source: Option<&Path>, config: Config) -> Result<(), Failure> {
    let command = config.engine.clone().unwrap_or_default();
    let engine = ProcessEngine::from_command_line(&command).map_err(|e| Failure::new(Diagnostic::from(&e), &config))?;
    let controller = StepController::new(engine, config.schema);
    let (mut handle, driver) = channel(controller);

    if let Some(path) = source {
        let text = read_input(path, &config)?;
        handle.dispatch(Action::Compile(text)).await;
    }

    let renderer = TextRenderer { use_color: config.use_color };
    let json = config.json;
    let render = move |view: &ControllerView| {
        if json {
            serde_json::to_string(view).map(|s| s + "\n").unwrap_or_default()
        } else {
            renderer.render_controller(view)
        }
    };

    let mut stdout = std::io::stdout();
    if !json {
        let _ = writeln!(stdout, "{HELP}");
    }
    let input = BufReader::new(tokio::io::stdin());
    let (_, outcome) = tokio::join!(driver.run(), interact(handle, input, &mut stdout, render));
    outcome.map_err(|e| Failure::new(Diagnostic::error(format!("session i/o failed: {e}")), &config))
}

fn run_explain(code: Option<&str>, list: bool) -> Result<(), Failure> {
    let code = match code {
        Some(code) if !list => code,
        _ => {
            print!("{}", registry::listing());
            return Ok(());
        }
    };
    match registry::lookup(code) {
        Some(entry) => {
            print!("{}", entry.long);
            Ok(())
        }
        None => Err(Failure {
            diagnostic: Diagnostic::error(format!("unknown error code '{code}'"))
                .with_suggestion("codes look like VMS-D001, VMS-E002 or VMS-C003"),
            json: false,
            use_color: false,
        }),
    }
}
