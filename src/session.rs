//! Line-oriented interactive front end over a [`DriverHandle`].

use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::controller::{Action, DriverHandle};
use crate::format::ControllerView;

pub const HELP: &str = "\
commands:
  step, s            advance one instruction
  run, r             recompile the source and run to the end
  load <file>        compile the source in <file>
  source <text>      compile <text>
  show               print the current state again
  help               this list
  quit, q            leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Step,
    Run,
    Load(PathBuf),
    Source(String),
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{command}' needs {what}")]
    MissingArgument { command: &'static str, what: &'static str },
}

/// Parses one input line. Blank lines are `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "step" | "s" => Command::Step,
        "run" | "r" => Command::Run,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "load" if rest.is_empty() => {
            return Err(CommandError::MissingArgument { command: "load", what: "a file path" });
        }
        "load" => Command::Load(PathBuf::from(rest)),
        "source" if rest.is_empty() => {
            return Err(CommandError::MissingArgument { command: "source", what: "program text" });
        }
        "source" => Command::Source(rest.to_string()),
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Reads commands from `input` and prints every published view through
/// `render`. Commands are dispatched as they arrive, so one typed while the
/// engine is busy replaces the pending action. At end of input every action
/// still in flight is waited for, including one queued before the call.
pub async fn interact<R, W>(
    mut handle: DriverHandle,
    input: R,
    out: &mut W,
    render: impl Fn(&ControllerView) -> String,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut views = handle.views.clone();
    let mut lines = input.lines();

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                write!(out, "{}", render(&view))?;
                out.flush()?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let action = match parse_command(&line) {
                    Ok(None) => continue,
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => {
                        writeln!(out, "{HELP}")?;
                        continue;
                    }
                    Ok(Some(Command::Show)) => {
                        write!(out, "{}", render(&handle.view()))?;
                        continue;
                    }
                    Ok(Some(Command::Step)) => Action::Step,
                    Ok(Some(Command::Run)) => Action::Run,
                    Ok(Some(Command::Source(text))) => Action::Compile(text),
                    Ok(Some(Command::Load(path))) => match tokio::fs::read_to_string(&path).await {
                        Ok(text) => Action::Compile(text),
                        Err(e) => {
                            writeln!(out, "cannot read {}: {e}", path.display())?;
                            continue;
                        }
                    },
                    Err(e) => {
                        writeln!(out, "{e}")?;
                        continue;
                    }
                };
                debug!(action = action.name(), "dispatching");
                if !handle.dispatch(action).await {
                    break;
                }
            }
        }
    }

    // print what is still unseen, then wait out anything in flight
    loop {
        if !views.has_changed().unwrap_or(false) && (!handle.pending() || views.changed().await.is_err()) {
            break;
        }
        let view = views.borrow_and_update().clone();
        write!(out, "{}", render(&view))?;
    }
    out.flush()
}
