//! Two-slot step controller: the current result and the last known-good
//! snapshot behind it.

pub mod driver;
#[cfg(test)]
pub(crate) mod fake;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError, release};
use crate::model::Snapshot;
use crate::wire::{DecodeError, Decoder, Schema};

pub use driver::{Driver, DriverHandle, channel};

/// A user trigger. Actions never overlap; see [`driver`] for supersession.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Compile new source text and show its initial snapshot.
    Compile(String),
    /// Advance the current snapshot by one instruction.
    Step,
    /// Recompile the last source and execute it to the end.
    Run,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Compile(_) => "compile",
            Action::Step => "step",
            Action::Run => "run",
        }
    }
}

/// Why the current slot holds no snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The payload did not match the snapshot model. Logged in detail, shown
    /// to the user generically.
    Decode(DecodeError),
    /// The engine reported a well-formed error. Shown verbatim.
    Semantic(String),
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::Decode(_) => "decoding failed",
            Failure::Semantic(message) => message,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("engine initialization failed: {0}")]
    Init(#[source] EngineError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("no source has been compiled yet")]
    NoSource,
    #[error("cannot step: {reason}")]
    StepUnavailable { reason: &'static str },
}

impl ControllerError {
    /// Stable error code, see `diagnostic::registry`.
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::Init(_) => "VMS-C001",
            ControllerError::Engine(e) => e.code(),
            ControllerError::NoSource => "VMS-C002",
            ControllerError::StepUnavailable { .. } => "VMS-C003",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing compiled yet.
    Empty,
    /// The current slot holds a snapshot or a failure.
    Compiled,
}

/// Owns the engine and the two result slots for one session.
///
/// Every transition awaits exactly one engine call and mutates state only
/// after that await returns, so dropping an in-flight transition leaves the
/// controller as it was.
pub struct StepController<E> {
    engine: E,
    schema: Schema,
    ready: bool,
    source: Option<String>,
    previous: Option<Snapshot>,
    current: Option<Result<Snapshot, Failure>>,
    notice: Option<String>,
}

impl<E: Engine> StepController<E> {
    pub fn new(engine: E, schema: Schema) -> Self {
        StepController {
            engine,
            schema,
            ready: false,
            source: None,
            previous: None,
            current: None,
            notice: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.current.is_some() { Phase::Compiled } else { Phase::Empty }
    }

    /// Last known-good snapshot before the current one.
    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&Result<Snapshot, Failure>> {
        self.current.as_ref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Message from the last action that failed before producing a result.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn can_step(&self) -> bool {
        self.step_blocker().is_none()
    }

    pub fn can_run(&self) -> bool {
        self.source.is_some()
    }

    fn step_blocker(&self) -> Option<&'static str> {
        match &self.current {
            None => Some("nothing has been compiled"),
            Some(Err(_)) => Some("the current result is an error"),
            Some(Ok(snapshot)) if snapshot.is_terminal() => Some("the program has finished"),
            Some(Ok(_)) => None,
        }
    }

    /// Performs one action. Failures that leave the slots untouched are also
    /// kept as the notice.
    pub async fn apply(&mut self, action: Action) -> Result<(), ControllerError> {
        let out = match action {
            Action::Compile(source) => self.compile(source).await,
            Action::Step => self.step().await,
            Action::Run => self.run().await,
        };
        if let Err(e) = &out {
            self.notice = Some(e.to_string());
        }
        out
    }

    pub async fn compile(&mut self, source: String) -> Result<(), ControllerError> {
        self.ensure_ready().await?;
        let raw = self.engine.compile(&source).await;
        self.source = Some(source);
        self.settle("compile", raw)
    }

    pub async fn step(&mut self) -> Result<(), ControllerError> {
        if let Some(reason) = self.step_blocker() {
            return Err(ControllerError::StepUnavailable { reason });
        }
        self.ensure_ready().await?;
        let Some(Ok(snapshot)) = &self.current else {
            return Err(ControllerError::StepUnavailable { reason: "nothing has been compiled" });
        };
        let raw = self.engine.step(snapshot).await;
        self.settle("step", raw)
    }

    pub async fn run(&mut self) -> Result<(), ControllerError> {
        self.ensure_ready().await?;
        let Some(source) = &self.source else {
            return Err(ControllerError::NoSource);
        };
        let raw = self.engine.run(source).await;
        self.settle("run", raw)
    }

    async fn ensure_ready(&mut self) -> Result<(), ControllerError> {
        if !self.ready {
            debug!("initializing engine");
            self.engine.initialize().await.map_err(ControllerError::Init)?;
            self.ready = true;
        }
        Ok(())
    }

    fn settle(&mut self, op: &'static str, raw: Result<Value, EngineError>) -> Result<(), ControllerError> {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(op, code = e.code(), error = %e, "engine call failed");
                return Err(e.into());
            }
        };
        let decoded = match Decoder::new(self.schema).result(&raw) {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(message)) => Err(Failure::Semantic(message)),
            Err(e) => Err(Failure::Decode(e)),
        };
        release(raw);
        self.commit(op, decoded);
        Ok(())
    }

    fn commit(&mut self, op: &'static str, next: Result<Snapshot, Failure>) {
        // an Err current never displaces the known-good previous
        if let Some(Ok(last)) = self.current.take() {
            self.previous = Some(last);
        }
        match &next {
            Ok(snapshot) => info!(
                op,
                frames = snapshot.callframes.len(),
                stack = snapshot.stack.len(),
                terminal = snapshot.is_terminal(),
                "transition committed"
            ),
            Err(failure) => info!(op, error = failure.message(), "transition failed"),
        }
        self.current = Some(next);
        self.notice = None;
    }
}
