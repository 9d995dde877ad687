//! Step-through inspector for a Lisp bytecode VM.
//!
//! The engine (compiler + VM) lives out of process and speaks JSON. This
//! crate decodes its snapshots into a typed model ([`model`], [`wire`]),
//! drives it one instruction at a time ([`controller`]) and renders what it
//! sees ([`format`]).

pub mod config;
pub mod controller;
pub mod diagnostic;
pub mod engine;
pub mod format;
pub mod model;
pub mod session;
pub mod wire;
