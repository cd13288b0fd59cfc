//! Engine module housing the pipeline core.
//!
//! This module exposes the trait-based capture backends (`backend`) and the
//! `EngineHandle` orchestration layer (`core`).

pub mod backend;
pub mod core;

pub use backend::{CaptureBackend, CpalBackend, StubBackend};
pub use core::{EngineDeps, EngineHandle};
