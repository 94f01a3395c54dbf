//! cmdgate-engine - command engine boundary for the cmdgate gateway
//!
//! This crate provides:
//! - The `CommandEngine` calling convention (argument vector in, streams out)
//! - An in-process registry of named commands
//! - An engine that runs an external program per invocation

pub mod error;
pub mod executor;
pub mod registry;
pub mod types;

pub use error::{EngineError, Result};
pub use executor::{CommandEngine, ProcessEngine};
pub use registry::{Command, CommandRegistry};
pub use types::{CommandIo, CommandStatus};
