//! Core types shared by every command engine

use std::io::{Read, Write};

/// Outcome reported by a command once it has run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Okay,
    Failure,
}

impl CommandStatus {
    pub fn is_okay(&self) -> bool {
        matches!(self, CommandStatus::Okay)
    }
}

impl From<bool> for CommandStatus {
    fn from(ok: bool) -> Self {
        if ok {
            CommandStatus::Okay
        } else {
            CommandStatus::Failure
        }
    }
}

/// Streams handed to a command for one invocation.
///
/// `input` is never read by the gateway's own commands but is part of the
/// calling convention. `output` and `error` may point at the same buffer.
pub struct CommandIo<'a> {
    pub input: &'a mut dyn Read,
    pub output: &'a mut dyn Write,
    pub error: &'a mut dyn Write,
}

impl<'a> CommandIo<'a> {
    pub fn new(
        input: &'a mut dyn Read,
        output: &'a mut dyn Write,
        error: &'a mut dyn Write,
    ) -> Self {
        Self {
            input,
            output,
            error,
        }
    }
}

impl std::fmt::Debug for CommandIo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandIo").finish_non_exhaustive()
    }
}
