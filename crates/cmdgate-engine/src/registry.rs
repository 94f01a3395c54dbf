//! In-process command registry

use crate::error::{EngineError, Result};
use crate::executor::CommandEngine;
use crate::types::{CommandIo, CommandStatus};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// A named operation the registry can run.
///
/// `args` excludes the command name itself.
pub trait Command: Send + Sync {
    fn run(&self, args: &[String], io: &mut CommandIo<'_>) -> Result<CommandStatus>;
}

impl<F> Command for F
where
    F: Fn(&[String], &mut CommandIo<'_>) -> Result<CommandStatus> + Send + Sync,
{
    fn run(&self, args: &[String], io: &mut CommandIo<'_>) -> Result<CommandStatus> {
        (self)(args, io)
    }
}

/// Command engine backed by a concurrent map of named commands
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: Arc<DashMap<String, Arc<dyn Command>>>,
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with `ping`, `echo` and `version`
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register("ping", |_args: &[String], io: &mut CommandIo<'_>| {
            io.output.write_all(b"pong")?;
            Ok(CommandStatus::Okay)
        });

        registry.register("echo", |args: &[String], io: &mut CommandIo<'_>| {
            io.output.write_all(args.join(" ").as_bytes())?;
            Ok(CommandStatus::Okay)
        });

        registry.register("version", |_args: &[String], io: &mut CommandIo<'_>| {
            io.output.write_all(env!("CARGO_PKG_VERSION").as_bytes())?;
            Ok(CommandStatus::Okay)
        });

        registry
    }

    /// Register a closure as a command, replacing any previous one with the same name
    pub fn register<F>(&self, name: impl Into<String>, command: F)
    where
        F: Fn(&[String], &mut CommandIo<'_>) -> Result<CommandStatus> + Send + Sync + 'static,
    {
        self.register_command(name, command);
    }

    /// Register any `Command` implementation
    pub fn register_command<C>(&self, name: impl Into<String>, command: C)
    where
        C: Command + 'static,
    {
        let name = name.into();
        debug!("Registering command: {}", name);
        self.commands.insert(name, Arc::new(command));
    }

    /// Remove a command by name
    pub fn unregister(&self, name: &str) -> Result<()> {
        if self.commands.remove(name).is_none() {
            return Err(EngineError::UnknownCommand(name.to_string()));
        }
        Ok(())
    }

    /// Check if a command is registered
    pub fn contains(&self, name: &str) -> bool {
        name == "help" || self.commands.contains_key(name)
    }

    /// Sorted names of every registered command, `help` included
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|entry| entry.key().clone()).collect();
        if !names.iter().any(|n| n == "help") {
            names.push("help".to_string());
        }
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandEngine for CommandRegistry {
    fn dispatch(&self, argv: &[String], io: &mut CommandIo<'_>) -> Result<CommandStatus> {
        let (name, args) = argv
            .split_first()
            .ok_or_else(|| EngineError::InvalidArgument("empty argument vector".to_string()))?;

        // Clone the handle out so the shard lock is not held while the command runs.
        let command = self.commands.get(name.as_str()).map(|entry| Arc::clone(entry.value()));
        match command {
            Some(command) => command.run(args, io),
            None if name == "help" => {
                io.output.write_all(self.names().join("\n").as_bytes())?;
                Ok(CommandStatus::Okay)
            }
            None => Err(EngineError::UnknownCommand(name.clone())),
        }
    }

    fn name(&self) -> &str {
        "builtin"
    }
}
