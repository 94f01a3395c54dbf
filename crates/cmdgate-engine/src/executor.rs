//! Engine boundary and the external-process engine

use crate::error::{EngineError, Result};
use crate::types::{CommandIo, CommandStatus};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The command-processing engine the gateway dispatches into.
///
/// Calls are synchronous and may block; callers are expected to run them off
/// the async executor. `argv[0]` is the command name.
pub trait CommandEngine: Send + Sync {
    /// Run one command, writing its results to `io`
    fn dispatch(&self, argv: &[String], io: &mut CommandIo<'_>) -> Result<CommandStatus>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "engine"
    }
}

/// Runs a configured program once per invocation, passing the argument
/// vector on its command line
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    base_args: Vec<String>,
    allowed_commands: Vec<String>,
    timeout: Duration,
}

impl ProcessEngine {
    /// Create an engine for `program` with a 30 second kill deadline
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            allowed_commands: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Fixed arguments placed before the argument vector
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    /// Set allowed command names (empty means allow all)
    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.allowed_commands = commands;
        self
    }

    /// Set how long a child may run before it is killed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.is_empty() || self.allowed_commands.iter().any(|c| c == command)
    }
}

impl CommandEngine for ProcessEngine {
    fn dispatch(&self, argv: &[String], io: &mut CommandIo<'_>) -> Result<CommandStatus> {
        let command = argv
            .first()
            .ok_or_else(|| EngineError::InvalidArgument("empty argument vector".to_string()))?;

        if !self.is_allowed(command) {
            return Err(EngineError::CommandNotAllowed(command.clone()));
        }

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let status = supervise(&mut child, command, start, self.timeout)?;

        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;

        io.output.write_all(&stdout)?;
        io.output.flush()?;
        io.error.write_all(&stderr)?;
        io.error.flush()?;

        debug!(
            "Command '{}' exited with {:?} in {}ms",
            command,
            status.code(),
            start.elapsed().as_millis()
        );

        Ok(CommandStatus::from(status.success()))
    }

    fn name(&self) -> &str {
        "process"
    }
}

/// The parts of a child process the wait loop drives
trait Supervised {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> std::io::Result<()>;
    fn wait(&mut self) -> std::io::Result<ExitStatus>;
}

impl Supervised for Child {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> std::io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Poll until the child exits. On timeout or a failed poll the child is
/// killed and reaped before the error is returned.
fn supervise<C: Supervised>(
    child: &mut C,
    command: &str,
    start: Instant,
    timeout: Duration,
) -> Result<ExitStatus> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                warn!("Waiting on command '{}' failed: {}, killing child", command, e);
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        }
        if start.elapsed() >= timeout {
            warn!("Command '{}' exceeded {:?}, killing child", command, timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Timeout(timeout.as_millis() as u64));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| EngineError::ExecutionFailed("output reader panicked".to_string()))?
        .map_err(EngineError::from)
}
