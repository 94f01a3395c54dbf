//! Dispatch bridge into the command engine
//!
//! Engine calls block, so each one runs on the blocking pool. A semaphore
//! bounds how many run at once and every call has a time budget. Output and
//! error streams share one capture buffer, so the caller sees them merged in
//! write order.

use cmdgate_engine::{CommandEngine, CommandIo, CommandStatus};
use parking_lot::Mutex;
use std::any::Any;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::error::{GatewayError, GatewayResult};

/// Captured result of one engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutput {
    pub body: Vec<u8>,
    pub status: CommandStatus,
}

impl DispatchOutput {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Write sink shared by the output and error streams
#[derive(Debug, Clone, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct CommandBridge {
    engine: Arc<dyn CommandEngine>,
    workers: Arc<Semaphore>,
    timeout: Duration,
}

impl std::fmt::Debug for CommandBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBridge")
            .field("engine", &self.engine.name())
            .field("available_workers", &self.workers.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CommandBridge {
    pub fn new(engine: Arc<dyn CommandEngine>, max_workers: usize, timeout: Duration) -> Self {
        Self {
            engine,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            timeout,
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run `argv` through the engine and capture what it writes.
    ///
    /// Every engine failure, including a panic, comes back as a
    /// `GatewayError`. The time budget covers waiting for a worker as well as
    /// the call itself. A call that times out is abandoned and keeps its
    /// worker until the engine actually returns.
    pub async fn dispatch(&self, argv: Vec<String>) -> GatewayResult<DispatchOutput> {
        let command = argv.first().cloned().unwrap_or_default();
        let workers = Arc::clone(&self.workers);
        let engine = Arc::clone(&self.engine);
        let capture = CaptureBuffer::default();
        let sink = capture.clone();
        let start = Instant::now();

        let run = async move {
            let permit = workers
                .acquire_owned()
                .await
                .map_err(|_| GatewayError::Uncategorized(Some("worker pool closed".to_string())))?;

            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let mut input = std::io::empty();
                let mut output = sink.clone();
                let mut error = sink;
                let mut io = CommandIo::new(&mut input, &mut output, &mut error);
                engine.dispatch(&argv, &mut io)
            });
            Ok::<_, GatewayError>(task.await)
        };

        let joined = match tokio::time::timeout(self.timeout, run).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(
                    "Command '{}' exceeded {:?} ({} worker(s) free)",
                    command,
                    self.timeout,
                    self.workers.available_permits()
                );
                return Err(GatewayError::Timeout(self.timeout.as_millis() as u64));
            }
        };

        let result = match joined {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                error!("Command '{}' panicked: {}", command, message);
                return Err(GatewayError::Uncategorized(Some(message)));
            }
            Err(join_err) => {
                error!("Command '{}' was cancelled: {}", command, join_err);
                return Err(GatewayError::Uncategorized(Some(join_err.to_string())));
            }
        };

        let status = result.map_err(|e| {
            debug!("Command '{}' failed: {}", command, e);
            GatewayError::from(e)
        })?;

        debug!(
            "Command '{}' finished {:?} in {}ms",
            command,
            status,
            start.elapsed().as_millis()
        );

        Ok(DispatchOutput {
            body: capture.take(),
            status,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    }
}
