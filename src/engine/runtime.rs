//! Single-writer command runtime.
//!
//! The engine already serializes its own mutations, but callers on many
//! threads still need a total order on their commands. This runtime owns one
//! worker thread fed by a bounded queue: commands run strictly in submission
//! order and a full queue fails fast instead of blocking the caller.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::command::CommandEnvelope;
use crate::config::RuntimeConfig;
use crate::engine::{EngineResponse, FleetEngine};
use crate::error::{FleetError, FleetResult, RuntimeError};

enum Job {
    Execute {
        envelope: CommandEnvelope,
        reply: Sender<FleetResult<EngineResponse>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

/// Handle returned by [`FleetRuntime::submit`].
pub struct CommandHandle {
    rx: Receiver<FleetResult<EngineResponse>>,
}

impl CommandHandle {
    /// Waits for the command to complete.
    pub fn join(self) -> FleetResult<EngineResponse> {
        self.rx
            .recv()
            .map_err(|_| FleetError::Runtime(RuntimeError::Disconnected))?
    }

    /// Waits for the command to complete with a timeout.
    pub fn join_timeout(self, timeout: Duration) -> FleetResult<EngineResponse> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FleetError::Runtime(RuntimeError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => FleetError::Runtime(RuntimeError::Disconnected),
        })?
    }
}

/// Runtime that funnels every command through one worker thread.
pub struct FleetRuntime {
    engine: Arc<FleetEngine>,
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    queue_capacity: usize,
}

impl FleetRuntime {
    /// Start the worker.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Internal`] if the worker thread cannot be spawned.
    pub fn new(engine: FleetEngine, config: &RuntimeConfig) -> FleetResult<Self> {
        Self::with_shared(Arc::new(engine), config)
    }

    /// Start the worker over an engine shared with direct readers.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Internal`] if the worker thread cannot be spawned.
    pub fn with_shared(engine: Arc<FleetEngine>, config: &RuntimeConfig) -> FleetResult<Self> {
        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);
        let worker_engine = Arc::clone(&engine);

        let worker = thread::Builder::new()
            .name("busroute-writer".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Execute { envelope, reply } => {
                            let result = worker_engine.execute(envelope);
                            let _ = reply.send(result);
                        }

                        #[cfg(test)]
                        Job::Sleep { duration, reply } => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                }
                debug!("writer queue closed");
            })
            .map_err(|e| FleetError::internal(format!("failed to spawn writer thread: {e}")))?;

        info!(queue_capacity, "fleet runtime started");
        Ok(Self {
            engine,
            tx: Some(tx),
            worker: Some(worker),
            queue_capacity,
        })
    }

    fn try_submit(&self, job: Job) -> FleetResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or(FleetError::Runtime(RuntimeError::Disconnected))?;
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(capacity = self.queue_capacity, "command queue full");
                Err(FleetError::Runtime(RuntimeError::QueueFull {
                    capacity: self.queue_capacity,
                }))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(FleetError::Runtime(RuntimeError::Disconnected))
            }
        }
    }

    /// Queue a command and return a handle to its result.
    pub fn submit(&self, envelope: impl Into<CommandEnvelope>) -> FleetResult<CommandHandle> {
        let (reply, rx) = bounded::<FleetResult<EngineResponse>>(1);
        self.try_submit(Job::Execute {
            envelope: envelope.into(),
            reply,
        })?;
        Ok(CommandHandle { rx })
    }

    /// Queue a command and wait for it.
    pub fn execute(&self, envelope: impl Into<CommandEnvelope>) -> FleetResult<EngineResponse> {
        self.submit(envelope)?.join()
    }

    /// Shared reference to the engine, for direct reads.
    #[must_use]
    pub fn engine(&self) -> &Arc<FleetEngine> {
        &self.engine
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> FleetResult<Receiver<()>> {
        let (reply, rx) = bounded::<()>(1);
        self.try_submit(Job::Sleep { duration, reply })?;
        Ok(rx)
    }
}

impl Drop for FleetRuntime {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued jobs and exit.
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
