//! Execution controller - run lifecycle and single-flight guard
//!
//! State machine: `Idle -> Running -> Settled(result)`, and any state back
//! to `Running` when a new run starts. A `run` call made while another run
//! is in flight is rejected without touching the backend. A run whose
//! future is dropped before it finishes still settles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{info, warn};

use super::normalizer::{connection_help, normalize};
use super::status::ExecutionResult;
use super::transport::{RunRequest, Transport};
use crate::session::Session;

/// Default time a run may take before it is settled as a connection error
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Settled(ExecutionResult),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            RunState::Settled(result) => Some(result),
            _ => None,
        }
    }
}

pub struct ExecutionController {
    transport: Arc<dyn Transport>,
    state: watch::Sender<RunState>,
    timeout: Duration,
}

impl ExecutionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            transport,
            state,
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run `session` on the backend.
    ///
    /// Returns `None` without sending anything if a run is already in
    /// flight. Otherwise always settles, even on transport failure or
    /// timeout, and returns the settled result.
    pub async fn run(&self, session: &Session) -> Option<ExecutionResult> {
        let request = RunRequest::from(session);

        // Check-and-set under the channel's write lock
        let started = self.state.send_if_modified(|state| {
            if state.is_running() {
                false
            } else {
                *state = RunState::Running;
                true
            }
        });

        if !started {
            info!("Run already in progress, ignoring new run request");
            return None;
        }

        info!(
            "Starting run: language={}, code_len={}, input_len={}",
            request.language,
            request.code.len(),
            request.input.len()
        );

        let started_at = Instant::now();
        let guard = SettleOnDrop {
            state: &self.state,
            endpoint: self.transport.endpoint(),
            armed: true,
        };
        let result = self.execute(&request).await;
        guard.disarm();

        info!(
            "Run settled: status={}, wall_time_ms={}",
            result.status,
            started_at.elapsed().as_millis()
        );

        self.state.send_replace(RunState::Settled(result.clone()));
        Some(result)
    }

    async fn execute(&self, request: &RunRequest) -> ExecutionResult {
        let endpoint = self.transport.endpoint();

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(Ok(raw)) => normalize(raw.status, &raw.body, endpoint),
            Ok(Err(e)) => {
                warn!("Run request failed: {}", e);
                ExecutionResult::connection_error(format!("{} ({})", connection_help(endpoint), e))
            }
            Err(_) => {
                warn!(
                    "Run request timed out after {}s",
                    self.timeout.as_secs_f32()
                );
                ExecutionResult::connection_error(format!(
                    "{} (no response within {}s)",
                    connection_help(endpoint),
                    self.timeout.as_secs_f32()
                ))
            }
        }
    }
}

/// Settles an abandoned run so the controller never stays `Running`
struct SettleOnDrop<'a> {
    state: &'a watch::Sender<RunState>,
    endpoint: &'a str,
    armed: bool,
}

impl SettleOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Run was cancelled before the backend answered");
        self.state
            .send_replace(RunState::Settled(ExecutionResult::connection_error(format!(
                "{} (run was cancelled before a response arrived)",
                connection_help(self.endpoint)
            ))));
    }
}
