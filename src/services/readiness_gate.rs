use std::time::Duration;

use tracing::{debug, error, info};

use crate::services::backends::{AnnotationBackends, BackendKind};
use crate::state::GateState;

const BACKOFF_BASE_SECS: u64 = 2;
const INITIAL_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub next_delay: Duration,
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            attempts: 0,
            next_delay: INITIAL_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatePoll {
    Ready,
    RetryAfter(Duration),
    Failed(Vec<BackendKind>),
}

/// Waits for every enabled backend to report ready, backing off
/// exponentially, and gives up for good once the ceiling is passed.
pub struct ReadinessGate {
    backends: AnnotationBackends,
    ceiling: u32,
    state: RetryState,
}

impl ReadinessGate {
    pub fn new(backends: AnnotationBackends, ceiling: u32) -> Self {
        Self {
            backends,
            ceiling,
            state: RetryState::default(),
        }
    }

    pub fn retry_state(&self) -> RetryState {
        self.state
    }

    /// Checks readiness once and decides what happens next.
    pub fn poll(&mut self) -> GatePoll {
        self.state.attempts += 1;
        let missing = self.backends.not_ready();
        if missing.is_empty() {
            return GatePoll::Ready;
        }

        if self.state.attempts > self.ceiling {
            return GatePoll::Failed(missing);
        }

        self.state.next_delay =
            Duration::from_secs(BACKOFF_BASE_SECS.saturating_pow(self.state.attempts));
        self.backends.notify_readiness_retry(self.state.attempts);
        debug!(
            attempts = self.state.attempts,
            next_delay_secs = self.state.next_delay.as_secs(),
            ?missing,
            "annotation backends not ready"
        );
        GatePoll::RetryAfter(self.state.next_delay)
    }

    /// Consumes the gate; a failed gate cannot be polled again.
    pub async fn wait_until_ready(mut self) -> GateState {
        if self.backends.is_empty() {
            info!("no annotation backend to wait for");
            return GateState::Armed;
        }

        let mut delay = self.state.next_delay;
        loop {
            tokio::time::sleep(delay).await;
            match self.poll() {
                GatePoll::Ready => {
                    info!(attempts = self.state.attempts, "annotation backends ready");
                    return GateState::Armed;
                }
                GatePoll::RetryAfter(next) => delay = next,
                GatePoll::Failed(missing) => {
                    for backend in missing {
                        error!(
                            %backend,
                            attempts = self.state.attempts,
                            "annotation backend never became ready, indexing disabled"
                        );
                    }
                    return GateState::PermanentlyFailed;
                }
            }
        }
    }
}
