//! Cancellation and deadline scope of one pipeline run.

use mam_core::PipelineStage;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{IngestError, StageFailure};

/// Owned by a single run and independent of whoever submitted the asset.
///
/// Every external call made by the run goes through [`RunScope::guard`], which bounds
/// it by the smaller of the per-call timeout and the time left before the run deadline,
/// and abandons it as soon as the run is cancelled.
#[derive(Debug, Clone)]
pub struct RunScope {
    token: CancellationToken,
    deadline: Instant,
    call_timeout: Duration,
    last_stage: Arc<Mutex<Option<PipelineStage>>>,
}

impl RunScope {
    pub fn new(token: CancellationToken, run_deadline: Duration, call_timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + run_deadline,
            call_timeout,
            last_stage: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Stage of the most recent guarded call, shared by every clone of the scope.
    pub fn last_stage(&self) -> Option<PipelineStage> {
        *self.last_stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `call` as part of `stage`; errors, timeouts and cancellation are all
    /// reported as a failure of that stage.
    pub async fn guard<T, F>(
        &self,
        stage: PipelineStage,
        operation: &str,
        call: F,
    ) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, IngestError>>,
    {
        *self.last_stage.lock().unwrap_or_else(PoisonError::into_inner) = Some(stage);

        if self.token.is_cancelled() {
            return Err(StageFailure::new(stage, IngestError::Cancelled));
        }

        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StageFailure::new(
                stage,
                IngestError::DeadlineExceeded(format!("run deadline passed before {}", operation)),
            ));
        }

        let run_bound = remaining <= self.call_timeout;
        let budget = remaining.min(self.call_timeout);

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StageFailure::new(stage, IngestError::Cancelled)),
            result = tokio::time::timeout(budget, call) => match result {
                Ok(outcome) => outcome.map_err(|e| StageFailure::new(stage, e)),
                Err(_) if run_bound => Err(StageFailure::new(
                    stage,
                    IngestError::DeadlineExceeded(format!("run deadline reached during {}", operation)),
                )),
                Err(_) => Err(StageFailure::new(
                    stage,
                    IngestError::DeadlineExceeded(format!(
                        "{} exceeded its {}ms timeout",
                        operation,
                        budget.as_millis()
                    )),
                )),
            },
        }
    }
}
