use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::BatchJob;
use crate::marketing_client::MarketingClient;
use crate::marketing_client::RemoteServiceError;
use crate::marketing_client::UploadContext;
use crate::utils::error_chain_fmt;

/// Anything that can report the current state of a batch job. Implemented by
/// `RemoteBatchStatus` for the real service, and by fakes in tests.
#[async_trait]
pub trait BatchStatusSource: Send + Sync {
    async fn fetch_batch(
        &self,
        batch_id: &str,
    ) -> Result<BatchJob, RemoteServiceError>;
}

/// The marketing service, bound to the context of one upload. Owned, so that
/// it can move into a background task.
pub struct RemoteBatchStatus {
    client: MarketingClient,
    ctx: UploadContext,
}

impl RemoteBatchStatus {
    pub fn new(
        client: MarketingClient,
        ctx: UploadContext,
    ) -> Self {
        Self { client, ctx }
    }
}

#[async_trait]
impl BatchStatusSource for RemoteBatchStatus {
    async fn fetch_batch(
        &self,
        batch_id: &str,
    ) -> Result<BatchJob, RemoteServiceError> {
        self.client.get_batch(batch_id, &self.ctx).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Fixed delay before every status check
    pub interval: Duration,
    /// Give up once more than this much time was spent waiting
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_wait: Duration::from_secs(5 * 60),
        }
    }
}

/// ```text
/// Submitted -> Pending -> FinishedOk
///                      -> FinishedWithErrors
///                      -> Failed
///                      -> TimedOut
/// ```
///
/// The last four are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Pending,
    FinishedOk,
    FinishedWithErrors { errored_operations: u64 },
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Submitted | PollState::Pending)
    }
}

/// A batch that the service reports as finished. Any errored operation at
/// all makes it `WithErrors`; there is no per-address breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Ok(BatchJob),
    WithErrors {
        job: BatchJob,
        errored_operations: u64,
    },
}

#[derive(thiserror::Error)]
pub enum PollError {
    #[error("Batch still running after waiting {}s", .waited.as_secs())]
    Timeout { waited: Duration },
    #[error("Batch status check failed")]
    Transport(#[source] RemoteServiceError),
    #[error("Polling was cancelled")]
    Cancelled,
}

impl Debug for PollError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Follows a submitted batch job until the service reports it finished, a
/// status check fails, or `max_wait` is exceeded.
///
/// The timeout is only checked at poll boundaries, so the batch may be
/// followed for up to one `interval` longer than `max_wait`.
pub struct BatchPoller<S> {
    source: S,
    settings: PollSettings,
    cancel: CancellationToken,
    job: BatchJob,
    state: PollState,
    waited: Duration,
    failure: Option<RemoteServiceError>,
}

impl<S: BatchStatusSource> BatchPoller<S> {
    /// `job` is the snapshot returned on submission
    pub fn new(
        source: S,
        job: BatchJob,
        settings: PollSettings,
    ) -> Self {
        Self {
            source,
            settings,
            cancel: CancellationToken::new(),
            job,
            state: PollState::Submitted,
            waited: Duration::ZERO,
            failure: None,
        }
    }

    pub fn with_cancellation(
        mut self,
        cancel: CancellationToken,
    ) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> &PollState { &self.state }

    pub fn job(&self) -> &BatchJob { &self.job }

    /// Sum of the intervals waited so far
    pub fn waited(&self) -> Duration { self.waited }

    /// Advance by at most one transition. No-op once terminal or cancelled.
    pub async fn step(&mut self) -> &PollState {
        if self.state.is_terminal() || self.cancel.is_cancelled() {
            return &self.state;
        }

        if self.job.is_finished() {
            self.state = match self.job.errored_operations {
                0 => PollState::FinishedOk,
                n => PollState::FinishedWithErrors {
                    errored_operations: n,
                },
            };
            return &self.state;
        }

        if self.waited > self.settings.max_wait {
            self.state = PollState::TimedOut;
            return &self.state;
        }

        let cancelled = tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(self.settings.interval) => false,
        };
        if cancelled {
            return &self.state;
        }
        self.waited += self.settings.interval;

        match self.source.fetch_batch(&self.job.id).await {
            Ok(job) => {
                tracing::debug!(
                    batch_id = %job.id,
                    status = ?job.status,
                    finished_operations = job.finished_operations,
                    total_operations = job.total_operations,
                    "batch status"
                );
                self.job = job;
                self.state = PollState::Pending;
            }
            Err(e) => {
                self.failure = Some(e);
                self.state = PollState::Failed;
            }
        }
        &self.state
    }

    /// Step until terminal, or until `cancel` fires
    pub async fn run(mut self) -> Result<BatchOutcome, PollError> {
        while !self.step().await.is_terminal() {
            if self.cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
        }
        match self.state {
            PollState::FinishedOk => Ok(BatchOutcome::Ok(self.job)),
            PollState::FinishedWithErrors { errored_operations } => Ok(BatchOutcome::WithErrors {
                job: self.job,
                errored_operations,
            }),
            PollState::TimedOut => Err(PollError::Timeout {
                waited: self.waited,
            }),
            // `failure` is always set alongside `Failed`
            PollState::Failed | PollState::Submitted | PollState::Pending => match self.failure {
                Some(e) => Err(PollError::Transport(e)),
                None => Err(PollError::Cancelled),
            },
        }
    }
}
