use std::fmt::Debug;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::batch::BatchJob;
use crate::batch::BatchOutcome;
use crate::batch::BatchPoller;
use crate::batch::PollError;
use crate::batch::PollSettings;
use crate::batch::RemoteBatchStatus;
use crate::domain::ApiKey;
use crate::domain::ListName;
use crate::domain::Subscriber;
use crate::marketing_client::MarketingClient;
use crate::marketing_client::RemoteServiceError;
use crate::provisioning::ListDescriptor;
use crate::provisioning::MergeFieldType;
use crate::provisioning::Provisioning;
use crate::utils::error_chain_fmt;

/// Raised before the batch is accepted. Nothing was submitted (though a list
/// may already have been created); the whole upload can be retried.
#[derive(thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    RemoteService(#[from] RemoteServiceError),
}

impl Debug for UploadError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

pub struct UploadRequest {
    /// Generated from today's date if absent
    pub list_name: Option<String>,
    pub subscribers: Vec<Subscriber>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    pub provisioning: Provisioning,
    /// Follow the batch until it finishes, see `CompletionHandle`
    pub observe_completion: bool,
}

/// First signal: the batch was accepted by the service
#[derive(Debug, Clone)]
pub struct SubmissionAccepted {
    pub list: ListDescriptor,
    pub batch: BatchJob,
}

/// Second signal: the eventual outcome of an accepted batch. Only exists if
/// completion was observed.
#[derive(Debug)]
pub struct CompletionHandle {
    outcome: oneshot::Receiver<Result<BatchOutcome, PollError>>,
    cancel: CancellationToken,
}

impl CompletionHandle {
    /// Stop following the batch. The batch itself keeps running remotely, and
    /// `outcome` resolves to `None`.
    pub fn cancel(&self) { self.cancel.cancel() }

    /// `None` if polling was cancelled, or the runtime shut down first
    pub async fn outcome(self) -> Option<Result<BatchOutcome, PollError>> { self.outcome.await.ok() }
}

#[derive(Debug)]
pub struct Submission {
    pub accepted: SubmissionAccepted,
    pub completion: Option<CompletionHandle>,
}

/// create list -> (merge field, webhook) -> submit batch -> (poll)
///
/// Holds no per-upload state: the credential and its endpoint root are
/// derived at the start of `upload` and passed down, so one orchestrator can
/// serve any number of concurrent uploads.
#[derive(Clone)]
pub struct UploadOrchestrator {
    client: MarketingClient,
    poll_settings: PollSettings,
    webhook_url: String,
}

impl UploadOrchestrator {
    pub fn new(
        client: MarketingClient,
        poll_settings: PollSettings,
        webhook_url: String,
    ) -> Self {
        Self {
            client,
            poll_settings,
            webhook_url,
        }
    }

    /// Returns as soon as the batch is accepted. If `observe_completion` is
    /// set, polling continues in a background task whose result is delivered
    /// through `Submission.completion`.
    ///
    /// Every step must succeed for the next to run; there are no retries.
    #[tracing::instrument(
        name = "Uploading subscribers to new list",
        skip(self, request, api_key),
        fields(
            subscribers = request.subscribers.len(),
            data_center = %api_key.data_center(),
            list_id = tracing::field::Empty,
            batch_id = tracing::field::Empty,
        )
    )]
    pub async fn upload(
        &self,
        request: UploadRequest,
        api_key: ApiKey,
        options: UploadOptions,
    ) -> Result<Submission, UploadError> {
        if request.subscribers.is_empty() {
            return Err(UploadError::InvalidArgument(
                "No subscribers given".to_string(),
            ));
        }
        let name = ListName::or_today(request.list_name).map_err(UploadError::InvalidArgument)?;

        let ctx = self.client.context(api_key);

        let list = self.client.create_list(&name, &ctx).await?;
        tracing::Span::current().record("list_id", tracing::field::display(&list.id));

        if options.provisioning == Provisioning::Full {
            // FNAME and LNAME come with every new list
            self.client
                .add_merge_field(&list.id, "GENDER", "Gender", MergeFieldType::Text, true, &ctx)
                .await?;
            self.client
                .add_webhook(&list.id, &self.webhook_url, &ctx)
                .await?;
        }

        let batch = self
            .client
            .submit_batch(&list.id, &request.subscribers, &ctx)
            .await?;
        tracing::Span::current().record("batch_id", tracing::field::display(&batch.id));

        let completion = options.observe_completion.then(|| {
            let cancel = CancellationToken::new();
            let (tx, rx) = oneshot::channel();
            let poller = BatchPoller::new(
                RemoteBatchStatus::new(self.client.clone(), ctx),
                batch.clone(),
                self.poll_settings,
            )
            .with_cancellation(cancel.clone());

            tokio::spawn(
                async move {
                    match poller.run().await {
                        Err(PollError::Cancelled) => {
                            tracing::info!("stopped following batch");
                        }
                        outcome => {
                            // receiver may have been dropped; the outcome is logged either way
                            log_outcome(&outcome);
                            let _ = tx.send(outcome);
                        }
                    }
                }
                .in_current_span(),
            );
            CompletionHandle {
                outcome: rx,
                cancel,
            }
        });

        Ok(Submission {
            accepted: SubmissionAccepted { list, batch },
            completion,
        })
    }
}

fn log_outcome(outcome: &Result<BatchOutcome, PollError>) {
    match outcome {
        Ok(BatchOutcome::Ok(job)) => {
            tracing::info!(total_operations = job.total_operations, "batch finished")
        }
        Ok(BatchOutcome::WithErrors {
            errored_operations, ..
        }) => {
            tracing::warn!(
                errored_operations,
                "batch finished with errors for {errored_operations} email addresses"
            )
        }
        Err(e) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "batch did not finish"
        ),
    }
}
