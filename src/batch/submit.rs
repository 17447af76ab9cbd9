use chrono::DateTime;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::domain::Subscriber;
use crate::marketing_client::MarketingClient;
use crate::marketing_client::RemoteCall;
use crate::marketing_client::RemoteServiceError;
use crate::marketing_client::UploadContext;
use crate::upload::UploadError;

/// Remote state of a batch job. Anything but `Finished` means "keep waiting".
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Preprocessing,
    Started,
    Finalizing,
    Finished,
    #[serde(other)]
    Unknown,
}

/// Snapshot of a batch job, as last reported by the service. Never mutated
/// locally; a newer snapshot replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub total_operations: u64,
    #[serde(default)]
    pub finished_operations: u64,
    #[serde(default)]
    pub errored_operations: u64,
}

impl BatchJob {
    pub fn is_finished(&self) -> bool { self.status == BatchStatus::Finished }
}

/// One queued API call inside a batch. `body` is itself JSON, encoded as a
/// string.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOperation {
    pub method: &'static str,
    pub path: String,
    pub operation_id: String,
    pub body: String,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    operations: &'a [BatchOperation],
}

/// One `POST /lists/{list_id}/members` per subscriber. Operation ids are
/// `<submission millis>-<1-based position>`, unique within the batch.
pub fn build_operations(
    list_id: &str,
    subscribers: &[Subscriber],
    submitted_at: DateTime<Utc>,
) -> Vec<BatchOperation> {
    let stamp = submitted_at.timestamp_millis();
    subscribers
        .iter()
        .enumerate()
        .map(|(i, sub)| BatchOperation {
            method: "POST",
            path: format!("/lists/{list_id}/members"),
            operation_id: format!("{stamp}-{}", i + 1),
            body: member_body(sub).to_string(),
        })
        .collect()
}

fn member_body(sub: &Subscriber) -> Value {
    // FNAME and LNAME exist on every new list, GENDER only after full
    // provisioning. absent values are left out rather than sent as null
    let mut merge_fields = Map::new();
    for (tag, value) in [
        ("FNAME", &sub.first_name),
        ("LNAME", &sub.last_name),
        ("GENDER", &sub.gender),
    ] {
        if let Some(value) = value {
            merge_fields.insert(tag.to_string(), Value::String(value.clone()));
        }
    }
    serde_json::json!({
        "status": "subscribed",
        "email_address": sub.email.as_ref(),
        "merge_fields": merge_fields,
    })
}

impl MarketingClient {
    /// Queue one subscribe operation per subscriber in a single `POST
    /// /batches`. The returned job has only been accepted; failures of
    /// individual operations are only visible by polling it.
    #[tracing::instrument(
        name = "Submitting batch",
        skip(self, subscribers, ctx),
        fields(subscribers = subscribers.len())
    )]
    pub async fn submit_batch(
        &self,
        list_id: &str,
        subscribers: &[Subscriber],
        ctx: &UploadContext,
    ) -> Result<BatchJob, UploadError> {
        if subscribers.is_empty() {
            return Err(UploadError::InvalidArgument(
                "No subscribers given".to_string(),
            ));
        }
        let operations = build_operations(list_id, subscribers, Utc::now());
        let job: BatchJob = self
            .send(
                ctx,
                RemoteCall::SubmitBatch,
                Method::POST,
                "/batches",
                Some(&BatchRequest {
                    operations: &operations,
                }),
            )
            .await?;
        tracing::info!(batch_id = %job.id, status = ?job.status, "batch accepted");
        Ok(job)
    }

    /// `GET /batches/{id}`
    #[tracing::instrument(name = "Fetching batch status", skip(self, ctx))]
    pub async fn get_batch(
        &self,
        batch_id: &str,
        ctx: &UploadContext,
    ) -> Result<BatchJob, RemoteServiceError> {
        self.send::<(), _>(
            ctx,
            RemoteCall::GetBatch,
            Method::GET,
            &format!("/batches/{batch_id}"),
            None,
        )
        .await
    }
}
