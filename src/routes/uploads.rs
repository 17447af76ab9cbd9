use actix_web::http::StatusCode;
use actix_web::web;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use secrecy::Secret;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::ApiKey;
use crate::domain::Subscriber;
use crate::domain::SubscriberEmail;
use crate::provisioning::Provisioning;
use crate::upload::UploadError;
use crate::upload::UploadOptions;
use crate::upload::UploadOrchestrator;
use crate::upload::UploadRequest;

/// Body of `POST /uploads`; `subscribers` is whatever the record query
/// returned.
#[derive(Deserialize)]
pub struct UploadBody {
    api_key: Secret<String>,
    list_name: Option<String>,
    subscribers: Vec<SubscriberData>,
    /// Falls back to `upload.provisioning` in the config
    provisioning: Option<Provisioning>,
}

#[derive(Deserialize)]
pub struct SubscriberData {
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    gender: Option<String>,
}

impl TryFrom<SubscriberData> for Subscriber {
    type Error = String;
    fn try_from(value: SubscriberData) -> Result<Self, Self::Error> {
        // blank optional values are as good as absent
        let non_blank = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        Ok(Subscriber {
            email: SubscriberEmail::parse(value.email)?,
            first_name: non_blank(value.first_name),
            last_name: non_blank(value.last_name),
            gender: non_blank(value.gender),
        })
    }
}

#[derive(Serialize)]
struct UploadAccepted {
    list_id: String,
    list_name: String,
    batch_id: String,
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            UploadError::RemoteService(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

/// `POST /uploads`
///
/// Creates a list and submits its subscribers in a single batch, answering
/// once the batch is accepted. Whether the batch then finishes (or how many
/// addresses the service rejected) only shows up in the logs, and only when
/// `upload.observe_completion` is on.
///
/// # Request example
///
/// ```sh
///     curl -H 'Content-Type: application/json' \
///         --data '{"api_key":"...-us19","subscribers":[{"email":"a@x.com"}]}' \
///         http://127.0.0.1:8000/uploads
/// ```
#[tracing::instrument(
    name = "Handling upload request",
    skip(body, orchestrator, defaults),
    fields(
        list_name = ?body.list_name,
        subscribers = body.subscribers.len(),
    )
)]
pub async fn upload(
    body: web::Json<UploadBody>,
    orchestrator: web::Data<UploadOrchestrator>,
    defaults: web::Data<UploadOptions>,
) -> Result<HttpResponse, UploadError> {
    let body = body.into_inner();

    let api_key = ApiKey::parse(body.api_key).map_err(UploadError::InvalidArgument)?;
    let subscribers = body
        .subscribers
        .into_iter()
        .map(Subscriber::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(UploadError::InvalidArgument)?;
    let options = UploadOptions {
        provisioning: body.provisioning.unwrap_or(defaults.provisioning),
        observe_completion: defaults.observe_completion,
    };

    let submission = orchestrator
        .upload(
            UploadRequest {
                list_name: body.list_name,
                subscribers,
            },
            api_key,
            options,
        )
        .await?;

    // nobody is waiting on the outcome here; the background task logs it
    drop(submission.completion);

    let accepted = submission.accepted;
    Ok(HttpResponse::Ok().json(UploadAccepted {
        list_id: accepted.list.id,
        list_name: accepted.list.name.to_string(),
        batch_id: accepted.batch.id,
    }))
}
