use std::fmt::Debug;
use std::fmt::Display;
use std::time::Duration;

use reqwest::Client;
use reqwest::Method;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::configuration::ListDefaults;
use crate::domain::ApiKey;
use crate::utils::error_chain_fmt;

/// The service ignores the basic auth username; only the key matters.
const BASIC_AUTH_USER: &str = "anystring";

/// HTTP client for the marketing service.
///
/// Holds nothing account-specific: the key and the endpoint root derived from
/// it live in an `UploadContext`, which is passed to every call. Cloning is
/// cheap (`reqwest::Client` is an `Arc` internally), so one client is shared
/// by all concurrent uploads.
#[derive(Clone)]
pub struct MarketingClient {
    http_client: Client,
    api_root_template: String,
    pub(crate) list_defaults: ListDefaults,
}

/// Per-upload credential and endpoint root. Derived once, at the start of an
/// upload, and reused for all of its calls.
#[derive(Clone, Debug)]
pub struct UploadContext {
    api_key: ApiKey,
    api_root: String,
}

impl UploadContext {
    pub fn new(
        api_key: ApiKey,
        api_root_template: &str,
    ) -> Self {
        let api_root = api_root_template
            .replace("{dc}", api_key.data_center())
            .trim_end_matches('/')
            .to_string();
        Self { api_key, api_root }
    }

    pub fn api_root(&self) -> &str { &self.api_root }

    pub fn data_center(&self) -> &str { self.api_key.data_center() }
}

/// Remote calls, named for error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    CreateList,
    AddMergeField,
    AddWebhook,
    SubmitBatch,
    GetBatch,
}

impl Display for RemoteCall {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            RemoteCall::CreateList => "create list",
            RemoteCall::AddMergeField => "add merge field",
            RemoteCall::AddWebhook => "add webhook",
            RemoteCall::SubmitBatch => "submit batch",
            RemoteCall::GetBatch => "get batch status",
        };
        f.write_str(name)
    }
}

/// A single remote call failed, either in transport or with a non-200 status.
/// `body` is whatever the service sent back, usually a JSON problem document.
#[derive(thiserror::Error)]
pub struct RemoteServiceError {
    pub call: RemoteCall,
    pub status: Option<StatusCode>,
    pub body: Option<String>,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl RemoteServiceError {
    fn transport(
        call: RemoteCall,
        e: reqwest::Error,
    ) -> Self {
        Self {
            call,
            status: e.status(),
            body: None,
            source: Some(e),
        }
    }

    /// The service answered 200, but not with what `call` expects
    fn undecodable(
        call: RemoteCall,
        status: StatusCode,
        e: reqwest::Error,
    ) -> Self {
        Self {
            call,
            status: Some(status),
            body: None,
            source: Some(e),
        }
    }
}

impl Display for RemoteServiceError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Failed to {}", self.call)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        match &self.body {
            Some(body) if !body.is_empty() => write!(f, ": {body}"),
            _ => Ok(()),
        }
    }
}

impl Debug for RemoteServiceError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl MarketingClient {
    pub fn new(
        api_root_template: String,
        timeout: Duration,
        list_defaults: ListDefaults,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_root_template,
            list_defaults,
        })
    }

    /// Derive the endpoint root for `api_key`. Call once per upload.
    pub fn context(
        &self,
        api_key: ApiKey,
    ) -> UploadContext {
        UploadContext::new(api_key, &self.api_root_template)
    }

    /// Send an authenticated request to `{api_root}{path}`. Anything but 200 is
    /// a failure, as is a body that doesn't decode into `T`.
    pub(crate) async fn send<B, T>(
        &self,
        ctx: &UploadContext,
        call: RemoteCall,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, RemoteServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", ctx.api_root);
        let mut request = self
            .http_client
            .request(method, &url)
            .basic_auth(BASIC_AUTH_USER, Some(ctx.api_key.expose_secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteServiceError::transport(call, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.ok();
            return Err(RemoteServiceError {
                call,
                status: Some(status),
                body,
                source: None,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteServiceError::undecodable(call, status, e))
    }
}
