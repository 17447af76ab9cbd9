use reqwest::Method;
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde::Serialize;

use crate::configuration::CampaignDefaults;
use crate::configuration::ListContact;
use crate::domain::ListName;
use crate::marketing_client::MarketingClient;
use crate::marketing_client::RemoteCall;
use crate::marketing_client::RemoteServiceError;
use crate::marketing_client::UploadContext;

/// How much is set up on a new list before subscribers are added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioning {
    /// Bare list
    #[default]
    Minimal,
    /// `GENDER` merge field plus an unsubscribe webhook
    Full,
}

/// A list created for a single upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDescriptor {
    pub id: String,
    pub name: ListName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFieldType {
    Text,
    Number,
    Date,
    Phone,
}

#[derive(Serialize)]
struct NewList<'a> {
    name: &'a str,
    contact: &'a ListContact,
    permission_reminder: &'a str,
    campaign_defaults: &'a CampaignDefaults,
    email_type_option: bool,
}

#[derive(Serialize)]
struct NewMergeField<'a> {
    tag: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    field_type: MergeFieldType,
    public: bool,
}

#[derive(Serialize)]
struct NewWebhook<'a> {
    url: &'a str,
    events: WebhookEvents,
    sources: WebhookSources,
}

#[derive(Serialize)]
struct WebhookEvents {
    subscribe: bool,
    unsubscribe: bool,
    profile: bool,
    cleaned: bool,
    upemail: bool,
    campaign: bool,
}

#[derive(Serialize)]
struct WebhookSources {
    user: bool,
    admin: bool,
    api: bool,
}

/// Only the id is needed from any of the creation responses
#[derive(Deserialize)]
struct Created {
    id: String,
}

impl MarketingClient {
    /// `POST /lists`, with the organisational metadata from `list_defaults`
    #[tracing::instrument(name = "Creating list", skip(self, name, ctx), fields(list_name = %name))]
    pub async fn create_list(
        &self,
        name: &ListName,
        ctx: &UploadContext,
    ) -> Result<ListDescriptor, RemoteServiceError> {
        let defaults = &self.list_defaults;
        let body = NewList {
            name: name.as_ref(),
            contact: &defaults.contact,
            permission_reminder: &defaults.permission_reminder,
            campaign_defaults: &defaults.campaign_defaults,
            email_type_option: false,
        };
        let created: Created = self
            .send(ctx, RemoteCall::CreateList, Method::POST, "/lists", Some(&body))
            .await?;
        tracing::info!(list_id = %created.id, "list created");
        Ok(ListDescriptor {
            id: created.id,
            name: name.clone(),
        })
    }

    /// `POST /lists/{id}/merge-fields`. Not retried; a failure here should
    /// abort the upload, since the batch would populate a missing field.
    #[tracing::instrument(name = "Adding merge field", skip(self, ctx))]
    pub async fn add_merge_field(
        &self,
        list_id: &str,
        tag: &str,
        display_name: &str,
        field_type: MergeFieldType,
        is_public: bool,
        ctx: &UploadContext,
    ) -> Result<(), RemoteServiceError> {
        let body = NewMergeField {
            tag,
            name: display_name,
            field_type,
            public: is_public,
        };
        let _: IgnoredAny = self
            .send(
                ctx,
                RemoteCall::AddMergeField,
                Method::POST,
                &format!("/lists/{list_id}/merge-fields"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    /// `POST /lists/{id}/webhooks`, notifying `callback_url` of unsubscribes
    /// only. Returns the webhook id.
    #[tracing::instrument(name = "Adding webhook", skip(self, ctx))]
    pub async fn add_webhook(
        &self,
        list_id: &str,
        callback_url: &str,
        ctx: &UploadContext,
    ) -> Result<String, RemoteServiceError> {
        let body = NewWebhook {
            url: callback_url,
            events: WebhookEvents {
                subscribe: false,
                unsubscribe: true,
                profile: false,
                cleaned: false,
                upemail: false,
                campaign: false,
            },
            sources: WebhookSources {
                user: true,
                admin: true,
                api: true,
            },
        };
        let created: Created = self
            .send(
                ctx,
                RemoteCall::AddWebhook,
                Method::POST,
                &format!("/lists/{list_id}/webhooks"),
                Some(&body),
            )
            .await?;
        Ok(created.id)
    }
}
