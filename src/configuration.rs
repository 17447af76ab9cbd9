use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::batch::PollSettings;
use crate::marketing_client::MarketingClient;
use crate::provisioning::Provisioning;

/// Global configuration, loaded from `configuration/*.yaml`. See
/// `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub marketing_api: MarketingApiSettings,
    pub upload: UploadSettings,
    pub list_defaults: ListDefaults,
}

/// Server configuration
#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Should be localhost on dev machine, 0.0.0.0 on prod
    pub host: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct MarketingApiSettings {
    /// Endpoint root, with `{dc}` standing in for the data center of the API
    /// key in use, e.g. `https://{dc}.api.mailchimp.com/3.0`. Tests point this
    /// at a mock server (without placeholder).
    pub api_root_template: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl MarketingApiSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    pub fn client(
        &self,
        list_defaults: ListDefaults,
    ) -> Result<MarketingClient, reqwest::Error> {
        MarketingClient::new(
            self.api_root_template.clone(),
            self.timeout(),
            list_defaults,
        )
    }
}

#[derive(Deserialize, Clone)]
pub struct UploadSettings {
    /// Delay between two batch status checks
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_milliseconds: u64,

    /// Batches still running after this long are reported as timed out
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_poll_seconds: u64,

    /// Default for requests that don't choose a provisioning mode
    pub provisioning: Provisioning,

    /// Whether uploads submitted over HTTP are followed until the batch
    /// finishes
    pub observe_completion: bool,

    /// Receives unsubscribe notifications for lists created with full
    /// provisioning
    pub webhook_url: String,
}

impl UploadSettings {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_milliseconds),
            max_wait: Duration::from_secs(self.max_poll_seconds),
        }
    }
}

/// Organisational metadata attached to every created list. The marketing
/// service refuses to create lists without a contact block.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ListDefaults {
    pub contact: ListContact,
    pub permission_reminder: String,
    pub campaign_defaults: CampaignDefaults,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ListContact {
    pub company: String,
    pub address1: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CampaignDefaults {
    pub from_name: String,
    pub from_email: String,
    pub subject: String,
    pub language: String,
}

pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("{e} is not a supported environment; use `local` or `production`")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`, then
/// apply `APP_`-prefixed env vars on top.
///
/// All fields must be present, otherwise initialisation fails immediately and
/// the server does not start.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = current_dir()
        .map_err(|e| ConfigError::Foreign(Box::new(e)))?
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".to_string())
        .try_into()
        .map_err(ConfigError::Message)?;

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        // env vars are always strings, hence `serde-aux` for the numeric fields:
        //
        // `APP_UPLOAD__POLL_INTERVAL_MILLISECONDS=500` -> `Settings.upload.poll_interval_milliseconds`
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
