//! Upload a set of subscribers into a newly created mailing list on the
//! marketing service, and follow the resulting batch job until it finishes.
//!
//! ```text
//! create list -> (merge field, webhook) -> submit batch -> poll batch status
//! ```
//!
//! The entry point is `upload::UploadOrchestrator`; `startup` exposes it over
//! HTTP.

pub mod batch;
pub mod configuration;
pub mod domain;
pub mod marketing_client;
pub mod provisioning;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod upload;
pub mod utils;
