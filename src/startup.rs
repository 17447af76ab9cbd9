use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::routes::health_check;
use crate::routes::upload;
use crate::upload::UploadOptions;
use crate::upload::UploadOrchestrator;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // port 0 lets the OS pick; tests need to know which one it picked
        let port = listener.local_addr()?.port();

        let orchestrator = build_orchestrator(&cfg)?;
        let defaults = UploadOptions {
            provisioning: cfg.upload.provisioning,
            observe_completion: cfg.upload.observe_completion,
        };

        let server = run(listener, orchestrator, defaults)?;
        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

pub fn build_orchestrator(cfg: &Settings) -> Result<UploadOrchestrator, reqwest::Error> {
    Ok(UploadOrchestrator::new(
        cfg.marketing_api.client(cfg.list_defaults.clone())?,
        cfg.upload.poll_settings(),
        cfg.upload.webhook_url.clone(),
    ))
}

/// Declares all API endpoints. The server only listens on an already bound
/// address.
pub fn run(
    listener: TcpListener,
    orchestrator: UploadOrchestrator,
    defaults: UploadOptions,
) -> Result<Server, anyhow::Error> {
    // `Data` is an `Arc`; every worker gets a clone of the same orchestrator,
    // and with it the same connection pool
    let orchestrator = Data::new(orchestrator);
    let defaults = Data::new(defaults);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/uploads", web::post().to(upload))
            .app_data(orchestrator.clone())
            .app_data(defaults.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
