use list_uploader::configuration::get_configuration;
use list_uploader::startup::Application;
use list_uploader::telemetry::get_subscriber;
use list_uploader::telemetry::init_subscriber;

/// Initialise telemetry, load config, and start the server
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("list-uploader", "info", std::io::stdout);
    init_subscriber(subscriber)?;

    let cfg = get_configuration()?;

    // in-flight batches are only followed while the process lives; they keep
    // running remotely if it stops
    let app = Application::build(cfg).await?;
    tracing::info!(port = app.get_port(), "listening");
    app.run_until_stopped().await?;
    Ok(())
}
