use rmcp::{ServiceExt, transport::stdio};

use attest::config::Config;
use attest::pipeline::Pipeline;
use attest::refresh::spawn_refresher;
use attest::server::AttestServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    // Provider keys may live in a local .env; a missing file is fine.
    dotenvy::dotenv().ok();

    tracing::info!("attest starting");

    let config = Config::from_env();
    let tuning = config.tuning.clone();
    let pipeline = Pipeline::build(&config).await?;

    let refresher = spawn_refresher(pipeline.clone(), tuning);

    let server = AttestServer::new(pipeline);
    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    refresher.abort();
    tracing::info!("attest shutting down");
    Ok(())
}
