//! tube-dl server binary
//!
//! Configuration comes from the JSON file named by `TUBE_DL_CONFIG` (if set),
//! then `API_KEY`, `PORT`, `BIND_ADDRESS`, `DOWNLOAD_DIR` and `YTDLP_PATH`
//! override individual settings. Logging follows `RUST_LOG`.

use std::sync::Arc;
use tube_dl::{Config, JobOrchestrator, YtDlpExtractor, run_with_shutdown};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tube_dl=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "tube-dl exited with an error");
        eprintln!("tube-dl: {e}");
        std::process::exit(1);
    }
}

async fn run() -> tube_dl::Result<()> {
    let config = load_config()?;

    let extractor = YtDlpExtractor::from_config(&config.extractor)?;
    tracing::info!(binary = %extractor.binary_path().display(), "Using yt-dlp");

    if config.server.api.api_key.is_none() {
        tracing::warn!("No API key configured; /song and /video are open to anyone");
    }

    let orchestrator = JobOrchestrator::new(config, Arc::new(extractor)).await?;
    let _retention = orchestrator.spawn_retention_task();
    let server = orchestrator.spawn_api_server();

    tokio::select! {
        result = server => {
            // The server only returns on failure
            let outcome = match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(tube_dl::Error::ApiServerError(e.to_string())),
            };
            orchestrator.shutdown().await?;
            outcome
        }
        result = run_with_shutdown(orchestrator.clone()) => result,
    }
}

fn load_config() -> tube_dl::Result<Config> {
    let mut config = match std::env::var_os("TUBE_DL_CONFIG") {
        Some(path) => {
            tracing::info!(path = %path.to_string_lossy(), "Loading configuration file");
            Config::from_json_file(path)?
        }
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}
