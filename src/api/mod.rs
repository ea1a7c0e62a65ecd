//! REST API server module
//!
//! A thin HTTP facade over [`JobOrchestrator`]: routes map to orchestrator
//! calls, the API key gate guards the extraction routes, and errors are
//! rendered as JSON through [`ToHttpStatus`](crate::error::ToHttpStatus).

use crate::{Config, JobOrchestrator, Result};
use axum::{Router, http::HeaderValue, middleware, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Media (API key required when configured)
/// - `GET /song/:video_id` - Request audio extraction
/// - `GET /video/:video_id` - Request video extraction
///
/// ## Media (open)
/// - `GET /status/:video_id` - Poll a job (`?kind=audio|video`)
/// - `GET /download/:filename` - Stream a completed artifact
///
/// ## System
/// - `GET /` - Service index
/// - `GET /health` - Health check
/// - `GET /jobs` - All job snapshots
/// - `GET /events` - Server-sent events stream
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(orchestrator: Arc<JobOrchestrator>, config: Arc<Config>) -> Router {
    let state = AppState::new(orchestrator, config.clone());

    // The key gate only covers the routes that start work
    let gated = Router::new()
        .route("/song/:video_id", get(routes::request_song))
        .route("/video/:video_id", get(routes::request_video))
        .route_layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ));

    let router = Router::new()
        .merge(gated)
        .route("/status/:video_id", get(routes::get_status))
        .route("/download/:filename", get(routes::download_file))
        .route("/", get(routes::index))
        .route("/health", get(routes::health_check))
        .route("/jobs", get(routes::list_jobs))
        .route("/events", get(routes::event_stream))
        .route("/openapi.json", get(routes::openapi_spec));

    // SwaggerUi reuses the /openapi.json endpoint defined above
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        router.layer(build_cors_layer(&config.server.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. Methods and headers are unrestricted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use tube_dl::{Config, JobOrchestrator, YtDlpExtractor};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let extractor = Arc::new(YtDlpExtractor::from_config(&config.extractor)?);
/// let orchestrator = Arc::new(JobOrchestrator::new(config.clone(), extractor).await?);
///
/// // Start API server (blocks until shutdown)
/// tube_dl::api::start_api_server(orchestrator, Arc::new(config)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    orchestrator: Arc<JobOrchestrator>,
    config: Arc<Config>,
) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(orchestrator, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
