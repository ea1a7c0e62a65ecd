//! OpenAPI documentation and schema generation
//!
//! The tube-dl REST API described with utoipa at compile time.

use utoipa::OpenApi;

/// OpenAPI documentation for the tube-dl REST API
///
/// Served at:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation (if enabled)
#[derive(OpenApi)]
#[openapi(
    info(
        title = "tube-dl REST API",
        version = "0.1.0",
        description = "Request audio or video extraction of YouTube videos, poll job status and download the resulting files",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        // Media jobs
        crate::api::routes::request_song,
        crate::api::routes::request_video,
        crate::api::routes::get_status,
        crate::api::routes::download_file,

        // System
        crate::api::routes::index,
        crate::api::routes::health_check,
        crate::api::routes::list_jobs,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types
        crate::key::MediaKind,
        crate::key::JobKey,
        crate::types::JobState,
        crate::types::FailureKind,
        crate::types::JobFailure,
        crate::types::AttemptRecord,
        crate::types::JobStatus,
        crate::types::SweepReport,
        crate::store::ArtifactHandle,

        // API request/response types
        crate::api::routes::JobResponse,
        crate::api::routes::StatusQuery,

        // Error types
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "media", description = "Media jobs - Request extraction, poll status, download files"),
        (name = "system", description = "System endpoints - Index, health, jobs, OpenAPI spec, events"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `api` query parameter as the API key scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Query(
                        utoipa::openapi::security::ApiKeyValue::new("api"),
                    ),
                ),
            );
            components.add_security_scheme(
                "api_key_header",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
