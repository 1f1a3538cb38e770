//! REST API layer: route handlers, DTOs, OpenAPI, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` and the API
//! document live at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs())
}

#[cfg(feature = "swagger-ui")]
fn docs() -> Router<AppState> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(
        SwaggerUi::new("/swagger-ui").url(openapi::OPENAPI_JSON_PATH, openapi::ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn docs() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;
    use utoipa::OpenApi;

    Router::new().route(
        openapi::OPENAPI_JSON_PATH,
        get(|| async { Json(openapi::ApiDoc::openapi()) }),
    )
}
