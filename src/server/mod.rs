mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;
pub use self::types::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::search_handler,
        api::health_handler,
        api::add_records_handler,
        api::rebuild_handler,
        api::persist_handler,
    ),
    components(schemas(
        SearchRequest,
        SearchReply,
        DemographicContext,
        AddRecordsRequest,
        AddRecordsReply,
        crate::searcher::SearchResult,
        crate::scoring::Weights,
        crate::db::NewRecord,
        crate::index::IndexHealth,
        crate::index::IndexMetadata,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", post(api::search_handler))
        .route("/health", get(api::health_handler))
        .route("/records", post(api::add_records_handler))
        .route("/rebuild", post(api::rebuild_handler))
        .route("/persist", post(api::persist_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 请求体限制：64M
        .layer(RequestBodyLimitLayer::new(64 * 1024 * 1024))
        .with_state(state)
}
