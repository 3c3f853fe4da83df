use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use middleware::{error_reporting::error_reporting_middleware, session::session_middleware};
use state::State;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, decompression::RequestDecompressionLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

pub mod catalog;
pub mod config;
pub mod credits;
pub mod entity;
pub mod error;
pub mod export;
pub mod grading;
pub mod mail;
mod middleware;
pub mod openapi;
mod routes;
pub mod schema;
pub mod session;
pub mod state;
pub mod upload;

pub use axum;
pub use sea_orm;

pub fn construct_router(state: Arc<State>) -> Router {
    let router = routes::routes()
        .route("/openapi.json", get(openapi_json))
        .with_state(state.clone())
        .layer(from_fn(error_reporting_middleware))
        .layer(from_fn_with_state(state, session_middleware))
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        );

    Router::new().nest("/api", router)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}
