use axum::{
    Json, Router,
    extract::Path,
    routing::get,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    catalog::{BUNDLES, Bundle, bundle},
    error::ApiError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bundles", get(list_bundles))
        .route("/bundles/{id}", get(get_bundle))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub id: i32,
    pub name: String,
    pub credits: i32,
    /// Price in USD
    pub price: f64,
    pub price_cents: i32,
    pub bonus_credits: i32,
    pub is_popular: bool,
    pub is_subscription: bool,
}

impl From<&Bundle> for BundleInfo {
    fn from(bundle: &Bundle) -> Self {
        Self {
            id: bundle.id,
            name: bundle.name.to_string(),
            credits: bundle.credits,
            price: bundle.price_dollars(),
            price_cents: bundle.price_cents,
            bonus_credits: bundle.bonus_credits,
            is_popular: bundle.is_popular,
            is_subscription: bundle.is_subscription,
        }
    }
}

#[utoipa::path(
    get,
    path = "/bundles",
    tag = "billing",
    responses((status = 200, description = "The bundle catalog", body = Vec<BundleInfo>))
)]
#[tracing::instrument(name = "GET /bundles")]
pub async fn list_bundles() -> Json<Vec<BundleInfo>> {
    Json(BUNDLES.iter().map(BundleInfo::from).collect())
}

#[utoipa::path(
    get,
    path = "/bundles/{id}",
    tag = "billing",
    params(("id" = i32, Path, description = "Bundle id")),
    responses(
        (status = 200, description = "One bundle", body = BundleInfo),
        (status = 404, description = "Bundle not found")
    )
)]
#[tracing::instrument(name = "GET /bundles/{id}")]
pub async fn get_bundle(Path(id): Path<i32>) -> Result<Json<BundleInfo>, ApiError> {
    bundle(id)
        .map(|b| Json(BundleInfo::from(b)))
        .ok_or_else(|| ApiError::not_found("Bundle not found"))
}
