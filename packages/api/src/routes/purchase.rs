use std::{collections::HashMap, str::FromStr};

use axum::{
    Extension, Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    catalog::{Bundle, bundle},
    credits::grant_bundle,
    entity::{purchase, user},
    error::ApiError,
    middleware::session::AppUser,
    routes::{ApiJson, FieldErrors, credits::CreditsResponse},
    state::AppState,
};

pub const STATUS_COMPLETED: &str = "completed";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/purchase", post(purchase_bundle))
        .route("/purchases", get(list_purchases))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub bundle_id: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub bundle_id: Option<i32>,
    /// Required when payments are enabled
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub id: i32,
    pub bundle_id: i32,
    /// Amount paid in cents
    pub amount: i32,
    pub status: String,
    pub date: NaiveDateTime,
}

impl From<purchase::Model> for PurchaseResponse {
    fn from(purchase: purchase::Model) -> Self {
        Self {
            id: purchase.id,
            bundle_id: purchase.bundle_id,
            amount: purchase.amount,
            status: purchase.status,
            date: purchase.date,
        }
    }
}

fn requested_bundle(bundle_id: Option<i32>) -> Result<&'static Bundle, ApiError> {
    FieldErrors::default()
        .check(bundle_id.is_some_and(|id| id > 0), "bundleId", "A positive bundle id is required")
        .finish()?;
    bundle_id
        .and_then(bundle)
        .ok_or_else(|| ApiError::not_found("Bundle not found"))
}

#[utoipa::path(
    post,
    path = "/create-payment-intent",
    tag = "billing",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Stripe PaymentIntent created for the bundle price", body = PaymentIntentResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Bundle not found"),
        (status = 503, description = "Payments are not configured")
    )
)]
#[tracing::instrument(name = "POST /create-payment-intent", skip(state, user))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    ApiJson(request): ApiJson<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, ApiError> {
    let user = user.require(&state).await?;
    let bundle = requested_bundle(request.bundle_id)?;
    let stripe_client = state
        .stripe_client
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Payments are not configured"))?;

    let description = format!("CorestoneGrader {}", bundle.name);
    let mut params =
        stripe::CreatePaymentIntent::new(i64::from(bundle.price_cents), stripe::Currency::USD);
    params.description = Some(description.as_str());
    params.metadata = Some(HashMap::from([
        ("user_id".to_string(), user.id.to_string()),
        ("bundle_id".to_string(), bundle.id.to_string()),
    ]));
    params.automatic_payment_methods = Some(stripe::CreatePaymentIntentAutomaticPaymentMethods {
        allow_redirects: None,
        enabled: true,
    });

    let intent = stripe::PaymentIntent::create(stripe_client, params).await?;
    tracing::info!(intent = %intent.id, bundle_id = bundle.id, "Created payment intent");

    let client_secret = intent
        .client_secret
        .ok_or_else(|| ApiError::internal("Payment intent has no client secret"))?;
    Ok(Json(PaymentIntentResponse { client_secret }))
}

#[utoipa::path(
    post,
    path = "/purchase",
    tag = "billing",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Bundle granted", body = CreditsResponse),
        (status = 400, description = "Payment missing, incomplete or not matching the bundle"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Bundle not found"),
        (status = 409, description = "Payment already redeemed")
    )
)]
#[tracing::instrument(name = "POST /purchase", skip(state, user))]
pub async fn purchase_bundle(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    ApiJson(request): ApiJson<PurchaseRequest>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let user = user.require(&state).await?;
    let bundle = requested_bundle(request.bundle_id)?;

    let payment_intent_id = match &state.stripe_client {
        Some(client) => {
            let intent_id = request
                .payment_intent_id
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            FieldErrors::default()
                .check(!intent_id.is_empty(), "paymentIntentId", "A payment intent is required")
                .finish()?;
            verify_payment(&state, client, intent_id, &user, bundle).await?;
            Some(intent_id.to_string())
        }
        None => {
            tracing::warn!(bundle_id = bundle.id, "Payments disabled, granting bundle without payment");
            None
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let user_id = user.id;
    let updated = state
        .db
        .transaction::<_, user::Model, ApiError>(|txn| {
            Box::pin(async move {
                purchase::ActiveModel {
                    user_id: Set(user_id),
                    bundle_id: Set(bundle.id),
                    amount: Set(bundle.price_cents),
                    status: Set(STATUS_COMPLETED.to_string()),
                    stripe_payment_intent_id: Set(payment_intent_id),
                    date: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|e| match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        ApiError::conflict("Payment has already been redeemed")
                    }
                    _ => e.into(),
                })?;

                grant_bundle(txn, user_id, bundle, now).await
            })
        })
        .await?;

    metrics::counter!("purchases_total", "bundle" => bundle.id.to_string()).increment(1);
    tracing::info!(user_id, bundle_id = bundle.id, credits = updated.credits, "Bundle purchased");
    Ok(Json(CreditsResponse::from(&updated)))
}

/// The intent must have succeeded for exactly this bundle and user, and
/// must not have been redeemed before.
async fn verify_payment(
    state: &AppState,
    client: &stripe::Client,
    intent_id: &str,
    user: &user::Model,
    bundle: &Bundle,
) -> Result<(), ApiError> {
    let already_redeemed = purchase::Entity::find()
        .filter(purchase::Column::StripePaymentIntentId.eq(intent_id))
        .one(&state.db)
        .await?
        .is_some();
    if already_redeemed {
        return Err(ApiError::conflict("Payment has already been redeemed"));
    }

    let id = stripe::PaymentIntentId::from_str(intent_id)
        .map_err(|_| ApiError::bad_request("Invalid payment intent id"))?;
    let intent = stripe::PaymentIntent::retrieve(client, &id, &[]).await?;

    if intent.status != stripe::PaymentIntentStatus::Succeeded {
        return Err(ApiError::bad_request("Payment has not completed"));
    }

    let user_id = user.id.to_string();
    let bundle_id = bundle.id.to_string();
    let matches = intent.amount == i64::from(bundle.price_cents)
        && intent.metadata.get("user_id") == Some(&user_id)
        && intent.metadata.get("bundle_id") == Some(&bundle_id);
    if !matches {
        tracing::warn!(intent = %intent.id, "Payment intent does not match the requested bundle");
        return Err(ApiError::bad_request("Payment does not match the selected bundle"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/purchases",
    tag = "billing",
    responses(
        (status = 200, description = "Own purchases, newest first", body = Vec<PurchaseResponse>),
        (status = 401, description = "Not authenticated")
    )
)]
#[tracing::instrument(name = "GET /purchases", skip(state, user))]
pub async fn list_purchases(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
) -> Result<Json<Vec<PurchaseResponse>>, ApiError> {
    let user_id = user.user_id()?;
    let purchases = purchase::Entity::find()
        .filter(purchase::Column::UserId.eq(user_id))
        .order_by_desc(purchase::Column::Date)
        .order_by_desc(purchase::Column::Id)
        .all(&state.db)
        .await?;
    Ok(Json(purchases.into_iter().map(PurchaseResponse::from).collect()))
}
