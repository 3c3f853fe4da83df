//! Credit and subscription gate.
//!
//! Every balance change is a single conditional `UPDATE ... RETURNING`, so
//! concurrent requests from the same user cannot spend one credit twice or
//! push the balance below zero. Subscription renewals lock the user row
//! (`SELECT ... FOR UPDATE`) so concurrent renewals stack.

use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QuerySelect, sea_query::Expr,
};

use crate::{
    catalog::{Bundle, SUBSCRIPTION_DAYS},
    entity::user,
    error::ApiError,
};

/// Free credits granted to every new account.
pub const SIGNUP_CREDITS: i32 = 1;

/// How a grading request was paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Covered by an active subscription; the balance was not touched.
    Subscription,
    /// One credit was debited, leaving `remaining`.
    Credit { remaining: i32 },
}

pub fn has_active_subscription(user: &user::Model, now: NaiveDateTime) -> bool {
    user.subscription_expires_at
        .is_some_and(|expires_at| now < expires_at)
}

/// Allows a grading if the user has an active subscription or at least one
/// credit. Without a subscription one credit is debited before returning.
#[tracing::instrument(name = "credits::authorize_grading", skip(db, user), fields(user_id = user.id))]
pub async fn authorize_grading<C: ConnectionTrait>(
    db: &C,
    user: &user::Model,
    now: NaiveDateTime,
) -> Result<Charge, ApiError> {
    if has_active_subscription(user, now) {
        tracing::debug!("Subscription active, no credit charged");
        return Ok(Charge::Subscription);
    }

    let updated = user::Entity::update_many()
        .col_expr(
            user::Column::Credits,
            Expr::col(user::Column::Credits).sub(1),
        )
        .filter(user::Column::Id.eq(user.id))
        .filter(user::Column::Credits.gte(1))
        .exec_with_returning(db)
        .await?;

    match updated.into_iter().next() {
        Some(row) => {
            metrics::counter!("credits_consumed_total").increment(1);
            tracing::info!(remaining = row.credits, "Debited one credit");
            Ok(Charge::Credit {
                remaining: row.credits,
            })
        }
        None => Err(ApiError::payment_required("Insufficient credits")),
    }
}

/// Returns the credit taken by [`authorize_grading`] when the grading could
/// not be completed.
pub async fn refund<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    charge: Charge,
) -> Result<(), ApiError> {
    if let Charge::Credit { .. } = charge {
        add_credits(db, user_id, 1).await?;
        metrics::counter!("credits_refunded_total").increment(1);
        tracing::info!(user_id, "Refunded one credit after failed grading");
    }
    Ok(())
}

/// Applies a purchased bundle to the user's account and returns the
/// updated row. Must run inside a transaction: the subscription branch holds
/// a row lock on the user between reading and extending the expiry.
#[tracing::instrument(name = "credits::grant_bundle", skip(db), fields(bundle_id = bundle.id))]
pub async fn grant_bundle<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    bundle: &Bundle,
    now: NaiveDateTime,
) -> Result<user::Model, ApiError> {
    if !bundle.is_subscription {
        return add_credits(db, user_id, bundle.total_credits()).await;
    }

    let current = user::Entity::find_by_id(user_id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let expires_at = extend_subscription(current.subscription_expires_at, now);

    let mut active: user::ActiveModel = current.into();
    active.subscription_expires_at = Set(Some(expires_at));
    let updated = active.update(db).await?;
    tracing::info!(%expires_at, "Subscription extended");
    Ok(updated)
}

/// A renewal stacks on top of an expiry that is still in the future.
pub fn extend_subscription(
    current: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> NaiveDateTime {
    let start = current.filter(|expires| *expires > now).unwrap_or(now);
    start + Duration::days(SUBSCRIPTION_DAYS)
}

async fn add_credits<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    amount: i32,
) -> Result<user::Model, ApiError> {
    let updated = user::Entity::update_many()
        .col_expr(
            user::Column::Credits,
            Expr::col(user::Column::Credits).add(amount),
        )
        .filter(user::Column::Id.eq(user_id))
        .exec_with_returning(db)
        .await?;

    updated
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("User not found"))
}
