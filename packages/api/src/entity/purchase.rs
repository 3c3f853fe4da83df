//! `SeaORM` Entity for completed bundle purchases

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable record of one bundle acquisition
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub bundle_id: i32,
    /// Price paid in cents
    pub amount: i32,
    #[sea_orm(column_type = "Text")]
    pub status: String,
    /// Stripe payment intent backing this purchase, if paid through Stripe
    #[sea_orm(unique, column_type = "Text", nullable)]
    pub stripe_payment_intent_id: Option<String>,
    pub date: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
