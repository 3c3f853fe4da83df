//! `SeaORM` Entity for application users

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique, column_type = "Text")]
    pub username: String,
    #[sea_orm(unique, column_type = "Text")]
    pub email: String,
    /// bcrypt hash; absent for accounts created through federated login
    #[sea_orm(column_type = "Text", nullable)]
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Firebase uid of a federated account
    #[sea_orm(unique, column_type = "Text", nullable)]
    pub firebase_uid: Option<String>,
    pub credits: i32,
    #[sea_orm(nullable)]
    pub subscription_expires_at: Option<DateTime>,
    pub is_admin: bool,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase::Entity")]
    Purchase,
    #[sea_orm(has_many = "super::grading::Entity")]
    Grading,
}

impl Related<super::purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchase.def()
    }
}

impl Related<super::grading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Grading.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
