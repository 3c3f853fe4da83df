//! `SeaORM` Entity for stored essay gradings

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Criterion name to numeric score, in the order the grader returned them.
pub type Scores = serde_json::Map<String, serde_json::Value>;

/// One essay submission and the assessment it received. Never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gradings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(column_type = "Text")]
    pub essay_text: String,
    pub rubric_id: i32,
    /// JSON object, see [`Scores`]
    #[sea_orm(column_type = "Text")]
    pub scores: String,
    #[sea_orm(column_type = "Text")]
    pub feedback: String,
    /// JSON array of strings
    #[sea_orm(column_type = "Text")]
    pub recommendations: String,
    pub date: DateTime,
}

impl Model {
    pub fn parsed_scores(&self) -> Result<Scores, serde_json::Error> {
        serde_json::from_str(&self.scores)
    }

    pub fn parsed_recommendations(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.recommendations)
    }
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
