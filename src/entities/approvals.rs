use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only record of a moderation decision on one resource row.
/// `resource_id` carries no foreign key so the record survives the row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approvals")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub resource_id: String,
    pub reviewer_id: String,
    pub decision: String, // approved | rejected
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profiles::Entity",
        from = "Column::ReviewerId",
        to = "super::profiles::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Reviewer,
}

impl ActiveModelBehavior for ActiveModel {}
