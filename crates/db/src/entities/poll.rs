//! Poll entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// User who created the poll
    #[sea_orm(indexed)]
    pub creator_id: String,

    /// Creator display name (denormalized snapshot)
    pub creator_name: String,

    /// Creator avatar URL (denormalized snapshot)
    #[sea_orm(nullable)]
    pub creator_avatar_url: Option<String>,

    /// Whether the poll accepts new votes
    #[sea_orm(default_value = true)]
    pub is_open: bool,

    /// Total vote counter, authoritative for percentage display
    #[sea_orm(default_value = 0)]
    pub total_votes: i32,

    /// Whether a voter may select multiple options
    #[sea_orm(default_value = false)]
    pub allow_multiple: bool,

    /// Whether voting requires an authenticated identity
    #[sea_orm(default_value = false)]
    pub require_login: bool,

    /// Whether non-creators may see the voter list
    #[sea_orm(default_value = true)]
    pub show_voter_list: bool,

    /// Whether a voter may submit again after voting
    #[sea_orm(default_value = false)]
    pub allow_change_vote: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::CreatorId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Creator,

    #[sea_orm(has_many = "super::poll_option::Entity")]
    Options,

    #[sea_orm(has_many = "super::vote::Entity")]
    Votes,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Creator.def()
    }
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Options.def()
    }
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
