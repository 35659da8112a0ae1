//! Vote entity for cast ballots.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Poll this vote belongs to
    #[sea_orm(indexed)]
    pub poll_id: String,

    /// Option the voter chose
    #[sea_orm(indexed)]
    pub option_id: String,

    /// Voter identifier: a user id, or a client-minted anonymous id.
    /// No foreign key so anonymous voters are representable.
    #[sea_orm(indexed)]
    pub voter_id: String,

    /// Voter display name at vote time (denormalized snapshot)
    #[sea_orm(nullable)]
    pub voter_name: Option<String>,

    /// Voter avatar URL at vote time (denormalized snapshot)
    #[sea_orm(nullable)]
    pub voter_avatar_url: Option<String>,

    /// Whether the vote was cast anonymously
    #[sea_orm(default_value = false)]
    pub is_anonymous: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,

    #[sea_orm(
        belongs_to = "super::poll_option::Entity",
        from = "Column::OptionId",
        to = "super::poll_option::Column::Id",
        on_delete = "Cascade"
    )]
    Option,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Option.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
