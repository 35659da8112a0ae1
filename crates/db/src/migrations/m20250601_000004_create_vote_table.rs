//! Create vote table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Vote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Vote::PollId).string_len(32).not_null())
                    .col(ColumnDef::new(Vote::OptionId).string_len(32).not_null())
                    // No FK: voter_id may be an anonymous id with no user row
                    .col(ColumnDef::new(Vote::VoterId).string_len(64).not_null())
                    .col(ColumnDef::new(Vote::VoterName).string_len(256))
                    .col(ColumnDef::new(Vote::VoterAvatarUrl).string_len(1024))
                    .col(
                        ColumnDef::new(Vote::IsAnonymous)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_poll")
                            .from(Vote::Table, Vote::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_option")
                            .from(Vote::Table, Vote::OptionId)
                            .to(PollOption::Table, PollOption::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: poll_id (for listing a poll's votes)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_poll_id")
                    .table(Vote::Table)
                    .col(Vote::PollId)
                    .to_owned(),
            )
            .await?;

        // Index: option_id (for per-option tallies)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_option_id")
                    .table(Vote::Table)
                    .col(Vote::OptionId)
                    .to_owned(),
            )
            .await?;

        // Index: (poll_id, voter_id) - the "have I voted" lookup.
        // Deliberately NOT unique: single-vote enforcement is a best-effort
        // pre-check, and allow_change_vote polls append additional ballots.
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_poll_voter")
                    .table(Vote::Table)
                    .col(Vote::PollId)
                    .col(Vote::VoterId)
                    .to_owned(),
            )
            .await?;

        // Index: created_at (for the recent voters feed)
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_created_at")
                    .table(Vote::Table)
                    .col(Vote::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
    PollId,
    OptionId,
    VoterId,
    VoterName,
    VoterAvatarUrl,
    IsAnonymous,
    CreatedAt,
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
}

#[derive(Iden)]
enum PollOption {
    Table,
    Id,
}
