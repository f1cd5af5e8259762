//! Outbox messages and the saga hazard log.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum OutboxMessages {
    Table,
    Id,
    AggregateId,
    EventType,
    Payload,
    Published,
    RetryCount,
    MaxRetries,
    LastError,
    CreatedAt,
    PublishedAt,
}

#[derive(Iden)]
enum SagaHazards {
    Table,
    Id,
    Operation,
    AggregateId,
    WalletMutations,
    Cause,
    CreatedAt,
    ResolvedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxMessages::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::AggregateId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxMessages::EventType).string().not_null())
                    .col(ColumnDef::new(OutboxMessages::Payload).binary().not_null())
                    .col(
                        ColumnDef::new(OutboxMessages::Published)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OutboxMessages::MaxRetries)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(ColumnDef::new(OutboxMessages::LastError).string())
                    .col(
                        ColumnDef::new(OutboxMessages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxMessages::PublishedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-outbox_messages-published-created_at")
                    .table(OutboxMessages::Table)
                    .col(OutboxMessages::Published)
                    .col(OutboxMessages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SagaHazards::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SagaHazards::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SagaHazards::Operation).string().not_null())
                    .col(ColumnDef::new(SagaHazards::AggregateId).string())
                    .col(
                        ColumnDef::new(SagaHazards::WalletMutations)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SagaHazards::Cause).text().not_null())
                    .col(
                        ColumnDef::new(SagaHazards::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SagaHazards::ResolvedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SagaHazards::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OutboxMessages::Table).to_owned())
            .await?;
        Ok(())
    }
}
