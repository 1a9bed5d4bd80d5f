use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建令牌渠道优先级表
        manager
            .create_table(
                Table::create()
                    .table(TokenChannelPriority::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TokenChannelPriority::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TokenChannelPriority::TokenId).integer().not_null())
                    .col(
                        ColumnDef::new(TokenChannelPriority::CapabilityCode)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(ColumnDef::new(TokenChannelPriority::ChannelId).integer().not_null())
                    .col(ColumnDef::new(TokenChannelPriority::Priority).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(TokenChannelPriority::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TokenChannelPriority::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_token_capability")
                    .table(TokenChannelPriority::Table)
                    .col(TokenChannelPriority::TokenId)
                    .col(TokenChannelPriority::CapabilityCode)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_token_capability")
                    .table(TokenChannelPriority::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(TokenChannelPriority::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TokenChannelPriority {
    Table,
    Id,
    TokenId,
    CapabilityCode,
    ChannelId,
    Priority,
    CreatedAt,
    UpdatedAt,
}
