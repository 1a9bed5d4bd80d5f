use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建用户表
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(User::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(User::Username).string_len(50).not_null().unique_key())
                    .col(ColumnDef::new(User::Password).string_len(100).not_null())
                    .col(ColumnDef::new(User::Role).string_len(10).not_null().default("user"))
                    .col(ColumnDef::new(User::Balance).double().not_null().default(0))
                    .col(ColumnDef::new(User::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(User::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建 API 令牌表
        manager
            .create_table(
                Table::create()
                    .table(Token::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Token::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Token::UserId).integer().not_null().default(0))
                    .col(ColumnDef::new(Token::Key).string_len(64).not_null().unique_key())
                    .col(ColumnDef::new(Token::Name).string_len(50).not_null().default(""))
                    .col(ColumnDef::new(Token::Balance).double().not_null().default(0))
                    .col(ColumnDef::new(Token::TotalUsed).double().not_null().default(0))
                    .col(ColumnDef::new(Token::RateLimit).integer().not_null().default(60))
                    .col(ColumnDef::new(Token::Status).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(Token::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Token::UpdatedAt)
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
                    .name("idx_token_user_id")
                    .table(Token::Table)
                    .col(Token::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_token_user_id").table(Token::Table).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(Token::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(User::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
    Username,
    Password,
    Role,
    Balance,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Token {
    Table,
    Id,
    UserId,
    Key,
    Name,
    Balance,
    TotalUsed,
    RateLimit,
    Status,
    CreatedAt,
    UpdatedAt,
}
