use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建任务表
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Task::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Task::TaskNo).string_len(64).not_null().unique_key())
                    .col(ColumnDef::new(Task::UserId).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::TokenId).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::CapabilityCode).string_len(30).not_null())
                    .col(ColumnDef::new(Task::ChannelId).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::ChannelCapabilityId).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::AccountId).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::VendorTaskId).string_len(100).not_null().default(""))
                    .col(ColumnDef::new(Task::Status).string_len(20).not_null().default("pending"))
                    .col(ColumnDef::new(Task::Progress).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::CallbackUrl).string_len(500).not_null().default(""))
                    .col(ColumnDef::new(Task::CallbackStatus).string_len(20))
                    .col(ColumnDef::new(Task::CallbackAttempts).integer().not_null().default(0))
                    .col(ColumnDef::new(Task::RequestParams).json())
                    .col(ColumnDef::new(Task::MappedParams).json())
                    .col(ColumnDef::new(Task::VendorResponse).json())
                    .col(ColumnDef::new(Task::Result).json())
                    .col(ColumnDef::new(Task::ErrorMessage).text().not_null().default(""))
                    .col(ColumnDef::new(Task::Cost).double().not_null().default(0))
                    .col(ColumnDef::new(Task::Refunded).boolean().not_null().default(false))
                    .col(ColumnDef::new(Task::StartedAt).timestamp())
                    .col(ColumnDef::new(Task::CompletedAt).timestamp())
                    .col(
                        ColumnDef::new(Task::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Task::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 查询索引：按用户、按状态、按上游任务ID匹配回调
        manager
            .create_index(
                Index::create()
                    .name("idx_task_user_id")
                    .table(Task::Table)
                    .col(Task::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_status_updated_at")
                    .table(Task::Table)
                    .col(Task::Status)
                    .col(Task::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_task_vendor_task_id")
                    .table(Task::Table)
                    .col(Task::VendorTaskId)
                    .col(Task::ChannelCapabilityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_task_vendor_task_id").table(Task::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_task_status_updated_at")
                    .table(Task::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_task_user_id").table(Task::Table).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(Task::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    TaskNo,
    UserId,
    TokenId,
    CapabilityCode,
    ChannelId,
    ChannelCapabilityId,
    AccountId,
    VendorTaskId,
    Status,
    Progress,
    CallbackUrl,
    CallbackStatus,
    CallbackAttempts,
    RequestParams,
    MappedParams,
    VendorResponse,
    Result,
    ErrorMessage,
    Cost,
    Refunded,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
