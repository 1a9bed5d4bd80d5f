use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建渠道请求日志表（仅追加）
        manager
            .create_table(
                Table::create()
                    .table(ChannelRequestLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChannelRequestLog::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChannelRequestLog::TaskId).integer().not_null().default(0))
                    .col(ColumnDef::new(ChannelRequestLog::TaskNo).string_len(64).not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::ChannelId).integer().not_null().default(0))
                    .col(ColumnDef::new(ChannelRequestLog::AccountId).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(ChannelRequestLog::CapabilityCode)
                            .string_len(30)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ChannelRequestLog::RequestType).string_len(20).not_null())
                    .col(ColumnDef::new(ChannelRequestLog::Method).string_len(10).not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::Url).string_len(500).not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::RequestHeaders).text().not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::RequestBody).text().not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::StatusCode).integer().not_null().default(0))
                    .col(ColumnDef::new(ChannelRequestLog::ResponseBody).text().not_null().default(""))
                    .col(ColumnDef::new(ChannelRequestLog::DurationMs).big_integer().not_null().default(0))
                    .col(ColumnDef::new(ChannelRequestLog::ErrorMessage).text().not_null().default(""))
                    .col(
                        ColumnDef::new(ChannelRequestLog::RequestAt)
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
                    .name("idx_request_log_task_id")
                    .table(ChannelRequestLog::Table)
                    .col(ChannelRequestLog::TaskId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_request_log_request_at")
                    .table(ChannelRequestLog::Table)
                    .col(ChannelRequestLog::RequestAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_request_log_request_at")
                    .table(ChannelRequestLog::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_request_log_task_id")
                    .table(ChannelRequestLog::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ChannelRequestLog::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ChannelRequestLog {
    Table,
    Id,
    TaskId,
    TaskNo,
    ChannelId,
    AccountId,
    CapabilityCode,
    RequestType,
    Method,
    Url,
    RequestHeaders,
    RequestBody,
    StatusCode,
    ResponseBody,
    DurationMs,
    ErrorMessage,
    RequestAt,
}
