use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建作业队列表
        manager
            .create_table(
                Table::create()
                    .table(JobQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobQueue::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobQueue::Kind).string_len(50).not_null())
                    .col(ColumnDef::new(JobQueue::Payload).text().not_null())
                    .col(ColumnDef::new(JobQueue::Queue).string_len(10).not_null().default("default"))
                    .col(ColumnDef::new(JobQueue::Status).string_len(20).not_null().default("pending"))
                    .col(ColumnDef::new(JobQueue::RetryCount).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(JobQueue::RunAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobQueue::CreatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(JobQueue::UpdatedAt)
                            .timestamp()
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 消费查询按 (queue, status, run_at) 走索引
        manager
            .create_index(
                Index::create()
                    .name("idx_job_queue_claim")
                    .table(JobQueue::Table)
                    .col(JobQueue::Queue)
                    .col(JobQueue::Status)
                    .col(JobQueue::RunAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_job_queue_claim").table(JobQueue::Table).to_owned())
            .await?;
        manager.drop_table(Table::drop().table(JobQueue::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum JobQueue {
    Table,
    Id,
    Kind,
    Payload,
    Queue,
    Status,
    RetryCount,
    RunAt,
    CreatedAt,
    UpdatedAt,
}
