pub use sea_orm_migration::prelude::*;

mod m20250210_000001_create_account_tables;
mod m20250210_000002_create_channel_tables;
mod m20250210_000003_create_task_table;
mod m20250210_000004_create_job_queue;
mod m20250210_000005_create_request_log;
mod m20250210_000006_create_token_channel_priority;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250210_000001_create_account_tables::Migration),
            Box::new(m20250210_000002_create_channel_tables::Migration),
            Box::new(m20250210_000003_create_task_table::Migration),
            Box::new(m20250210_000004_create_job_queue::Migration),
            Box::new(m20250210_000005_create_request_log::Migration),
            Box::new(m20250210_000006_create_token_channel_priority::Migration),
        ]
    }
}
