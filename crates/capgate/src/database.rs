use anyhow::Result;
use capgate_migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use tracing::debug;

use crate::config::CONFIG;

fn database_url() -> String {
    let data_dir = &CONFIG.database.data_dir;
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir).expect("创建数据目录失败");
    }
    format!("sqlite://{}?mode=rwc", data_dir.join("capgate.sqlite").to_string_lossy())
}

async fn database_connection() -> Result<DatabaseConnection> {
    let mut option = ConnectOptions::new(database_url());
    option
        .max_connections(CONFIG.database.max_connections)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .idle_timeout(std::time::Duration::from_secs(300))
        .sqlx_logging(false);

    let connection = Database::connect(option).await?;

    // 启用 WAL 模式，写入不阻塞读取；busy_timeout 缓解多 worker 并发写冲突
    connection.execute_unprepared("PRAGMA journal_mode = WAL;").await?;
    connection.execute_unprepared("PRAGMA synchronous = NORMAL;").await?;
    connection.execute_unprepared("PRAGMA busy_timeout = 30000;").await?;

    debug!("SQLite WAL 模式已启用");

    Ok(connection)
}

async fn migrate_database() -> Result<()> {
    // 迁移使用默认连接选项的独立连接，避免连接池引起的迁移顺序问题
    let connection = Database::connect(database_url()).await?;
    Ok(Migrator::up(&connection, None).await?)
}

/// 进行数据库迁移并获取数据库连接，供外部使用
pub async fn setup_database() -> Result<DatabaseConnection> {
    migrate_database().await?;
    database_connection().await
}
