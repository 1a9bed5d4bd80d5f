//! 进程级上下文
//!
//! 启动时构造一次，通过 Arc 注入 HTTP 层与各作业处理器，
//! 替代散落的全局单例。

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::SessionStore;
use crate::storage::Storage;
use crate::upstream::AuditSink;

pub struct AppContext {
    pub db: DatabaseConnection,
    /// 上游与回调共用的 HTTP 客户端
    pub http: reqwest::Client,
    pub audit: AuditSink,
    /// 产物转存后端，未配置时任务保留原始 URL
    pub storage: Option<Arc<dyn Storage>>,
    pub sessions: SessionStore,
}

impl AppContext {
    pub fn new(
        db: DatabaseConnection,
        audit: AuditSink,
        storage: Option<Arc<dyn Storage>>,
        sessions: SessionStore,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("构建 HTTP 客户端失败");
        Self {
            db,
            http,
            audit,
            storage,
            sessions,
        }
    }
}
