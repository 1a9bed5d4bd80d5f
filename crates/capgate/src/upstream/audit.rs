//! 渠道请求审计日志的异步写入
//!
//! 适配器每次对外 HTTP 调用产生一条记录，经有界通道交给后台任务落库，
//! 热路径不等待审计 I/O；通道满时丢弃并告警。

use capgate_entity::channel_request_log::{self, RequestType};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// 一条出入站请求的审计记录
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub task_id: i32,
    pub task_no: String,
    pub channel_id: i32,
    pub account_id: i32,
    pub capability_code: String,
    pub request_type: RequestType,
    pub method: String,
    pub url: String,
    pub request_headers: String,
    pub request_body: String,
    pub status_code: i32,
    pub response_body: String,
    pub duration_ms: i64,
    pub error_message: String,
}

#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditSink {
    /// 投递一条审计记录，不阻塞调用方
    pub fn record(&self, record: AuditRecord) {
        if self.tx.try_send(record).is_err() {
            warn!("审计日志通道已满，丢弃一条记录");
        }
    }
}

/// 启动审计日志写入任务，返回供各处克隆使用的投递端
pub fn spawn_audit_writer(
    db: DatabaseConnection,
    tracker: &TaskTracker,
    token: CancellationToken,
) -> AuditSink {
    let (tx, mut rx) = mpsc::channel::<AuditRecord>(AUDIT_CHANNEL_CAPACITY);

    tracker.spawn(async move {
        loop {
            tokio::select! {
                record = rx.recv() => {
                    let Some(record) = record else { break };
                    write_record(&db, record).await;
                }
                _ = token.cancelled() => {
                    // 退出前清空通道里积压的记录
                    while let Ok(record) = rx.try_recv() {
                        write_record(&db, record).await;
                    }
                    break;
                }
            }
        }
        info!("审计日志写入任务已退出");
    });

    AuditSink { tx }
}

async fn write_record(db: &DatabaseConnection, record: AuditRecord) {
    let model = channel_request_log::ActiveModel {
        task_id: Set(record.task_id),
        task_no: Set(record.task_no),
        channel_id: Set(record.channel_id),
        account_id: Set(record.account_id),
        capability_code: Set(record.capability_code),
        request_type: Set(record.request_type),
        method: Set(record.method),
        url: Set(record.url),
        request_headers: Set(record.request_headers),
        request_body: Set(record.request_body),
        status_code: Set(record.status_code),
        response_body: Set(record.response_body),
        duration_ms: Set(record.duration_ms),
        error_message: Set(record.error_message),
        request_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    };

    if let Err(e) = model.insert(db).await {
        error!("审计日志写入失败: {:#}", e);
    }
}
