//! 持久化作业队列
//!
//! 作业落在 job_queue 表里，按 critical/default/low 三个优先级队列投递，
//! run_at 支持延迟执行。投递方只写库，消费循环见 worker 子模块。

pub mod worker;

use anyhow::Result;
use capgate_entity::job_queue::{self, JobKind, JobStatus, QueueBand};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub task_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollPayload {
    pub task_id: i32,
    pub poll_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPayload {
    pub task_id: i32,
    pub origin_url: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    pub task_id: i32,
}

/// 各作业类型的默认队列：提交走 critical，轮询/通知走 default，转存走 low
pub fn default_band(kind: JobKind) -> QueueBand {
    match kind {
        JobKind::Submit => QueueBand::Critical,
        JobKind::Poll | JobKind::Notify | JobKind::TimeoutCheck => QueueBand::Default,
        JobKind::Upload => QueueBand::Low,
    }
}

/// 立即入队
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    kind: JobKind,
    band: QueueBand,
    payload: &impl Serialize,
) -> Result<()> {
    enqueue_in(conn, kind, band, payload, 0).await
}

/// 延迟入队，delay_seconds 秒后才会被认领
pub async fn enqueue_in<C: ConnectionTrait>(
    conn: &C,
    kind: JobKind,
    band: QueueBand,
    payload: &impl Serialize,
    delay_seconds: i64,
) -> Result<()> {
    let now = Utc::now().naive_utc();
    let job = job_queue::ActiveModel {
        kind: Set(kind),
        payload: Set(serde_json::to_string(payload)?),
        queue: Set(band),
        status: Set(JobStatus::Pending),
        retry_count: Set(0),
        run_at: Set(now + Duration::seconds(delay_seconds)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    job.insert(conn).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        assert_eq!(default_band(JobKind::Submit), QueueBand::Critical);
        assert_eq!(default_band(JobKind::Poll), QueueBand::Default);
        assert_eq!(default_band(JobKind::Notify), QueueBand::Default);
        assert_eq!(default_band(JobKind::TimeoutCheck), QueueBand::Default);
        assert_eq!(default_band(JobKind::Upload), QueueBand::Low);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = PollPayload { task_id: 7, poll_count: 3 };
        let json = serde_json::to_string(&payload).unwrap();
        let back: PollPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, 7);
        assert_eq!(back.poll_count, 3);
    }
}
