//! notify 作业：把任务终态回调给调用方
//!
//! 至多 3 次尝试，线性退避，结果只记在 callback_status 上，
//! 永远不影响任务本身的状态。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use capgate_entity::channel_request_log::RequestType;
use capgate_entity::task::{CallbackStatus, TaskStatus};
use serde::Serialize;
use serde_json::Value;

use crate::context::AppContext;
use crate::queue::NotifyPayload;
use crate::task;
use crate::upstream::AuditRecord;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: i32 = 3;

/// 发往调用方回调地址的载荷
#[derive(Debug, Serialize)]
pub struct CallbackBody {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn handle_notify(ctx: &Arc<AppContext>, payload: NotifyPayload) -> Result<()> {
    let Some(current) = task::get_by_id(&ctx.db, payload.task_id).await? else {
        warn!("notify 作业找不到任务: task_id={}", payload.task_id);
        return Ok(());
    };
    if current.callback_url.is_empty() {
        return Ok(());
    }

    let body = build_callback_body(&current);
    let body_json = serde_json::to_string(&body).unwrap_or_default();

    for attempt in 1..=MAX_ATTEMPTS {
        let start = std::time::Instant::now();
        let response = ctx
            .http
            .post(&current.callback_url)
            .timeout(NOTIFY_TIMEOUT)
            .json(&body)
            .send()
            .await;

        let mut record = AuditRecord {
            task_id: current.id,
            task_no: current.task_no.clone(),
            channel_id: current.channel_id,
            account_id: current.account_id,
            capability_code: current.capability_code.clone(),
            request_type: RequestType::CallbackOut,
            method: "POST".to_string(),
            url: current.callback_url.clone(),
            request_headers: serde_json::to_string(&HashMap::from([(
                "Content-Type",
                "application/json",
            )]))
            .unwrap_or_default(),
            request_body: body_json.clone(),
            status_code: 0,
            response_body: String::new(),
            duration_ms: start.elapsed().as_millis() as i64,
            error_message: String::new(),
        };

        let ok = match response {
            Ok(resp) => {
                let status = resp.status();
                record.status_code = status.as_u16() as i32;
                record.response_body = resp.text().await.unwrap_or_default();
                record.duration_ms = start.elapsed().as_millis() as i64;
                if status.as_u16() >= 400 {
                    record.error_message = format!("callback returned {}", status.as_u16());
                }
                status.as_u16() < 400
            }
            Err(e) => {
                record.duration_ms = start.elapsed().as_millis() as i64;
                record.error_message = format!("{e:#}");
                false
            }
        };
        ctx.audit.record(record);

        if ok {
            task::set_callback_status(&ctx.db, current.id, CallbackStatus::Success, attempt).await?;
            info!("回调通知成功: task_no={} attempt={}", current.task_no, attempt);
            return Ok(());
        }

        warn!(
            "回调通知失败: task_no={} attempt={}/{}",
            current.task_no, attempt, MAX_ATTEMPTS
        );
        if attempt < MAX_ATTEMPTS {
            // 线性退避 5·attempt 秒
            tokio::time::sleep(Duration::from_secs(5 * attempt as u64)).await;
        }
    }

    task::set_callback_status(&ctx.db, current.id, CallbackStatus::Failed, MAX_ATTEMPTS).await?;
    Ok(())
}

fn build_callback_body(current: &capgate_entity::task::Model) -> CallbackBody {
    CallbackBody {
        task_id: current.task_no.clone(),
        status: current.status,
        progress: current.progress,
        result: if current.status == TaskStatus::Success {
            current.result.clone()
        } else {
            None
        },
        error: if current.error_message.is_empty() {
            None
        } else {
            Some(current.error_message.clone())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task(status: TaskStatus) -> capgate_entity::task::Model {
        capgate_entity::task::Model {
            id: 1,
            task_no: "task_1_abcd1234".into(),
            user_id: 1,
            token_id: 1,
            capability_code: "text2img".into(),
            channel_id: 1,
            channel_capability_id: 1,
            account_id: 1,
            vendor_task_id: "u-1".into(),
            status,
            progress: 100,
            callback_url: "https://caller/cb".into(),
            callback_status: None,
            callback_attempts: 0,
            request_params: None,
            mapped_params: None,
            vendor_response: None,
            result: Some(json!({"url": "https://u/a.png"})),
            error_message: String::new(),
            cost: 1.0,
            refunded: false,
            started_at: None,
            completed_at: None,
            created_at: Default::default(),
            updated_at: Default::default(),
        }
    }

    #[test]
    fn test_callback_body_success() {
        let body = build_callback_body(&sample_task(TaskStatus::Success));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["task_id"], "task_1_abcd1234");
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["url"], "https://u/a.png");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_callback_body_failed() {
        let mut task = sample_task(TaskStatus::Failed);
        task.error_message = "upstream reported failure".into();
        let body = build_callback_body(&task);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "upstream reported failure");
        assert!(json.get("result").is_none());
    }
}
