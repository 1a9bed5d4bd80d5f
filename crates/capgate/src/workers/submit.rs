//! submit 作业：把任务提交到上游，并按结果模式派发后续阶段

use std::sync::Arc;

use anyhow::Result;
use capgate_entity::channel_capability::ResultMode;
use capgate_entity::job_queue::{JobKind, QueueBand};
use capgate_entity::task::TaskStatus;
use serde_json::Map;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::mapping::progress::UpstreamStatus;
use crate::mapping::response::map_response;
use crate::queue::{self, PollPayload, SubmitPayload, UploadPayload};
use crate::task;
use crate::workers::load_route;

pub async fn handle_submit(ctx: &Arc<AppContext>, payload: SubmitPayload) -> Result<()> {
    let Some(current) = task::get_by_id(&ctx.db, payload.task_id).await? else {
        warn!("submit 作业找不到任务: task_id={}", payload.task_id);
        return Ok(());
    };
    // 重放或取消后的作业直接空操作退出
    if current.status != TaskStatus::Pending {
        debug!("任务不在 pending 状态，跳过提交: task_no={}", current.task_no);
        return Ok(());
    }

    let route = match load_route(ctx, &current).await {
        Ok(route) => route,
        Err(e) => {
            task::fail_task(ctx, current.id, &format!("channel config missing: {e:#}")).await?;
            return Ok(());
        }
    };

    let params = current
        .mapped_params
        .as_ref()
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let adapter = route.adapter(ctx, &current);
    let (submit, raw) = match adapter.submit(&params).await {
        Ok(ok) => ok,
        // 传输错误交给队列按次数重试，耗尽后由队列终结任务
        Err(e) if e.retryable => {
            warn!("提交上游失败，等待重试: task_no={} 错误: {}", current.task_no, e);
            return Err(e.into());
        }
        Err(e) => {
            let message = ApiError::ProviderError(e.to_string()).to_string();
            task::fail_task(ctx, current.id, &message).await?;
            return Ok(());
        }
    };

    task::set_vendor_response(&ctx.db, current.id, raw.clone()).await?;

    // 提交响应即报失败
    if submit.outcome.status == Some(UpstreamStatus::Fail) {
        let message = if submit.outcome.error.is_empty() {
            "upstream reported failure".to_string()
        } else {
            submit.outcome.error.clone()
        };
        task::fail_task(ctx, current.id, &message).await?;
        return Ok(());
    }

    if !task::mark_processing(&ctx.db, current.id, &submit.vendor_task_id).await? {
        // 提交期间被取消，取消路径已完成退款与账号释放
        info!("任务提交期间已被取消: task_no={}", current.task_no);
        return Ok(());
    }

    info!(
        "任务已提交上游: task_no={} vendor_task_id={}",
        current.task_no, submit.vendor_task_id
    );

    match route.cc.result_mode {
        ResultMode::Sync => {
            // 同步模式：提交响应就是最终结果
            let vendor = raw.as_object().cloned().unwrap_or_default();
            let result = match map_response(&vendor, route.cc.response_mapping.as_ref()) {
                Ok(result) => result,
                Err(e) => {
                    task::fail_task(ctx, current.id, &format!("response mapping error: {e:#}")).await?;
                    return Ok(());
                }
            };
            task::set_result_draft(&ctx.db, current.id, &result).await?;
            let origin_url = extract_origin_url(&result);
            let urls = if origin_url.is_empty() {
                submit.outcome.urls.clone()
            } else {
                vec![origin_url.clone()]
            };
            queue::enqueue(
                &ctx.db,
                JobKind::Upload,
                QueueBand::Low,
                &UploadPayload {
                    task_id: current.id,
                    origin_url,
                    urls,
                },
            )
            .await?;
        }
        ResultMode::Poll => {
            queue::enqueue_in(
                &ctx.db,
                JobKind::Poll,
                QueueBand::Default,
                &PollPayload {
                    task_id: current.id,
                    poll_count: 0,
                },
                route.cc.poll_interval.max(1) as i64,
            )
            .await?;
        }
        ResultMode::Callback => {
            // 等待上游回调，超时巡检兜底
        }
    }

    Ok(())
}

/// 从统一结果中取产物原始 URL，约定键依次为 image_url / video_url / url
pub(crate) fn extract_origin_url(result: &Map<String, serde_json::Value>) -> String {
    for key in ["image_url", "video_url", "url"] {
        if let Some(url) = result.get(key).and_then(|v| v.as_str()) {
            if !url.is_empty() {
                return url.to_string();
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_origin_url_priority() {
        let result = json!({"video_url": "https://u/v.mp4", "url": "https://u/page"});
        assert_eq!(
            extract_origin_url(result.as_object().unwrap()),
            "https://u/v.mp4"
        );

        let result = json!({"url": "https://u/a.png"});
        assert_eq!(extract_origin_url(result.as_object().unwrap()), "https://u/a.png");

        let result = json!({"text": "no url"});
        assert_eq!(extract_origin_url(result.as_object().unwrap()), "");
    }
}
