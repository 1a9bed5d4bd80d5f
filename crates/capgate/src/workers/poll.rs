//! poll 作业：轮询上游进度，非终态时自我延迟重新入队

use std::sync::Arc;

use anyhow::Result;
use capgate_entity::job_queue::{JobKind, QueueBand};

use crate::context::AppContext;
use crate::mapping::progress::UpstreamStatus;
use crate::queue::{self, PollPayload, UploadPayload};
use crate::task;
use crate::workers::load_route;

/// 轮询次数的绝对上限，独立于渠道配置的保险
const MAX_POLL_COUNT: i32 = 360;

pub async fn handle_poll(ctx: &Arc<AppContext>, payload: PollPayload) -> Result<()> {
    let Some(current) = task::get_by_id(&ctx.db, payload.task_id).await? else {
        warn!("poll 作业找不到任务: task_id={}", payload.task_id);
        return Ok(());
    };
    // 任务已终结（含被取消），轮询作业空操作退出
    if current.status.is_terminal() {
        debug!("任务已终结，停止轮询: task_no={}", current.task_no);
        return Ok(());
    }

    let route = match load_route(ctx, &current).await {
        Ok(route) => route,
        Err(e) => {
            task::fail_task(ctx, current.id, &format!("channel config missing: {e:#}")).await?;
            return Ok(());
        }
    };

    let ceiling = route.cc.poll_max_attempts.min(MAX_POLL_COUNT);
    if payload.poll_count >= ceiling {
        task::fail_task(ctx, current.id, "poll timeout").await?;
        return Ok(());
    }

    let interval = route.cc.poll_interval.max(1) as i64;
    let adapter = route.adapter(ctx, &current);
    let outcome = match adapter.poll(&current.vendor_task_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // 传输错误不终结任务，计入轮询次数后继续
            warn!("轮询上游失败: task_no={} 错误: {:#}", current.task_no, e);
            return requeue(ctx, payload, interval).await;
        }
    };

    debug!(
        "轮询结果: task_no={} status={:?} progress={}",
        current.task_no, outcome.status, outcome.progress
    );

    match outcome.status {
        Some(UpstreamStatus::Success) => {
            task::update_progress(&ctx.db, current.id, 100).await?;
            let origin_url = outcome.urls.first().cloned().unwrap_or_default();
            queue::enqueue(
                &ctx.db,
                JobKind::Upload,
                QueueBand::Low,
                &UploadPayload {
                    task_id: current.id,
                    origin_url,
                    urls: outcome.urls,
                },
            )
            .await?;
        }
        Some(UpstreamStatus::Fail) => {
            let message = if outcome.error.is_empty() {
                "upstream reported failure".to_string()
            } else {
                outcome.error
            };
            task::fail_task(ctx, current.id, &message).await?;
        }
        _ => {
            task::update_progress(&ctx.db, current.id, outcome.progress).await?;
            return requeue(ctx, payload, interval).await;
        }
    }

    Ok(())
}

async fn requeue(ctx: &Arc<AppContext>, payload: PollPayload, interval: i64) -> Result<()> {
    queue::enqueue_in(
        &ctx.db,
        JobKind::Poll,
        QueueBand::Default,
        &PollPayload {
            task_id: payload.task_id,
            poll_count: payload.poll_count + 1,
        },
        interval,
    )
    .await
}
