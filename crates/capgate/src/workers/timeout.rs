//! timeout_check 作业：兜底清扫卡死的任务
//!
//! 轮询耗尽或回调永远不来时，任务可能停在 processing。
//! 周期巡检把超过 30 分钟未更新的处理中任务走标准失败路径，
//! 失败路径自带退款与账号释放。

use std::sync::Arc;

use anyhow::Result;
use capgate_entity::task::{self, TaskStatus};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::context::AppContext;
use crate::task as task_service;

/// 任务整体超时（分钟）
const TASK_TIMEOUT_MINUTES: i64 = 30;

pub async fn handle_timeout_check(ctx: &Arc<AppContext>) -> Result<()> {
    let deadline = Utc::now().naive_utc() - Duration::minutes(TASK_TIMEOUT_MINUTES);

    let stuck = task::Entity::find()
        .filter(task::Column::Status.eq(TaskStatus::Processing))
        .filter(task::Column::UpdatedAt.lt(deadline))
        .all(&ctx.db)
        .await?;

    if stuck.is_empty() {
        debug!("超时巡检完成，无卡死任务");
        return Ok(());
    }

    for item in &stuck {
        warn!("任务超时: task_no={} updated_at={}", item.task_no, item.updated_at);
        task_service::fail_task(ctx, item.id, "task timeout").await?;
    }

    info!("超时巡检完成，处理 {} 个任务", stuck.len());
    Ok(())
}
