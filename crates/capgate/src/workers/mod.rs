//! 作业处理器
//!
//! 每个处理器执行前都重新读取任务行并校验前置状态，
//! 已终结的任务直接成功返回，保证队列重放安全。

pub mod notify;
pub mod poll;
pub mod submit;
pub mod timeout;
pub mod upload;

use std::sync::Arc;

use anyhow::{Context, Result};
use capgate_entity::job_queue::{self, JobKind};
use capgate_entity::{channel, channel_account, channel_capability, task};
use sea_orm::EntityTrait;

use crate::context::AppContext;
use crate::queue::{PollPayload, SubmitPayload, UploadPayload};
use crate::upstream::UpstreamAdapter;

/// 任务所指向的渠道三元组快照
pub(crate) struct RouteSnapshot {
    pub channel: channel::Model,
    pub account: channel_account::Model,
    pub cc: channel_capability::Model,
}

/// 读取任务的渠道/账号/能力配置快照，任一缺失返回错误
pub(crate) async fn load_route(ctx: &AppContext, task: &task::Model) -> Result<RouteSnapshot> {
    let channel = channel::Entity::find_by_id(task.channel_id)
        .one(&ctx.db)
        .await?
        .context("channel not found")?;
    let account = channel_account::Entity::find_by_id(task.account_id)
        .one(&ctx.db)
        .await?
        .context("channel account not found")?;
    let cc = channel_capability::Entity::find_by_id(task.channel_capability_id)
        .one(&ctx.db)
        .await?
        .context("channel capability not found")?;
    Ok(RouteSnapshot { channel, account, cc })
}

impl RouteSnapshot {
    /// 为当前任务物化一个上游适配器
    pub(crate) fn adapter(&self, ctx: &AppContext, task: &task::Model) -> UpstreamAdapter {
        UpstreamAdapter::new(
            self.channel.clone(),
            self.account.clone(),
            self.cc.clone(),
            ctx.http.clone(),
            ctx.audit.clone(),
            task.id,
            task.task_no.clone(),
        )
    }
}

/// 作业重试耗尽的兜底：携带任务的作业走标准失败路径（退款、释放账号）
///
/// notify 作业除外，回调投递结果永远不影响任务状态。
pub(crate) async fn on_job_exhausted(ctx: &Arc<AppContext>, job: &job_queue::Model) {
    let task_id = match job.kind {
        JobKind::Submit => serde_json::from_str::<SubmitPayload>(&job.payload)
            .map(|p| p.task_id)
            .ok(),
        JobKind::Poll => serde_json::from_str::<PollPayload>(&job.payload)
            .map(|p| p.task_id)
            .ok(),
        JobKind::Upload => serde_json::from_str::<UploadPayload>(&job.payload)
            .map(|p| p.task_id)
            .ok(),
        JobKind::Notify | JobKind::TimeoutCheck => None,
    };
    let Some(task_id) = task_id else { return };

    if let Err(e) = crate::task::fail_task(ctx, task_id, "job retries exhausted").await {
        error!("作业耗尽后终结任务失败: task_id={} 错误: {:#}", task_id, e);
    }
}
