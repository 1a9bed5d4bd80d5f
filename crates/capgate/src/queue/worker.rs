//! 作业队列消费循环
//!
//! 有界并发的 worker 池，按 critical:default:low = 6:3:1 的权重轮转认领，
//! 某个队列为空时顺延到其它队列，不会饿死低优先级。认领是
//! pending -> running 的条件更新，配合处理器自身的幂等检查构成
//! 至少一次语义；处理失败的作业延迟重新入队，重试次数封顶。

use std::sync::Arc;

use anyhow::Result;
use capgate_entity::job_queue::{self, JobKind, JobStatus, QueueBand};
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::CONFIG;
use crate::context::AppContext;
use crate::queue::{self, NotifyPayload, PollPayload, SubmitPayload, UploadPayload};
use crate::workers;

/// 权重轮转表，critical:default:low = 6:3:1
const BAND_CYCLE: [QueueBand; 10] = [
    QueueBand::Critical,
    QueueBand::Critical,
    QueueBand::Critical,
    QueueBand::Critical,
    QueueBand::Critical,
    QueueBand::Critical,
    QueueBand::Default,
    QueueBand::Default,
    QueueBand::Default,
    QueueBand::Low,
];

const IDLE_SLEEP_MS: u64 = 500;

/// 超时巡检周期（秒）
const TIMEOUT_CHECK_INTERVAL_SECS: u64 = 300;

/// worker 池主循环，随 CancellationToken 退出
pub async fn worker_pool(ctx: Arc<AppContext>, token: CancellationToken) -> Result<()> {
    let concurrency = CONFIG.worker.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let tracker = TaskTracker::new();
    let mut cycle = 0usize;

    info!("作业 worker 池启动，并发数: {}", concurrency);

    loop {
        if token.is_cancelled() {
            break;
        }

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit.expect("semaphore closed"),
            _ = token.cancelled() => break,
        };

        match claim_next(&ctx.db, cycle).await {
            Ok(Some(job)) => {
                cycle = cycle.wrapping_add(1);
                let ctx = ctx.clone();
                let token = token.clone();
                tracker.spawn(async move {
                    run_job(ctx, job, token).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(IDLE_SLEEP_MS)) => {},
                    _ = token.cancelled() => break,
                }
            }
            Err(e) => {
                drop(permit);
                error!("认领作业失败: {:#}", e);
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {},
                    _ = token.cancelled() => break,
                }
            }
        }
    }

    tracker.close();
    tracker.wait().await;
    info!("作业 worker 池已退出");
    Ok(())
}

/// 周期性投递超时巡检作业
pub async fn timeout_scheduler(ctx: Arc<AppContext>, token: CancellationToken) -> Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(TIMEOUT_CHECK_INTERVAL_SECS));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = queue::enqueue(
                    &ctx.db,
                    JobKind::TimeoutCheck,
                    QueueBand::Default,
                    &serde_json::json!({}),
                )
                .await
                {
                    error!("投递超时巡检作业失败: {:#}", e);
                }
            }
            _ = token.cancelled() => break,
        }
    }
    Ok(())
}

/// 从权重轮转位置开始尝试各队列，认领一个到期作业
async fn claim_next(db: &DatabaseConnection, cycle: usize) -> Result<Option<job_queue::Model>> {
    let start = BAND_CYCLE[cycle % BAND_CYCLE.len()];
    let mut bands = vec![start];
    for band in [QueueBand::Critical, QueueBand::Default, QueueBand::Low] {
        if band != start {
            bands.push(band);
        }
    }

    for band in bands {
        if let Some(job) = claim_one(db, band).await? {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

async fn claim_one(db: &DatabaseConnection, band: QueueBand) -> Result<Option<job_queue::Model>> {
    let now = Utc::now().naive_utc();
    let Some(job) = job_queue::Entity::find()
        .filter(job_queue::Column::Queue.eq(band))
        .filter(job_queue::Column::Status.eq(JobStatus::Pending))
        .filter(job_queue::Column::RunAt.lte(now))
        .order_by_asc(job_queue::Column::RunAt)
        .order_by_asc(job_queue::Column::Id)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    // 条件更新认领，被其它 worker 抢走时放弃本轮
    let result = job_queue::Entity::update_many()
        .set(job_queue::ActiveModel {
            status: Set(JobStatus::Running),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(job_queue::Column::Id.eq(job.id))
        .filter(job_queue::Column::Status.eq(JobStatus::Pending))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Ok(None);
    }
    Ok(Some(job))
}

async fn run_job(ctx: Arc<AppContext>, job: job_queue::Model, token: CancellationToken) {
    debug!("开始处理作业: id={} kind={:?}", job.id, job.kind);

    let result = tokio::select! {
        result = dispatch(&ctx, &job) => result,
        _ = token.cancelled() => {
            // 进程退出，作业放回队列等待下次启动
            if let Err(e) = mark_job(&ctx.db, job.id, JobStatus::Pending, job.retry_count).await {
                error!("作业回滚入队失败: id={} {:#}", job.id, e);
            }
            return;
        }
    };

    match result {
        Ok(()) => {
            if let Err(e) = mark_job(&ctx.db, job.id, JobStatus::Done, job.retry_count).await {
                error!("作业完成标记失败: id={} {:#}", job.id, e);
            }
        }
        Err(e) => {
            let retry_count = job.retry_count + 1;
            if retry_count >= CONFIG.worker.max_retry {
                error!("作业重试耗尽: id={} kind={:?} 错误: {:#}", job.id, job.kind, e);
                if let Err(e) = mark_job(&ctx.db, job.id, JobStatus::Failed, retry_count).await {
                    error!("作业失败标记失败: id={} {:#}", job.id, e);
                }
                crate::workers::on_job_exhausted(&ctx, &job).await;
            } else {
                warn!(
                    "作业执行失败，稍后重试 ({}/{}): id={} 错误: {:#}",
                    retry_count, CONFIG.worker.max_retry, job.id, e
                );
                if let Err(e) =
                    requeue_job(&ctx.db, job.id, retry_count, CONFIG.worker.retry_backoff_seconds as i64).await
                {
                    error!("作业重新入队失败: id={} {:#}", job.id, e);
                }
            }
        }
    }
}

async fn dispatch(ctx: &Arc<AppContext>, job: &job_queue::Model) -> Result<()> {
    match job.kind {
        JobKind::Submit => {
            let payload: SubmitPayload = serde_json::from_str(&job.payload)?;
            workers::submit::handle_submit(ctx, payload).await
        }
        JobKind::Poll => {
            let payload: PollPayload = serde_json::from_str(&job.payload)?;
            workers::poll::handle_poll(ctx, payload).await
        }
        JobKind::Upload => {
            let payload: UploadPayload = serde_json::from_str(&job.payload)?;
            workers::upload::handle_upload(ctx, payload).await
        }
        JobKind::Notify => {
            let payload: NotifyPayload = serde_json::from_str(&job.payload)?;
            workers::notify::handle_notify(ctx, payload).await
        }
        JobKind::TimeoutCheck => workers::timeout::handle_timeout_check(ctx).await,
    }
}

async fn mark_job(db: &DatabaseConnection, id: i32, status: JobStatus, retry_count: i32) -> Result<()> {
    job_queue::Entity::update_many()
        .set(job_queue::ActiveModel {
            status: Set(status),
            retry_count: Set(retry_count),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .filter(job_queue::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

async fn requeue_job(db: &DatabaseConnection, id: i32, retry_count: i32, delay_seconds: i64) -> Result<()> {
    let now = Utc::now().naive_utc();
    job_queue::Entity::update_many()
        .set(job_queue::ActiveModel {
            status: Set(JobStatus::Pending),
            retry_count: Set(retry_count),
            run_at: Set(now + chrono::Duration::seconds(delay_seconds)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(job_queue::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_cycle_weights() {
        let critical = BAND_CYCLE.iter().filter(|b| **b == QueueBand::Critical).count();
        let default = BAND_CYCLE.iter().filter(|b| **b == QueueBand::Default).count();
        let low = BAND_CYCLE.iter().filter(|b| **b == QueueBand::Low).count();
        assert_eq!((critical, default, low), (6, 3, 1));
    }
}
