//! 任务生命周期
//!
//! 任务行的 status / cost / refunded / *_at 只允许本模块改写。
//! 所有状态迁移都带当前状态谓词（乐观并发），命中零行即表示迁移被
//! 抢先完成，调用方按幂等空操作处理；退款与终态更新在同一事务内，
//! 重试不会重复退款，账号在途计数只被胜出的迁移方释放一次。

use anyhow::Result;
use capgate_entity::job_queue::{JobKind, QueueBand};
use capgate_entity::task::{self, TaskStatus};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::billing;
use crate::context::AppContext;
use crate::error::ApiError;
use crate::queue::{self, NotifyPayload};
use crate::selector;

/// 生成对外任务编号
pub fn generate_task_no() -> String {
    let millis = Utc::now().timestamp_millis();
    let uuid = Uuid::new_v4().to_string();
    format!("task_{}_{}", millis, &uuid[..8])
}

pub struct NewTask {
    pub user_id: i32,
    pub token_id: i32,
    pub capability_code: String,
    pub channel_id: i32,
    pub channel_capability_id: i32,
    pub account_id: i32,
    pub callback_url: String,
    pub request_params: Map<String, Value>,
    pub mapped_params: Map<String, Value>,
    pub cost: f64,
}

pub async fn create_task(db: &DatabaseConnection, new: NewTask) -> Result<task::Model> {
    let now = Utc::now().naive_utc();
    let model = task::ActiveModel {
        task_no: Set(generate_task_no()),
        user_id: Set(new.user_id),
        token_id: Set(new.token_id),
        capability_code: Set(new.capability_code),
        channel_id: Set(new.channel_id),
        channel_capability_id: Set(new.channel_capability_id),
        account_id: Set(new.account_id),
        vendor_task_id: Set(String::new()),
        status: Set(TaskStatus::Pending),
        progress: Set(0),
        callback_url: Set(new.callback_url),
        callback_attempts: Set(0),
        request_params: Set(Some(Value::Object(new.request_params))),
        mapped_params: Set(Some(Value::Object(new.mapped_params))),
        error_message: Set(String::new()),
        cost: Set(new.cost),
        refunded: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let task = model.insert(db).await?;

    info!(
        "任务已创建: task_no={} capability={} cost={}",
        task.task_no, task.capability_code, task.cost
    );
    Ok(task)
}

pub async fn get_by_id(db: &DatabaseConnection, id: i32) -> Result<Option<task::Model>> {
    Ok(task::Entity::find_by_id(id).one(db).await?)
}

pub async fn get_by_no(db: &DatabaseConnection, task_no: &str) -> Result<Option<task::Model>> {
    Ok(task::Entity::find()
        .filter(task::Column::TaskNo.eq(task_no))
        .one(db)
        .await?)
}

pub async fn get_by_no_and_user(
    db: &DatabaseConnection,
    task_no: &str,
    user_id: i32,
) -> Result<Option<task::Model>> {
    Ok(task::Entity::find()
        .filter(task::Column::TaskNo.eq(task_no))
        .filter(task::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// 按 (上游任务ID, 渠道能力配置) 匹配任务，用于回调打回
pub async fn get_by_vendor(
    db: &DatabaseConnection,
    vendor_task_id: &str,
    channel_capability_id: i32,
) -> Result<Option<task::Model>> {
    Ok(task::Entity::find()
        .filter(task::Column::VendorTaskId.eq(vendor_task_id))
        .filter(task::Column::ChannelCapabilityId.eq(channel_capability_id))
        .one(db)
        .await?)
}

/// pending -> processing，记录上游任务ID与开始时间
///
/// 返回 false 表示任务已被取消或已终结，调用方应放弃后续阶段
pub async fn mark_processing(db: &DatabaseConnection, id: i32, vendor_task_id: &str) -> Result<bool> {
    let now = Utc::now().naive_utc();
    let mut update = task::ActiveModel {
        status: Set(TaskStatus::Processing),
        started_at: Set(Some(now)),
        updated_at: Set(now),
        ..Default::default()
    };
    if !vendor_task_id.is_empty() {
        update.vendor_task_id = Set(vendor_task_id.to_string());
    }

    let result = task::Entity::update_many()
        .set(update)
        .filter(task::Column::Id.eq(id))
        .filter(task::Column::Status.eq(TaskStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// 保存上游原始响应，不触碰状态
pub async fn set_vendor_response(db: &DatabaseConnection, id: i32, response: Value) -> Result<()> {
    task::Entity::update_many()
        .set(task::ActiveModel {
            vendor_response: Set(Some(response)),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .filter(task::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// 写入统一结果草稿（转存前），不触碰状态
pub async fn set_result_draft(db: &DatabaseConnection, id: i32, result: &Map<String, Value>) -> Result<()> {
    task::Entity::update_many()
        .set(task::ActiveModel {
            result: Set(Some(Value::Object(result.clone()))),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .filter(task::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

/// 更新进度，仅对 processing 状态生效
pub async fn update_progress(db: &DatabaseConnection, id: i32, progress: i32) -> Result<()> {
    task::Entity::update_many()
        .set(task::ActiveModel {
            progress: Set(progress.clamp(0, 100)),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .filter(task::Column::Id.eq(id))
        .filter(task::Column::Status.eq(TaskStatus::Processing))
        .exec(db)
        .await?;
    Ok(())
}

/// 任务成功终态：写结果、置进度 100、记录完成时间
///
/// cost 保持创建时定价不变。返回 false 表示迁移被抢先（幂等退出）。
pub async fn complete_task(ctx: &AppContext, task: &task::Model, result: Map<String, Value>) -> Result<bool> {
    let now = Utc::now().naive_utc();
    let update = task::Entity::update_many()
        .set(task::ActiveModel {
            status: Set(TaskStatus::Success),
            progress: Set(100),
            result: Set(Some(Value::Object(result))),
            completed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(task::Column::Id.eq(task.id))
        .filter(task::Column::Status.is_in([TaskStatus::Pending, TaskStatus::Processing]))
        .exec(&ctx.db)
        .await?;
    if update.rows_affected == 0 {
        return Ok(false);
    }

    selector::release_account(&ctx.db, task.account_id).await?;

    if !task.callback_url.is_empty() {
        queue::enqueue(
            &ctx.db,
            JobKind::Notify,
            QueueBand::Default,
            &NotifyPayload { task_id: task.id },
        )
        .await?;
    }

    info!("任务成功: task_no={}", task.task_no);
    Ok(true)
}

/// 任务失败终态：记错误、完成时间，未退款的扣费原子退回
pub async fn fail_task(ctx: &AppContext, task_id: i32, error_message: &str) -> Result<bool> {
    let Some(task) = get_by_id(&ctx.db, task_id).await? else {
        warn!("任务不存在，无法置为失败: task_id={}", task_id);
        return Ok(false);
    };
    finish_with_refund(ctx, &task, TaskStatus::Failed, error_message).await
}

/// 调用方取消：pending/processing 均可取消，退款并释放账号
pub async fn cancel_task(ctx: &AppContext, task_no: &str, user_id: i32) -> Result<(), ApiError> {
    let task = get_by_no_and_user(&ctx.db, task_no, user_id)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound("task not found".to_string()))?;

    let cancelled = finish_with_refund(ctx, &task, TaskStatus::Cancelled, "cancelled by caller")
        .await
        .map_err(ApiError::from)?;
    if !cancelled {
        return Err(ApiError::InvalidParams(
            "task not found or cannot be cancelled".to_string(),
        ));
    }
    Ok(())
}

/// 失败/取消共用的终态迁移
///
/// 终态更新、refunded 置位与账本退款在同一事务内提交；
/// 迁移谓词未命中直接返回 false，不做任何副作用。
async fn finish_with_refund(
    ctx: &AppContext,
    task: &task::Model,
    status: TaskStatus,
    error_message: &str,
) -> Result<bool> {
    let now = Utc::now().naive_utc();
    let should_refund = task.cost > 0.0 && !task.refunded;

    let txn = ctx.db.begin().await?;

    let mut update = task::ActiveModel {
        status: Set(status),
        error_message: Set(error_message.to_string()),
        completed_at: Set(Some(now)),
        updated_at: Set(now),
        ..Default::default()
    };
    if should_refund {
        update.refunded = Set(true);
    }

    let result = task::Entity::update_many()
        .set(update)
        .filter(task::Column::Id.eq(task.id))
        .filter(task::Column::Status.is_in([TaskStatus::Pending, TaskStatus::Processing]))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    if should_refund {
        billing::refund(&txn, task.token_id, task.user_id, task.cost).await?;
    }

    txn.commit().await?;

    selector::release_account(&ctx.db, task.account_id).await?;

    if !task.callback_url.is_empty() {
        queue::enqueue(
            &ctx.db,
            JobKind::Notify,
            QueueBand::Default,
            &NotifyPayload { task_id: task.id },
        )
        .await?;
    }

    match status {
        TaskStatus::Cancelled => info!("任务已取消: task_no={}", task.task_no),
        _ => warn!("任务失败: task_no={} error={}", task.task_no, error_message),
    }
    Ok(true)
}

/// 记录调用方回调投递结果
pub async fn set_callback_status(
    db: &DatabaseConnection,
    id: i32,
    status: capgate_entity::task::CallbackStatus,
    attempts: i32,
) -> Result<()> {
    task::Entity::update_many()
        .set(task::ActiveModel {
            callback_status: Set(Some(status)),
            callback_attempts: Set(attempts),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        })
        .filter(task::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgate_entity::{channel_account, job_queue, token, user};
    use capgate_migration::{Migrator, MigratorTrait};
    use sea_orm::{ConnectOptions, Database};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    use crate::auth::SessionStore;
    use crate::upstream::audit::spawn_audit_writer;

    #[test]
    fn test_generate_task_no() {
        let no = generate_task_no();
        assert!(no.starts_with("task_"));
        // task_<毫秒时间戳>_<uuid前8位>
        let parts: Vec<&str> = no.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert_ne!(generate_task_no(), no);
    }

    async fn setup_ctx() -> Arc<AppContext> {
        // 内存库必须单连接，连接池里每个连接都是独立的内存数据库
        let mut option = ConnectOptions::new("sqlite::memory:");
        option.max_connections(1);
        let db = Database::connect(option).await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let now = Utc::now().naive_utc();
        user::ActiveModel {
            username: Set("alice".into()),
            password: Set("x".into()),
            role: Set(user::UserRole::User),
            balance: Set(8.0),
            status: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        token::ActiveModel {
            user_id: Set(1),
            key: Set("sk-test".into()),
            name: Set("t".into()),
            balance: Set(8.0),
            total_used: Set(2.0),
            rate_limit: Set(60),
            status: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
        // 账号模拟已被任务认领
        channel_account::ActiveModel {
            channel_id: Set(1),
            name: Set("acc".into()),
            api_key: Set("sk-upstream".into()),
            weight: Set(10),
            status: Set(1),
            current_tasks: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let tracker = TaskTracker::new();
        let audit = spawn_audit_writer(db.clone(), &tracker, CancellationToken::new());
        Arc::new(AppContext::new(db, audit, None, SessionStore::new()))
    }

    /// 造一个已扣费、已认领账号的待处理任务
    async fn charged_task(ctx: &AppContext) -> task::Model {
        create_task(
            &ctx.db,
            NewTask {
                user_id: 1,
                token_id: 1,
                capability_code: "text2img".into(),
                channel_id: 1,
                channel_capability_id: 1,
                account_id: 1,
                callback_url: "https://caller/cb".into(),
                request_params: Map::new(),
                mapped_params: Map::new(),
                cost: 2.0,
            },
        )
        .await
        .unwrap()
    }

    async fn account_current_tasks(ctx: &AppContext) -> i32 {
        channel_account::Entity::find_by_id(1)
            .one(&ctx.db)
            .await
            .unwrap()
            .unwrap()
            .current_tasks
    }

    async fn token_balance(ctx: &AppContext) -> (f64, bool) {
        let t = token::Entity::find_by_id(1).one(&ctx.db).await.unwrap().unwrap();
        let task = task::Entity::find_by_id(1).one(&ctx.db).await.unwrap().unwrap();
        (t.balance, task.refunded)
    }

    #[tokio::test]
    async fn test_fail_refunds_and_releases_once() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;

        assert!(fail_task(&ctx, created.id, "upstream error").await.unwrap());

        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Failed);
        assert_eq!(reloaded.error_message, "upstream error");
        assert!(reloaded.refunded);
        assert!(reloaded.completed_at.is_some());
        assert_eq!(token_balance(&ctx).await, (10.0, true));
        assert_eq!(account_current_tasks(&ctx).await, 0);

        // 重放失败迁移：不再退款、不再释放账号
        assert!(!fail_task(&ctx, created.id, "again").await.unwrap());
        assert_eq!(token_balance(&ctx).await, (10.0, true));
        assert_eq!(account_current_tasks(&ctx).await, 0);
    }

    #[tokio::test]
    async fn test_complete_keeps_cost_and_releases() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;
        assert!(mark_processing(&ctx.db, created.id, "u-1").await.unwrap());

        let mut result = Map::new();
        result.insert("url".into(), Value::String("https://u/a.png".into()));
        assert!(complete_task(&ctx, &created, result).await.unwrap());

        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Success);
        assert_eq!(reloaded.progress, 100);
        assert_eq!(reloaded.cost, 2.0);
        assert!(!reloaded.refunded);
        assert_eq!(account_current_tasks(&ctx).await, 0);

        // 有回调地址，通知作业已入队
        let jobs = job_queue::Entity::find().all(&ctx.db).await.unwrap();
        assert!(jobs.iter().any(|j| j.kind == job_queue::JobKind::Notify));

        // 成功后再失败是空操作
        assert!(!fail_task(&ctx, created.id, "late").await.unwrap());
        assert_eq!(token_balance(&ctx).await, (8.0, false));
    }

    #[tokio::test]
    async fn test_cancel_during_processing() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;
        assert!(mark_processing(&ctx.db, created.id, "u-1").await.unwrap());

        cancel_task(&ctx, &created.task_no, 1).await.unwrap();

        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Cancelled);
        assert!(reloaded.refunded);
        assert_eq!(token_balance(&ctx).await, (10.0, true));
        assert_eq!(account_current_tasks(&ctx).await, 0);

        // 已取消的任务不能再取消
        let err = cancel_task(&ctx, &created.task_no, 1).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::InvalidParams("task not found or cannot be cancelled".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancel_before_submit_blocks_processing() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;

        // pending 阶段取消后，submit 作业的迁移应落空
        cancel_task(&ctx, &created.task_no, 1).await.unwrap();
        assert!(!mark_processing(&ctx.db, created.id, "u-1").await.unwrap());

        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Cancelled);
        assert!(reloaded.vendor_task_id.is_empty());
        assert_eq!(account_current_tasks(&ctx).await, 0);
    }

    #[tokio::test]
    async fn test_progress_only_updates_processing() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;

        update_progress(&ctx.db, created.id, 50).await.unwrap();
        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.progress, 0);

        assert!(mark_processing(&ctx.db, created.id, "u-1").await.unwrap());
        update_progress(&ctx.db, created.id, 50).await.unwrap();
        let reloaded = get_by_id(&ctx.db, created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.progress, 50);
    }

    #[tokio::test]
    async fn test_get_by_vendor_scoped_to_cc() {
        let ctx = setup_ctx().await;
        let created = charged_task(&ctx).await;
        assert!(mark_processing(&ctx.db, created.id, "u-9").await.unwrap());

        assert!(get_by_vendor(&ctx.db, "u-9", 1).await.unwrap().is_some());
        assert!(get_by_vendor(&ctx.db, "u-9", 2).await.unwrap().is_none());
        assert!(get_by_vendor(&ctx.db, "u-8", 1).await.unwrap().is_none());
    }
}
