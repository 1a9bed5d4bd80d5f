//! 渠道与账号选路
//!
//! 先按 (能力, 模型) 选出渠道能力配置，令牌配置的渠道优先级优先生效；
//! 再在渠道账号池内按最小在途任务数做负载均衡，认领是条件更新，
//! 与 current_tasks 自增原子完成。

use std::collections::HashMap;

use capgate_entity::{channel, channel_account, channel_capability, token_channel_priority};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::error::ApiError;

#[derive(Debug)]
pub struct Selection {
    pub channel: channel::Model,
    pub cc: channel_capability::Model,
}

/// 选择渠道能力配置
///
/// channel_hint 指定渠道类型时只在该渠道内匹配；model_hint 过滤模型。
/// 无令牌优先级时按配置 id 升序取第一个，保证可重复的确定性。
pub async fn select_channel_capability(
    db: &DatabaseConnection,
    token_id: i32,
    capability_code: &str,
    channel_hint: Option<&str>,
    model_hint: Option<&str>,
) -> Result<Selection, ApiError> {
    let mut query = channel_capability::Entity::find()
        .filter(channel_capability::Column::CapabilityCode.eq(capability_code))
        .filter(channel_capability::Column::Status.eq(1));
    if let Some(model) = model_hint {
        query = query.filter(channel_capability::Column::Model.eq(model));
    }
    let candidates = query
        .order_by_asc(channel_capability::Column::Id)
        .all(db)
        .await?;
    if candidates.is_empty() {
        return Err(if model_hint.is_some() {
            ApiError::ModelNotFound
        } else {
            ApiError::NoAvailableChannel
        });
    }

    // 加载候选配置对应的启用渠道
    let channel_ids: Vec<i32> = candidates.iter().map(|cc| cc.channel_id).collect();
    let mut channels: HashMap<i32, channel::Model> = channel::Entity::find()
        .filter(channel::Column::Id.is_in(channel_ids))
        .filter(channel::Column::Status.eq(1))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut candidates: Vec<channel_capability::Model> = candidates
        .into_iter()
        .filter(|cc| match channels.get(&cc.channel_id) {
            Some(c) => channel_hint.map_or(true, |hint| c.channel_type == hint),
            None => false,
        })
        .collect();
    if candidates.is_empty() {
        return Err(ApiError::NoAvailableChannel);
    }

    // 令牌优先级覆盖默认顺序，数值小者优先
    let priorities: HashMap<i32, i32> = token_channel_priority::Entity::find()
        .filter(token_channel_priority::Column::TokenId.eq(token_id))
        .filter(token_channel_priority::Column::CapabilityCode.eq(capability_code))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.channel_id, p.priority))
        .collect();
    if !priorities.is_empty() {
        candidates.sort_by_key(|cc| (priorities.get(&cc.channel_id).copied().unwrap_or(i32::MAX), cc.id));
    }

    let cc = candidates.remove(0);
    let channel = channels.remove(&cc.channel_id).ok_or(ApiError::NoAvailableChannel)?;

    Ok(Selection { channel, cc })
}

/// 认领渠道账号：挑选在途任务最少的启用账号并原子自增 current_tasks
///
/// 条件更新未命中（账号并发变更）时重选一次
pub async fn claim_account(
    db: &DatabaseConnection,
    channel_id: i32,
) -> Result<channel_account::Model, ApiError> {
    for _ in 0..2 {
        let account = channel_account::Entity::find()
            .filter(channel_account::Column::ChannelId.eq(channel_id))
            .filter(channel_account::Column::Status.eq(1))
            .order_by_asc(channel_account::Column::CurrentTasks)
            .order_by_desc(channel_account::Column::Weight)
            .order_by_asc(channel_account::Column::Id)
            .one(db)
            .await?;
        let Some(account) = account else {
            return Err(ApiError::NoAvailableChannel);
        };

        let result = channel_account::Entity::update_many()
            .col_expr(
                channel_account::Column::CurrentTasks,
                Expr::col(channel_account::Column::CurrentTasks).add(1),
            )
            .filter(channel_account::Column::Id.eq(account.id))
            .filter(channel_account::Column::Status.eq(1))
            .exec(db)
            .await?;
        if result.rows_affected > 0 {
            debug!("账号认领成功: account={} channel={}", account.id, channel_id);
            return Ok(account);
        }
    }

    Err(ApiError::NoAvailableChannel)
}

/// 释放账号在途计数，current_tasks > 0 谓词保证不减成负数
pub async fn release_account(db: &DatabaseConnection, account_id: i32) -> Result<(), DbErr> {
    channel_account::Entity::update_many()
        .col_expr(
            channel_account::Column::CurrentTasks,
            Expr::col(channel_account::Column::CurrentTasks).sub(1),
        )
        .filter(channel_account::Column::Id.eq(account_id))
        .filter(channel_account::Column::CurrentTasks.gt(0))
        .exec(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capgate_entity::channel_capability::ResultMode;
    use capgate_migration::{Migrator, MigratorTrait};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, EntityTrait, Set};

    async fn setup() -> DatabaseConnection {
        // 内存库必须单连接，连接池里每个连接都是独立的内存数据库
        let mut option = sea_orm::ConnectOptions::new("sqlite::memory:");
        option.max_connections(1);
        let db = sea_orm::Database::connect(option).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn insert_channel(db: &DatabaseConnection, channel_type: &str, status: i32) -> i32 {
        let now = Utc::now().naive_utc();
        channel::ActiveModel {
            channel_type: Set(channel_type.into()),
            name: Set(channel_type.into()),
            base_url: Set("https://api.example.com".into()),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn insert_cc(db: &DatabaseConnection, channel_id: i32, code: &str, model: &str) -> i32 {
        let now = Utc::now().naive_utc();
        channel_capability::ActiveModel {
            channel_id: Set(channel_id),
            capability_code: Set(code.into()),
            model: Set(model.into()),
            name: Set(format!("{code}-{model}")),
            price: Set(1.0),
            price_unit: Set("request".into()),
            result_mode: Set(ResultMode::Poll),
            request_path: Set("/v1/jobs".into()),
            request_method: Set("POST".into()),
            content_type: Set("application/json".into()),
            auth_location: Set("header".into()),
            auth_key: Set("Authorization".into()),
            auth_value_prefix: Set("Bearer ".into()),
            poll_path: Set("/v1/jobs/{task_id}".into()),
            poll_method: Set("GET".into()),
            poll_interval: Set(5),
            poll_max_attempts: Set(60),
            status: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    async fn insert_account(
        db: &DatabaseConnection,
        channel_id: i32,
        weight: i32,
        current_tasks: i32,
        status: i32,
    ) -> i32 {
        let now = Utc::now().naive_utc();
        channel_account::ActiveModel {
            channel_id: Set(channel_id),
            name: Set("acc".into()),
            api_key: Set("sk-upstream".into()),
            weight: Set(weight),
            status: Set(status),
            current_tasks: Set(current_tasks),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_select_filters_disabled_channel() {
        let db = setup().await;
        let disabled = insert_channel(&db, "off", 0).await;
        let enabled = insert_channel(&db, "on", 1).await;
        insert_cc(&db, disabled, "text2img", "m1").await;
        insert_cc(&db, enabled, "text2img", "m1").await;

        let selection = select_channel_capability(&db, 1, "text2img", None, None).await.unwrap();
        assert_eq!(selection.channel.id, enabled);
    }

    #[tokio::test]
    async fn test_select_respects_token_priority() {
        let db = setup().await;
        let first = insert_channel(&db, "a", 1).await;
        let second = insert_channel(&db, "b", 1).await;
        insert_cc(&db, first, "text2img", "m1").await;
        insert_cc(&db, second, "text2img", "m1").await;

        // 不配置优先级时按配置 id 取第一个
        let selection = select_channel_capability(&db, 1, "text2img", None, None).await.unwrap();
        assert_eq!(selection.channel.id, first);

        // 令牌优先级指向第二个渠道
        let now = Utc::now().naive_utc();
        token_channel_priority::ActiveModel {
            token_id: Set(1),
            capability_code: Set("text2img".into()),
            channel_id: Set(second),
            priority: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();

        let selection = select_channel_capability(&db, 1, "text2img", None, None).await.unwrap();
        assert_eq!(selection.channel.id, second);
    }

    #[tokio::test]
    async fn test_select_model_not_found() {
        let db = setup().await;
        let id = insert_channel(&db, "a", 1).await;
        insert_cc(&db, id, "text2img", "m1").await;

        let err = select_channel_capability(&db, 1, "text2img", None, Some("m2"))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::ModelNotFound);
    }

    #[tokio::test]
    async fn test_claim_prefers_least_loaded_then_weight() {
        let db = setup().await;
        let channel_id = insert_channel(&db, "a", 1).await;
        let busy = insert_account(&db, channel_id, 10, 3, 1).await;
        let idle_light = insert_account(&db, channel_id, 5, 0, 1).await;
        let idle_heavy = insert_account(&db, channel_id, 20, 0, 1).await;

        // current_tasks 相同取权重更高的
        let claimed = claim_account(&db, channel_id).await.unwrap();
        assert_eq!(claimed.id, idle_heavy);
        assert_ne!(claimed.id, busy);
        assert_ne!(claimed.id, idle_light);

        // 认领后 current_tasks 已自增
        let account = channel_account::Entity::find_by_id(idle_heavy)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.current_tasks, 1);
    }

    #[tokio::test]
    async fn test_claim_skips_disabled_accounts() {
        let db = setup().await;
        let channel_id = insert_channel(&db, "a", 1).await;
        insert_account(&db, channel_id, 10, 0, 0).await;

        let err = claim_account(&db, channel_id).await.unwrap_err();
        assert_eq!(err, ApiError::NoAvailableChannel);
    }

    #[tokio::test]
    async fn test_release_never_goes_negative() {
        let db = setup().await;
        let channel_id = insert_channel(&db, "a", 1).await;
        let account_id = insert_account(&db, channel_id, 10, 1, 1).await;

        release_account(&db, account_id).await.unwrap();
        release_account(&db, account_id).await.unwrap();

        let account = channel_account::Entity::find_by_id(account_id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.current_tasks, 0);
    }
}
