//! 持久化作业队列实体
//!
//! 作业按优先级队列（critical/default/low）投递，run_at 支持延迟执行，
//! 至少一次语义由条件更新认领保证。

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// 作业类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(50))")]
pub enum JobKind {
    #[sea_orm(string_value = "task:submit")]
    Submit,
    #[sea_orm(string_value = "task:poll")]
    Poll,
    #[sea_orm(string_value = "task:upload")]
    Upload,
    #[sea_orm(string_value = "task:notify")]
    Notify,
    #[sea_orm(string_value = "task:timeout_check")]
    TimeoutCheck,
}

/// 作业状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum JobStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// 优先级队列，按 6:3:1 权重消费
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum QueueBand {
    #[sea_orm(string_value = "critical")]
    Critical,
    #[sea_orm(string_value = "default")]
    Default,
    #[sea_orm(string_value = "low")]
    Low,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub kind: JobKind,
    /// 作业数据（JSON）
    pub payload: String,
    pub queue: QueueBand,
    pub status: JobStatus,
    /// 重试次数
    pub retry_count: i32,
    /// 最早可执行时间
    pub run_at: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
