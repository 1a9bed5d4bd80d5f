//! 任务数据库实体

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// 任务状态枚举，success / failed / cancelled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl TaskStatus {
    /// 是否处于终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// 调用方回调投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "task")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 对外任务编号（唯一）
    pub task_no: String,
    pub user_id: i32,
    pub token_id: i32,
    pub capability_code: String,
    pub channel_id: i32,
    pub channel_capability_id: i32,
    pub account_id: i32,
    /// 上游任务ID，提交成功后写入
    pub vendor_task_id: String,

    pub status: TaskStatus,
    /// 进度（0-100）
    pub progress: i32,

    /// 调用方回调地址
    pub callback_url: String,
    pub callback_status: Option<CallbackStatus>,
    pub callback_attempts: i32,

    /// 原始请求参数
    pub request_params: Option<Json>,
    /// 映射后发往上游的参数
    pub mapped_params: Option<Json>,
    /// 上游原始响应
    pub vendor_response: Option<Json>,
    /// 统一结果
    pub result: Option<Json>,
    pub error_message: String,

    /// 扣费金额，入账时定价，后续价格变更不影响
    pub cost: f64,
    /// 是否已退款
    pub refunded: bool,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
