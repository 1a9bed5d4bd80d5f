//! 渠道请求审计日志实体，仅追加，异步写入

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// 出入站请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    /// 提交任务到上游
    #[sea_orm(string_value = "submit")]
    Submit,
    /// 轮询任务进度
    #[sea_orm(string_value = "poll")]
    Poll,
    /// 上游打入的回调
    #[sea_orm(string_value = "callback_in")]
    CallbackIn,
    /// 发往调用方的回调通知
    #[sea_orm(string_value = "callback_out")]
    CallbackOut,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_request_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub task_id: i32,
    pub task_no: String,
    pub channel_id: i32,
    pub account_id: i32,
    pub capability_code: String,

    pub request_type: RequestType,
    pub method: String,
    pub url: String,
    /// 请求头（JSON）
    pub request_headers: String,
    pub request_body: String,

    pub status_code: i32,
    pub response_body: String,
    /// 耗时（毫秒）
    pub duration_ms: i64,
    /// 网络级错误信息（非业务错误）
    pub error_message: String,
    pub request_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
