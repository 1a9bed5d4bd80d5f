//! 渠道能力配置数据库实体
//!
//! 一条记录描述一个渠道对一个能力的完整接入协议：请求方式、认证位置、
//! 结果模式（sync/poll/callback）、轮询配置以及四类映射配置。

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// 结果模式枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum ResultMode {
    /// 提交响应即为最终结果
    #[sea_orm(string_value = "sync")]
    Sync,
    /// 提交后由网关轮询进度
    #[sea_orm(string_value = "poll")]
    Poll,
    /// 提交后等待上游 webhook 回调
    #[sea_orm(string_value = "callback")]
    Callback,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_capability")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub channel_id: i32,
    pub capability_code: String,
    /// 模型标识
    pub model: String,
    /// 配置名称
    pub name: String,
    /// 单次调用价格
    pub price: f64,
    /// 计价单位
    pub price_unit: String,

    pub result_mode: ResultMode,
    /// 提交请求路径（拼接在渠道 base_url 之后）
    pub request_path: String,
    /// 请求方法，空串按 POST 处理
    pub request_method: String,
    /// 内容类型：application/json / application/x-www-form-urlencoded / multipart/form-data
    pub content_type: String,

    /// 认证位置：header / body / query
    pub auth_location: String,
    /// 认证参数名，空串按 Authorization 处理
    pub auth_key: String,
    /// 认证值前缀，如 "Bearer "
    pub auth_value_prefix: String,

    /// 轮询路径，支持 {task_id} 占位符
    pub poll_path: String,
    /// 轮询方法，空串按 GET 处理
    pub poll_method: String,
    /// 轮询间隔（秒）
    pub poll_interval: i32,
    /// 最大轮询次数
    pub poll_max_attempts: i32,
    pub poll_param_mapping: Option<Json>,
    pub poll_response_mapping: Option<Json>,

    pub param_mapping: Option<Json>,
    pub response_mapping: Option<Json>,
    pub callback_mapping: Option<Json>,
    pub extra_config: Option<Json>,

    /// 状态（1启用/0禁用）
    pub status: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
