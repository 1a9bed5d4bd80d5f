//! 渠道账号数据库实体

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel_account")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 所属渠道ID
    pub channel_id: i32,
    /// 账号名称
    pub name: String,
    /// API 密钥，序列化时不输出
    #[serde(skip_serializing)]
    pub api_key: String,
    /// 账号配置（JSON）
    pub config: Option<Json>,
    /// 负载均衡权重
    pub weight: i32,
    /// 状态（1启用/0禁用）
    pub status: i32,
    /// 当前在途任务数，任务创建时加一，终态时减一
    pub current_tasks: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
