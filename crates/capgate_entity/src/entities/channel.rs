//! 渠道数据库实体

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channel")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 渠道类型标识（唯一），用于回调路由匹配
    #[sea_orm(column_name = "type")]
    pub channel_type: String,
    /// 渠道名称
    pub name: String,
    /// 上游基础 URL
    pub base_url: String,
    /// 渠道配置（JSON）
    pub config: Option<Json>,
    /// 状态（1启用/0禁用）
    pub status: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
