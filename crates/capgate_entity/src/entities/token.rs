//! API 令牌数据库实体

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    /// API 密钥（唯一），序列化时不输出
    #[serde(skip_serializing)]
    pub key: String,
    /// 令牌名称
    pub name: String,
    /// 剩余额度
    pub balance: f64,
    /// 已使用额度
    pub total_used: f64,
    /// 速率限制（次/分钟）
    pub rate_limit: i32,
    /// 状态（1启用/0禁用）
    pub status: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
