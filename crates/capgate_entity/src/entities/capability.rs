//! 能力定义数据库实体（平台级）

use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};

/// 能力类型枚举
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum CapabilityType {
    #[sea_orm(string_value = "image")]
    Image,
    #[sea_orm(string_value = "video")]
    Video,
    #[sea_orm(string_value = "chat")]
    Chat,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "capability")]
pub struct Model {
    /// 能力编码，如 text2img / text2video
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    /// 能力名称
    pub name: String,
    #[sea_orm(column_name = "type")]
    pub capability_type: CapabilityType,
    pub description: String,
    /// 标准入参定义（JSON Schema，可选）
    pub standard_params: Option<Json>,
    /// 标准出参定义（JSON Schema，可选）
    pub standard_response: Option<Json>,
    /// 状态（1启用/0禁用）
    pub status: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
