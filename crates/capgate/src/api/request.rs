use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 能力列表筛选条件
#[derive(Deserialize, IntoParams, Default)]
pub struct ListCapabilitiesQuery {
    /// 按渠道类型筛选
    pub channel: Option<String>,
    /// 按能力类型筛选（image/video/chat/other）
    #[serde(rename = "type")]
    pub capability_type: Option<String>,
}
