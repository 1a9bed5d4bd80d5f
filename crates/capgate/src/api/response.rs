use capgate_entity::task::TaskStatus;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct InvokeResponse {
    /// 对外任务编号
    pub task_id: String,
    #[schema(value_type = String)]
    pub status: TaskStatus,
}

#[derive(Serialize, ToSchema)]
pub struct TaskView {
    pub task_id: String,
    #[schema(value_type = String)]
    pub status: TaskStatus,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cost: f64,
}

#[derive(Serialize, ToSchema)]
pub struct CancelResponse {
    pub message: String,
}

/// 能力及其可用渠道
#[derive(Serialize, ToSchema)]
pub struct CapabilityItem {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    pub description: String,
    pub channels: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CapabilityPriceItem {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub capability_type: String,
    pub description: String,
    pub prices: Vec<ChannelPrice>,
}

#[derive(Serialize, ToSchema)]
pub struct ChannelPrice {
    pub channel: String,
    pub model: String,
    pub price: f64,
    pub price_unit: String,
}

/// 上游回调的应答，无论是否匹配都返回 2xx
#[derive(Serialize, ToSchema)]
pub struct CallbackAck {
    pub received: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Serialize, ToSchema)]
pub struct UserView {
    pub id: i32,
    pub username: String,
    pub role: String,
    pub balance: f64,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
