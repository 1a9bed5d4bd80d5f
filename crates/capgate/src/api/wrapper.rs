use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;

/// 统一响应 envelope，code = 0 表示成功
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<serde_json::Value> {
            code: self.code(),
            message: self.to_string(),
            data: None,
        };
        (self.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let ok = ApiResponse::ok(serde_json::json!({"task_id": "t-1"}));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["code"], 0);
        assert_eq!(json["message"], "success");
        assert_eq!(json["data"]["task_id"], "t-1");

        let err = ApiResponse::<serde_json::Value> {
            code: 40002,
            message: "insufficient quota".into(),
            data: None,
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 40002);
        assert!(json.get("data").is_none());
    }
}
