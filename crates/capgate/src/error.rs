use reqwest::StatusCode;
use thiserror::Error;

/// 业务错误，携带对外响应 envelope 中的数字错误码
///
/// 4xxxx 为客户端错误，5xxxx 为服务端错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("invalid or disabled token")]
    InvalidToken,
    #[error("insufficient quota: {0}")]
    InsufficientQuota(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    NotFound(String),
    #[error("no permission to access this task")]
    NoPermission,
    #[error("model not found")]
    ModelNotFound,
    #[error("no available channel")]
    NoAvailableChannel,
    #[error("provider error: {0}")]
    ProviderError(String),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        match self {
            ApiError::InvalidToken => 40001,
            ApiError::InsufficientQuota(_) => 40002,
            ApiError::InvalidParams(_) => 40003,
            ApiError::NotFound(_) => 40004,
            ApiError::NoPermission => 40005,
            ApiError::ModelNotFound => 40006,
            ApiError::NoAvailableChannel => 50001,
            ApiError::ProviderError(_) => 50002,
            ApiError::UploadFailed(_) => 50003,
            ApiError::Internal(_) => 50099,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientQuota(_) | ApiError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::ModelNotFound => StatusCode::NOT_FOUND,
            ApiError::NoPermission => StatusCode::FORBIDDEN,
            ApiError::NoAvailableChannel => StatusCode::BAD_REQUEST,
            ApiError::ProviderError(_) | ApiError::UploadFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::InvalidToken.code(), 40001);
        assert_eq!(ApiError::InsufficientQuota("x".into()).code(), 40002);
        assert_eq!(ApiError::InvalidParams("x".into()).code(), 40003);
        assert_eq!(ApiError::NotFound("task not found".into()).code(), 40004);
        assert_eq!(ApiError::NoPermission.code(), 40005);
        assert_eq!(ApiError::ModelNotFound.code(), 40006);
        assert_eq!(ApiError::NoAvailableChannel.code(), 50001);
        assert_eq!(ApiError::ProviderError("x".into()).code(), 50002);
        assert_eq!(ApiError::UploadFailed("x".into()).code(), 50003);
        assert_eq!(ApiError::Internal("x".into()).code(), 50099);
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ApiError::InvalidToken.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NoPermission.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal("x".into()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
