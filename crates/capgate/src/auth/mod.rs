//! 认证
//!
//! /v1 调用面用 API 令牌（Bearer）鉴权，每次请求查库校验；
//! 控制台登录用内存会话缓存，过期即视为登出。

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use capgate_entity::{token, user};
use dashmap::DashMap;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::context::AppContext;
use crate::error::ApiError;

/// 控制台登录会话存储，key 为会话令牌
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

#[derive(Clone)]
struct Session {
    user_id: i32,
    expires_at: Instant,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登录成功后创建会话，返回会话令牌
    pub fn create(&self, user_id: i32) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let ttl = Duration::from_secs(CONFIG.auth.session_ttl_hours * 3600);
        self.sessions.insert(
            token.clone(),
            Session {
                user_id,
                expires_at: Instant::now() + ttl,
            },
        );
        token
    }

    /// 校验会话，过期条目顺手清除
    pub fn get(&self, token: &str) -> Option<i32> {
        let session = self.sessions.get(token)?;
        if session.expires_at < Instant::now() {
            drop(session);
            self.sessions.remove(token);
            return None;
        }
        Some(session.user_id)
    }

    /// 登出
    pub fn remove(&self, token: &str) {
        self.sessions.remove(token);
    }
}

/// 密码哈希（sha256 十六进制）
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// /v1 调用面鉴权中间件：Authorization: Bearer <token.key>
pub async fn token_auth(mut request: Request, next: Next) -> Response {
    let Some(ctx) = request.extensions().get::<Arc<AppContext>>().cloned() else {
        return ApiError::Internal("app context missing".to_string()).into_response();
    };

    let Some(key) = bearer_token(&request) else {
        return ApiError::InvalidToken.into_response();
    };

    let found = token::Entity::find()
        .filter(token::Column::Key.eq(key))
        .filter(token::Column::Status.eq(1))
        .one(&ctx.db)
        .await;

    match found {
        Ok(Some(token)) => {
            request.extensions_mut().insert(token);
            next.run(request).await
        }
        Ok(None) => ApiError::InvalidToken.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// 控制台鉴权中间件：Authorization 头携带登录会话令牌
pub async fn session_auth(mut request: Request, next: Next) -> Response {
    let Some(ctx) = request.extensions().get::<Arc<AppContext>>().cloned() else {
        return ApiError::Internal("app context missing".to_string()).into_response();
    };

    let session_token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").to_string());

    let Some(user_id) = session_token.and_then(|t| ctx.sessions.get(&t)) else {
        return ApiError::InvalidToken.into_response();
    };

    let found = user::Entity::find_by_id(user_id)
        .filter(user::Column::Status.eq(1))
        .one(&ctx.db)
        .await;

    match found {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => ApiError::InvalidToken.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = header.split_once(' ')?;
    if scheme != "Bearer" || key.is_empty() {
        return None;
    }
    Some(key.to_string())
}
