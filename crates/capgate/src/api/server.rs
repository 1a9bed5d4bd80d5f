use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handler::{
    cancel_task, current_user, get_task, health, invoke_capability, list_capabilities,
    list_capability_prices, list_channels, login, logout, upstream_callback, ApiDoc,
};
use crate::auth;
use crate::config::CONFIG;
use crate::context::AppContext;

pub async fn http_server(ctx: Arc<AppContext>, token: CancellationToken) -> Result<()> {
    // /v1 调用面，API 令牌鉴权
    let v1 = Router::new()
        .route("/v1/channels", get(list_channels))
        .route("/v1/capabilities", get(list_capabilities))
        .route("/v1/capabilities/prices", get(list_capability_prices))
        .route("/v1/capabilities/{capability}", post(invoke_capability))
        .route("/v1/tasks/{task_no}", get(get_task))
        .route("/v1/tasks/{task_no}/cancel", post(cancel_task))
        .route_layer(middleware::from_fn(auth::token_auth));

    // 控制台接口，登录会话鉴权
    let console = Router::new()
        .route("/api/user/me", get(current_user))
        .route_layer(middleware::from_fn(auth::session_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        // 上游回调入口，按渠道类型路由
        .route("/internal/callback/{channel_type}", post(upstream_callback))
        .merge(v1)
        .merge(console)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(Extension(ctx))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&CONFIG.server.bind)
        .await
        .with_context(|| format!("绑定监听地址失败: {}", CONFIG.server.bind))?;
    info!("HTTP 服务已启动: {}", CONFIG.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("HTTP 服务异常退出")?;

    Ok(())
}
