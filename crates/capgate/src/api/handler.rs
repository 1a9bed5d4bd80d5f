use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::Json;
use capgate_entity::channel_capability::ResultMode;
use capgate_entity::channel_request_log::RequestType;
use capgate_entity::job_queue::{JobKind, QueueBand};
use capgate_entity::{capability, channel, channel_capability, token, user};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::{Map, Value};
use utoipa::OpenApi;

use crate::api::request::{ListCapabilitiesQuery, LoginRequest};
use crate::api::response::{
    CallbackAck, CancelResponse, CapabilityItem, CapabilityPriceItem, ChannelPrice, InvokeResponse,
    LoginResponse, MessageResponse, TaskView, UserView,
};
use crate::api::wrapper::ApiResponse;
use crate::auth::hash_password;
use crate::billing::{self, BillingError};
use crate::context::AppContext;
use crate::error::ApiError;
use crate::mapping::param::map_params;
use crate::mapping::progress::UpstreamStatus;
use crate::queue::{self, SubmitPayload, UploadPayload};
use crate::selector;
use crate::task;
use crate::upstream::adapter::parse_callback_body;
use crate::upstream::AuditRecord;

#[derive(OpenApi)]
#[openapi(paths(
    invoke_capability,
    get_task,
    cancel_task,
    list_capabilities,
    list_capability_prices,
    list_channels
))]
pub struct ApiDoc;

/// 调用能力接口
///
/// 请求体为自由形态参数对象，channel / model / callback_url 三个键
/// 会被摘出作为路由与回调配置，不会透传给上游。
#[utoipa::path(
    post,
    path = "/v1/capabilities/{capability}",
    responses(
        (status = 200, body = ApiResponse<InvokeResponse>),
    )
)]
pub async fn invoke_capability(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(token): Extension<token::Model>,
    Path(capability): Path<String>,
    Json(mut params): Json<Map<String, Value>>,
) -> Result<ApiResponse<InvokeResponse>, ApiError> {
    let channel_hint = take_string(&mut params, "channel");
    let model_hint = take_string(&mut params, "model");
    let callback_url = take_string(&mut params, "callback_url").unwrap_or_default();

    // 1. 选择渠道能力配置
    let selection = selector::select_channel_capability(
        &ctx.db,
        token.id,
        &capability,
        channel_hint.as_deref(),
        model_hint.as_deref(),
    )
    .await?;
    let cc = selection.cc;
    let channel = selection.channel;

    // 2. 预扣费，余额不足直接拒绝，不落任务
    let charged = cc.price > 0.0;
    if charged {
        billing::deduct(&ctx.db, token.id, token.user_id, cc.price)
            .await
            .map_err(|e| match e {
                BillingError::Db(e) => ApiError::from(e),
                other => ApiError::InsufficientQuota(other.to_string()),
            })?;
    }

    // 3. 认领账号，失败时退回扣费
    let account = match selector::claim_account(&ctx.db, channel.id).await {
        Ok(account) => account,
        Err(e) => {
            rollback_charge(&ctx, &token, charged, cc.price).await;
            return Err(e);
        }
    };

    // 4. 参数映射
    let mapped = match map_params(&params, cc.param_mapping.as_ref()) {
        Ok(mapped) => mapped,
        Err(e) => {
            rollback_charge(&ctx, &token, charged, cc.price).await;
            let _ = selector::release_account(&ctx.db, account.id).await;
            return Err(ApiError::InvalidParams(format!("param mapping failed: {e:#}")));
        }
    };

    // 5. 落任务
    let created = match task::create_task(
        &ctx.db,
        task::NewTask {
            user_id: token.user_id,
            token_id: token.id,
            capability_code: capability.clone(),
            channel_id: channel.id,
            channel_capability_id: cc.id,
            account_id: account.id,
            callback_url,
            request_params: params,
            mapped_params: mapped,
            cost: cc.price,
        },
    )
    .await
    {
        Ok(created) => created,
        Err(e) => {
            rollback_charge(&ctx, &token, charged, cc.price).await;
            let _ = selector::release_account(&ctx.db, account.id).await;
            return Err(e.into());
        }
    };

    // 6. 投递提交作业
    if let Err(e) = queue::enqueue(
        &ctx.db,
        JobKind::Submit,
        QueueBand::Critical,
        &SubmitPayload { task_id: created.id },
    )
    .await
    {
        let _ = task::fail_task(&ctx, created.id, "enqueue submit job failed").await;
        return Err(ApiError::Internal(format!("enqueue failed: {e:#}")));
    }

    Ok(ApiResponse::ok(InvokeResponse {
        task_id: created.task_no,
        status: created.status,
    }))
}

/// 查询任务（仅任务所有者可见）
#[utoipa::path(
    get,
    path = "/v1/tasks/{task_no}",
    responses(
        (status = 200, body = ApiResponse<TaskView>),
    )
)]
pub async fn get_task(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(token): Extension<token::Model>,
    Path(task_no): Path<String>,
) -> Result<ApiResponse<TaskView>, ApiError> {
    let found = task::get_by_no(&ctx.db, &task_no)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::NotFound("task not found".to_string()))?;
    if found.user_id != token.user_id {
        return Err(ApiError::NoPermission);
    }

    Ok(ApiResponse::ok(TaskView {
        task_id: found.task_no,
        status: found.status,
        progress: found.progress,
        result: found.result,
        error: if found.error_message.is_empty() {
            None
        } else {
            Some(found.error_message)
        },
        cost: found.cost,
    }))
}

/// 取消任务，仅 pending / processing 可取消
#[utoipa::path(
    post,
    path = "/v1/tasks/{task_no}/cancel",
    responses(
        (status = 200, body = ApiResponse<CancelResponse>),
    )
)]
pub async fn cancel_task(
    Extension(ctx): Extension<Arc<AppContext>>,
    Extension(token): Extension<token::Model>,
    Path(task_no): Path<String>,
) -> Result<ApiResponse<CancelResponse>, ApiError> {
    task::cancel_task(&ctx, &task_no, token.user_id).await?;
    Ok(ApiResponse::ok(CancelResponse {
        message: "task cancelled".to_string(),
    }))
}

/// 列出可用能力及各自支持的渠道
#[utoipa::path(
    get,
    path = "/v1/capabilities",
    params(ListCapabilitiesQuery),
    responses(
        (status = 200, body = ApiResponse<Vec<CapabilityItem>>),
    )
)]
pub async fn list_capabilities(
    Extension(ctx): Extension<Arc<AppContext>>,
    Query(query): Query<ListCapabilitiesQuery>,
) -> Result<ApiResponse<Vec<CapabilityItem>>, ApiError> {
    let mut cap_query = capability::Entity::find().filter(capability::Column::Status.eq(1));
    if let Some(capability_type) = &query.capability_type {
        cap_query = cap_query.filter(capability::Column::CapabilityType.eq(capability_type.as_str()));
    }
    let capabilities = cap_query.order_by_asc(capability::Column::Code).all(&ctx.db).await?;

    let channel_map = enabled_channel_types(&ctx).await?;

    let mut cc_query = channel_capability::Entity::find().filter(channel_capability::Column::Status.eq(1));
    if let Some(channel_type) = &query.channel {
        let channel = channel::Entity::find()
            .filter(channel::Column::ChannelType.eq(channel_type.as_str()))
            .filter(channel::Column::Status.eq(1))
            .one(&ctx.db)
            .await?
            .ok_or(ApiError::NotFound("channel not found".to_string()))?;
        cc_query = cc_query.filter(channel_capability::Column::ChannelId.eq(channel.id));
    }
    let channel_caps = cc_query.all(&ctx.db).await?;

    let mut cap_channels: HashMap<String, Vec<String>> = HashMap::new();
    for cc in &channel_caps {
        if let Some(channel_type) = channel_map.get(&cc.channel_id) {
            cap_channels
                .entry(cc.capability_code.clone())
                .or_default()
                .push(channel_type.clone());
        }
    }

    let items = capabilities
        .into_iter()
        .filter_map(|item| {
            let channels = cap_channels.remove(&item.code).unwrap_or_default();
            // 按渠道筛选时跳过没有配置的能力
            if query.channel.is_some() && channels.is_empty() {
                return None;
            }
            Some(CapabilityItem {
                code: item.code,
                name: item.name,
                capability_type: capability_type_tag(&item.capability_type),
                description: item.description,
                channels,
            })
        })
        .collect();

    Ok(ApiResponse::ok(items))
}

/// 能力价格列表
#[utoipa::path(
    get,
    path = "/v1/capabilities/prices",
    responses(
        (status = 200, body = ApiResponse<Vec<CapabilityPriceItem>>),
    )
)]
pub async fn list_capability_prices(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<ApiResponse<Vec<CapabilityPriceItem>>, ApiError> {
    let capabilities = capability::Entity::find()
        .filter(capability::Column::Status.eq(1))
        .order_by_asc(capability::Column::Code)
        .all(&ctx.db)
        .await?;

    let channel_map = enabled_channel_types(&ctx).await?;

    let channel_caps = channel_capability::Entity::find()
        .filter(channel_capability::Column::Status.eq(1))
        .all(&ctx.db)
        .await?;

    let mut cap_prices: HashMap<String, Vec<ChannelPrice>> = HashMap::new();
    for cc in channel_caps {
        let Some(channel_type) = channel_map.get(&cc.channel_id) else {
            continue;
        };
        cap_prices.entry(cc.capability_code.clone()).or_default().push(ChannelPrice {
            channel: channel_type.clone(),
            model: cc.model,
            price: cc.price,
            price_unit: cc.price_unit,
        });
    }

    let items = capabilities
        .into_iter()
        .map(|item| CapabilityPriceItem {
            prices: cap_prices.remove(&item.code).unwrap_or_default(),
            code: item.code,
            name: item.name,
            capability_type: capability_type_tag(&item.capability_type),
            description: item.description,
        })
        .collect();

    Ok(ApiResponse::ok(items))
}

/// 列出可用渠道类型
#[utoipa::path(
    get,
    path = "/v1/channels",
    responses(
        (status = 200, body = ApiResponse<Vec<String>>),
    )
)]
pub async fn list_channels(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    let channels = channel::Entity::find()
        .filter(channel::Column::Status.eq(1))
        .order_by_asc(channel::Column::Id)
        .all(&ctx.db)
        .await?;
    Ok(ApiResponse::ok(channels.into_iter().map(|c| c.channel_type).collect()))
}

/// 上游 webhook 入口
///
/// 遍历该渠道下 callback 模式的能力配置逐个尝试解析，
/// 第一个解析出且能匹配到任务的上游任务ID胜出。
/// 无论是否匹配都返回 2xx，避免上游反复重投。
pub async fn upstream_callback(
    Extension(ctx): Extension<Arc<AppContext>>,
    Path(channel_type): Path<String>,
    Json(body): Json<Value>,
) -> Result<ApiResponse<CallbackAck>, ApiError> {
    let channel = channel::Entity::find()
        .filter(channel::Column::ChannelType.eq(channel_type.as_str()))
        .one(&ctx.db)
        .await?
        .ok_or(ApiError::NotFound("channel not found".to_string()))?;

    info!("收到上游回调: channel={}", channel.channel_type);

    let channel_caps = channel_capability::Entity::find()
        .filter(channel_capability::Column::ChannelId.eq(channel.id))
        .filter(channel_capability::Column::ResultMode.eq(ResultMode::Callback))
        .all(&ctx.db)
        .await?;

    let mut matched: Option<(capgate_entity::task::Model, _)> = None;
    for cc in &channel_caps {
        let Some((outcome, vendor_task_id)) = parse_callback_body(cc, &body) else {
            continue;
        };
        if vendor_task_id.is_empty() {
            continue;
        }
        let Some(found) = task::get_by_vendor(&ctx.db, &vendor_task_id, cc.id).await? else {
            continue;
        };
        matched = Some((found, outcome));
        break;
    }

    let Some((found, outcome)) = matched else {
        warn!("上游回调未匹配到任务: channel={}", channel.channel_type);
        audit_callback_in(&ctx, &channel, None, &body);
        return Ok(ApiResponse::ok(CallbackAck {
            received: true,
            matched: false,
            task_id: None,
        }));
    };

    audit_callback_in(&ctx, &channel, Some(&found), &body);

    // 回调驱动的完成进 critical 队列
    match outcome.status {
        Some(UpstreamStatus::Success) => {
            task::update_progress(&ctx.db, found.id, 100).await.map_err(ApiError::from)?;
            let origin_url = outcome.urls.first().cloned().unwrap_or_default();
            queue::enqueue(
                &ctx.db,
                JobKind::Upload,
                QueueBand::Critical,
                &UploadPayload {
                    task_id: found.id,
                    origin_url,
                    urls: outcome.urls,
                },
            )
            .await
            .map_err(ApiError::from)?;
        }
        Some(UpstreamStatus::Fail) => {
            let message = if outcome.error.is_empty() {
                "upstream reported failure".to_string()
            } else {
                outcome.error
            };
            task::fail_task(&ctx, found.id, &message).await.map_err(ApiError::from)?;
        }
        _ => {
            task::update_progress(&ctx.db, found.id, outcome.progress)
                .await
                .map_err(ApiError::from)?;
        }
    }

    Ok(ApiResponse::ok(CallbackAck {
        received: true,
        matched: true,
        task_id: Some(found.task_no),
    }))
}

/// 控制台登录
pub async fn login(
    Extension(ctx): Extension<Arc<AppContext>>,
    Json(request): Json<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(request.username.as_str()))
        .filter(user::Column::Status.eq(1))
        .one(&ctx.db)
        .await?;
    let Some(found) = found else {
        return Err(ApiError::InvalidParams("invalid username or password".to_string()));
    };
    if found.password != hash_password(&request.password) {
        return Err(ApiError::InvalidParams("invalid username or password".to_string()));
    }

    let session = ctx.sessions.create(found.id);
    info!("用户登录: username={}", found.username);
    Ok(ApiResponse::ok(LoginResponse {
        token: session,
        user: user_view(found),
    }))
}

/// 控制台登出
pub async fn logout(
    Extension(ctx): Extension<Arc<AppContext>>,
    headers: axum::http::HeaderMap,
) -> ApiResponse<MessageResponse> {
    if let Some(session) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer "))
    {
        ctx.sessions.remove(session);
    }
    ApiResponse::ok(MessageResponse {
        message: "ok".to_string(),
    })
}

/// 当前登录用户信息
pub async fn current_user(Extension(user): Extension<user::Model>) -> ApiResponse<UserView> {
    ApiResponse::ok(user_view(user))
}

pub async fn health() -> ApiResponse<MessageResponse> {
    ApiResponse::ok(MessageResponse {
        message: "ok".to_string(),
    })
}

fn user_view(user: user::Model) -> UserView {
    UserView {
        id: user.id,
        username: user.username,
        role: match user.role {
            capgate_entity::user::UserRole::Admin => "admin".to_string(),
            capgate_entity::user::UserRole::User => "user".to_string(),
        },
        balance: user.balance,
    }
}

/// 启用渠道的 id -> 类型映射
async fn enabled_channel_types(ctx: &AppContext) -> Result<HashMap<i32, String>, ApiError> {
    Ok(channel::Entity::find()
        .filter(channel::Column::Status.eq(1))
        .all(&ctx.db)
        .await?
        .into_iter()
        .map(|c| (c.id, c.channel_type))
        .collect())
}

fn capability_type_tag(capability_type: &capgate_entity::capability::CapabilityType) -> String {
    use capgate_entity::capability::CapabilityType;
    match capability_type {
        CapabilityType::Image => "image",
        CapabilityType::Video => "video",
        CapabilityType::Chat => "chat",
        CapabilityType::Other => "other",
    }
    .to_string()
}

fn take_string(params: &mut Map<String, Value>, key: &str) -> Option<String> {
    params
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty())
}

async fn rollback_charge(ctx: &AppContext, token: &token::Model, charged: bool, amount: f64) {
    if !charged {
        return;
    }
    if let Err(e) = billing::refund(&ctx.db, token.id, token.user_id, amount).await {
        error!("预扣费回退失败: token={} amount={} 错误: {:#}", token.id, amount, e);
    }
}

fn audit_callback_in(
    ctx: &AppContext,
    channel: &channel::Model,
    matched: Option<&capgate_entity::task::Model>,
    body: &Value,
) {
    ctx.audit.record(AuditRecord {
        task_id: matched.map(|t| t.id).unwrap_or_default(),
        task_no: matched.map(|t| t.task_no.clone()).unwrap_or_default(),
        channel_id: channel.id,
        account_id: matched.map(|t| t.account_id).unwrap_or_default(),
        capability_code: matched.map(|t| t.capability_code.clone()).unwrap_or_default(),
        request_type: RequestType::CallbackIn,
        method: "POST".to_string(),
        url: format!("/internal/callback/{}", channel.channel_type),
        request_headers: String::new(),
        request_body: body.to_string(),
        status_code: 200,
        response_body: String::new(),
        duration_ms: 0,
        error_message: if matched.is_none() {
            "no matching task".to_string()
        } else {
            String::new()
        },
    });
}
