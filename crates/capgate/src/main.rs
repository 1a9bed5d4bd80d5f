#[macro_use]
extern crate tracing;

mod api;
mod auth;
mod billing;
mod config;
mod context;
mod database;
mod error;
mod mapping;
mod queue;
mod selector;
mod storage;
mod task;
mod upstream;
mod utils;
mod workers;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::auth::SessionStore;
use crate::config::{ARGS, CONFIG};
use crate::context::AppContext;
use crate::database::setup_database;
use crate::utils::init_logger;
use crate::utils::signal::terminate;

#[tokio::main]
async fn main() -> Result<()> {
    init();

    let connection = setup_database().await?;

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let audit = upstream::audit::spawn_audit_writer(connection.clone(), &tracker, token.clone());
    let storage = storage::init_storage(&CONFIG.storage)?;
    let ctx = Arc::new(AppContext::new(connection, audit, storage, SessionStore::new()));

    spawn_task(
        "作业worker池",
        queue::worker::worker_pool(ctx.clone(), token.clone()),
        &tracker,
        token.clone(),
    );
    spawn_task(
        "超时巡检调度",
        queue::worker::timeout_scheduler(ctx.clone(), token.clone()),
        &tracker,
        token.clone(),
    );
    spawn_task(
        "HTTP服务",
        api::server::http_server(ctx, token.clone()),
        &tracker,
        token.clone(),
    );

    tracker.close();
    handle_shutdown(tracker, token).await;
    Ok(())
}

/// 将任务纳入 tracker 管理：任务意外结束时取消其它任务
fn spawn_task(
    task_name: &'static str,
    task: impl Future<Output = Result<()>> + Send + 'static,
    tracker: &TaskTracker,
    token: CancellationToken,
) {
    tracker.spawn(async move {
        tokio::select! {
            res = task => {
                if token.is_cancelled() {
                    info!("「{}」正常退出", task_name);
                } else {
                    error!("「{}」异常结束，返回结果为：「{:?}」，取消其它仍在执行的任务..", task_name, res);
                    token.cancel();
                }
            },
            _ = token.cancelled() => {
                info!("「{}」接收到取消信号，终止运行..", task_name);
            }
        }
    });
}

/// 初始化日志系统，打印欢迎信息
fn init() {
    init_logger(&ARGS.log_level);
    info!("欢迎使用 CapGate，当前程序版本：{}", config::version());
    debug!("系统初始化完成，日志级别: {}", ARGS.log_level);
}

async fn handle_shutdown(tracker: TaskTracker, token: CancellationToken) {
    tokio::select! {
        _ = tracker.wait() => {
            info!("所有任务均已终止，程序退出");
        }
        _ = terminate() => {
            info!("接收到终止信号，正在终止任务..");
            token.cancel();
            tracker.wait().await;
            info!("所有任务均已终止，程序退出");
        }
    }
}
