//! 进程终止信号监听

#[cfg(unix)]
pub async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("注册 SIGTERM 处理失败");
    let mut sigint = signal(SignalKind::interrupt()).expect("注册 SIGINT 处理失败");
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
pub async fn terminate() {
    tokio::signal::ctrl_c().await.expect("注册 Ctrl-C 处理失败");
}
