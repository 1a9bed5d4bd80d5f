pub mod signal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub fn init_logger(log_level: &str) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
            "%b %d %H:%M:%S".to_owned(),
        ))
        .with_filter(tracing_subscriber::EnvFilter::builder().parse_lossy(log_level));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .expect("初始化日志失败");
}
