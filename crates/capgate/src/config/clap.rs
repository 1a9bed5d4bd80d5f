use clap::Parser;

#[derive(Parser)]
#[command(name = "capgate", version = version())]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "configs/config.toml")]
    pub config: std::path::PathBuf,

    /// 日志级别
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
