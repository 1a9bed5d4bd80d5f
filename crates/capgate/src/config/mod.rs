use std::path::PathBuf;

use serde::{Deserialize, Serialize};

mod clap;
mod global;

pub use crate::config::clap::version;
pub use crate::config::global::{ARGS, CONFIG};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    /// HTTP 监听地址
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    /// 数据目录，sqlite 数据库文件所在位置
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerConfig {
    /// 作业执行并发数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 单个作业最大重试次数
    #[serde(default = "default_max_retry")]
    pub max_retry: i32,
    /// 重试延迟（秒）
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
}

/// 产物转存配置，root 为空时不启用转存
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// 转存后对外访问的 URL 前缀
    #[serde(default)]
    pub public_base_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// 控制台登录会话有效期（小时）
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retry: default_max_retry(),
            retry_backoff_seconds: default_retry_backoff(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_connections() -> u32 {
    20
}

fn default_concurrency() -> usize {
    8
}

fn default_max_retry() -> i32 {
    3
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_session_ttl_hours() -> u64 {
    24
}
