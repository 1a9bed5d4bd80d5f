use clap::Parser;
use once_cell::sync::Lazy;

use crate::config::clap::Args;
use crate::config::Config;

pub static ARGS: Lazy<Args> = Lazy::new(Args::parse);

/// 全局配置，启动时从 TOML 加载一次
/// 渠道、能力等业务配置均在数据库中，不在此列
pub static CONFIG: Lazy<Config> = Lazy::new(load_config);

fn load_config() -> Config {
    match std::fs::read_to_string(&ARGS.config) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("配置文件解析失败: {e:#}，使用默认配置");
                Config::default()
            }
        },
        Err(_) => {
            eprintln!("未找到配置文件 {}，使用默认配置", ARGS.config.display());
            Config::default()
        }
    }
}
