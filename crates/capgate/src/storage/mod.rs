//! 产物转存后端
//!
//! 上游返回的产物 URL 往往有时效，成功任务可以把产物搬运到
//! 网关自有存储。后端是一个 trait 口子，当前提供本地磁盘实现。

mod local;

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::config::StorageConfig;
pub use local::LocalStorage;

#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// 写入一个对象，返回对外访问 URL
    async fn upload(
        &self,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        path: &str,
        content_type: &str,
    ) -> Result<String>;

    /// 删除一个对象
    async fn delete(&self, path: &str) -> Result<()>;

    /// 对象的访问 URL
    fn url(&self, path: &str) -> String;
}

/// 按配置初始化存储后端，未配置时返回 None（任务保留原始 URL）
pub fn init_storage(config: &StorageConfig) -> Result<Option<Arc<dyn Storage>>> {
    let Some(root) = &config.root else {
        info!("未配置产物存储，任务结果将保留上游原始 URL");
        return Ok(None);
    };
    let storage = LocalStorage::new(root.clone(), config.public_base_url.clone())?;
    info!("本地产物存储已启用: {}", root.display());
    Ok(Some(Arc::new(storage)))
}

/// 生成存储路径：{能力编码}/YYYY/MM/DD/{uuid}{ext}
///
/// 扩展名取自 URL，取不到或异常时按能力类型回退（video -> .mp4，其余 .png）
pub fn storage_path(capability_code: &str, origin_url: &str) -> String {
    let mut ext = origin_url
        .rsplit('/')
        .next()
        .and_then(|name| {
            let name = name.split('?').next().unwrap_or(name);
            name.rfind('.').map(|idx| name[idx..].to_string())
        })
        .unwrap_or_default();

    if ext.is_empty() || ext.len() > 10 {
        ext = if capability_code.contains("video") {
            ".mp4".to_string()
        } else {
            ".png".to_string()
        };
    }

    format!(
        "{}/{}/{}{}",
        capability_code,
        Utc::now().format("%Y/%m/%d"),
        Uuid::new_v4(),
        ext
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_path_ext_from_url() {
        let path = storage_path("text2img", "https://u/files/a.png?sign=xyz");
        assert!(path.starts_with("text2img/"));
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn test_storage_path_video_fallback() {
        let path = storage_path("text2video", "https://u/stream/output");
        assert!(path.ends_with(".mp4"));
    }

    #[test]
    fn test_storage_path_image_fallback() {
        let path = storage_path("text2img", "https://u/result");
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn test_storage_path_rejects_long_ext() {
        let path = storage_path("text2img", "https://u/a.superlongextension");
        assert!(path.ends_with(".png"));
    }
}
