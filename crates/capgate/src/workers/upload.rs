//! upload 作业：把上游产物转存到网关自有存储，然后把任务推进到成功终态
//!
//! 未配置存储或产物无 URL 时直接以原始 URL 成功结束；
//! 下载或上传失败会把任务置为失败并触发退款。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use serde_json::{Map, Value};
use tokio_util::io::StreamReader;

use crate::context::AppContext;
use crate::error::ApiError;
use crate::queue::UploadPayload;
use crate::storage::storage_path;
use crate::task;

/// 产物下载/上传的总预算
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn handle_upload(ctx: &Arc<AppContext>, payload: UploadPayload) -> Result<()> {
    let Some(current) = task::get_by_id(&ctx.db, payload.task_id).await? else {
        warn!("upload 作业找不到任务: task_id={}", payload.task_id);
        return Ok(());
    };
    if current.status.is_terminal() {
        debug!("任务已终结，跳过转存: task_no={}", current.task_no);
        return Ok(());
    }

    let origin_url = if payload.origin_url.is_empty() {
        payload.urls.first().cloned().unwrap_or_default()
    } else {
        payload.origin_url.clone()
    };

    // 结果草稿优先（同步模式已写入映射后的结果），否则按产物 URL 组装
    let mut result = current
        .result
        .as_ref()
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_else(|| build_result(&origin_url, &payload.urls));

    let Some(storage) = ctx.storage.as_ref().filter(|_| !origin_url.is_empty()) else {
        // 不转存，保留原始 URL 直接成功
        task::complete_task(ctx, &current, result).await?;
        return Ok(());
    };

    let path = storage_path(&current.capability_code, &origin_url);

    let final_url = match transfer(ctx, storage.as_ref(), &origin_url, &path).await {
        Ok(url) => url,
        Err(e) => {
            let message = ApiError::UploadFailed(format!("{e:#}")).to_string();
            task::fail_task(ctx, current.id, &message).await?;
            return Ok(());
        }
    };

    rewrite_result_url(&mut result, &final_url);
    info!(
        "产物已转存: task_no={} origin={} final={}",
        current.task_no, origin_url, final_url
    );

    task::complete_task(ctx, &current, result).await?;
    Ok(())
}

/// 流式下载产物并写入存储，返回转存后的访问 URL
async fn transfer(
    ctx: &AppContext,
    storage: &dyn crate::storage::Storage,
    origin_url: &str,
    path: &str,
) -> Result<String> {
    let response = ctx
        .http
        .get(origin_url)
        .timeout(TRANSFER_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("download failed: {origin_url}"))?
        .error_for_status()
        .with_context(|| format!("download failed: {origin_url}"))?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
    storage
        .upload(Box::new(reader), path, &content_type)
        .await
        .context("write to storage failed")
}

fn build_result(origin_url: &str, urls: &[String]) -> Map<String, Value> {
    let mut result = Map::new();
    result.insert("url".to_string(), Value::String(origin_url.to_string()));
    if !urls.is_empty() {
        result.insert(
            "urls".to_string(),
            Value::Array(urls.iter().map(|u| Value::String(u.clone())).collect()),
        );
    }
    result
}

/// 把结果中的产物 URL 改写为转存后的地址
fn rewrite_result_url(result: &mut Map<String, Value>, final_url: &str) {
    let key = if result.contains_key("image_url") {
        "image_url"
    } else if result.contains_key("video_url") {
        "video_url"
    } else {
        "url"
    };
    result.insert(key.to_string(), Value::String(final_url.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_result() {
        let result = build_result("https://u/a.png", &["https://u/a.png".to_string()]);
        assert_eq!(result.get("url"), Some(&json!("https://u/a.png")));
        assert_eq!(result.get("urls"), Some(&json!(["https://u/a.png"])));
    }

    #[test]
    fn test_rewrite_result_url() {
        let mut result = json!({"image_url": "https://u/a.png", "seed": 1})
            .as_object()
            .unwrap()
            .clone();
        rewrite_result_url(&mut result, "https://cdn/b.png");
        assert_eq!(result.get("image_url"), Some(&json!("https://cdn/b.png")));
        assert_eq!(result.get("seed"), Some(&json!(1)));

        let mut result = json!({"text": "x"}).as_object().unwrap().clone();
        rewrite_result_url(&mut result, "https://cdn/c.png");
        assert_eq!(result.get("url"), Some(&json!("https://cdn/c.png")));
    }
}
