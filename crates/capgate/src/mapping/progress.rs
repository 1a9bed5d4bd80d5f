//! 上游响应到任务进度的映射
//!
//! 提交响应、轮询响应与回调请求体共用这一形态：配置里直接给出
//! task_id / status / progress / output_url / error 各自的 JSON 路径，
//! status_mapping 把上游状态串归一到封闭集合。

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::mapping::{extract_string, lookup_path};

/// 归一化后的上游任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Pending,
    Submitted,
    Processing,
    Success,
    Fail,
}

impl UpstreamStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "pending" => Some(UpstreamStatus::Pending),
            "submitted" => Some(UpstreamStatus::Submitted),
            "processing" => Some(UpstreamStatus::Processing),
            "success" => Some(UpstreamStatus::Success),
            "fail" | "failed" => Some(UpstreamStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProgressMapping {
    /// 上游任务ID的 JSON 路径
    #[serde(default)]
    pub task_id: String,
    /// 状态串的 JSON 路径
    #[serde(default)]
    pub status: String,
    /// 进度值的 JSON 路径
    #[serde(default)]
    pub progress: String,
    /// 产物 URL 的 JSON 路径
    #[serde(default)]
    pub output_url: String,
    /// 错误信息的 JSON 路径
    #[serde(default)]
    pub error: String,
    /// 上游状态串 -> pending/submitted/processing/success/fail
    #[serde(default)]
    pub status_mapping: HashMap<String, String>,
}

impl ProgressMapping {
    /// 从映射配置 JSON 解析，缺省时返回空映射
    pub fn from_config(config: Option<&Value>) -> Self {
        config
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

/// 一次提交/轮询/回调解析出的任务进展
#[derive(Debug, Clone, Default)]
pub struct ProgressOutcome {
    pub status: Option<UpstreamStatus>,
    pub progress: i32,
    pub urls: Vec<String>,
    pub error: String,
}

/// 提交响应的解析结果
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub vendor_task_id: String,
    pub outcome: ProgressOutcome,
}

/// 解析提交响应
pub fn parse_submit(body: &Value, mapping: &ProgressMapping) -> SubmitOutcome {
    SubmitOutcome {
        vendor_task_id: extract_path_string(body, &mapping.task_id),
        outcome: parse_progress(body, mapping),
    }
}

/// 解析进度形态的响应体
pub fn parse_progress(body: &Value, mapping: &ProgressMapping) -> ProgressOutcome {
    let status = if mapping.status.is_empty() {
        None
    } else {
        lookup_path(body, &mapping.status)
            .map(extract_string)
            .filter(|raw| !raw.is_empty())
            .map(|raw| map_status(&raw, &mapping.status_mapping))
    };

    let progress = if mapping.progress.is_empty() {
        0
    } else {
        lookup_path(body, &mapping.progress)
            .and_then(extract_int)
            .unwrap_or(0) as i32
    };

    let urls = extract_path_string(body, &mapping.output_url);
    let urls = if urls.is_empty() { vec![] } else { vec![urls] };

    ProgressOutcome {
        status,
        progress,
        urls,
        error: extract_path_string(body, &mapping.error),
    }
}

/// 解析回调请求体，返回进展与上游任务ID
pub fn parse_callback(body: &Value, mapping: &ProgressMapping) -> (ProgressOutcome, String) {
    let vendor_task_id = extract_path_string(body, &mapping.task_id);
    (parse_progress(body, mapping), vendor_task_id)
}

/// 应用 status_mapping 后解析到封闭集合，未知状态按 processing 处理
fn map_status(raw: &str, status_mapping: &HashMap<String, String>) -> UpstreamStatus {
    let mapped = status_mapping.get(raw).map(String::as_str).unwrap_or(raw);
    UpstreamStatus::parse(mapped).unwrap_or_else(|| {
        debug!("未知上游状态 {}，按 processing 处理", mapped);
        UpstreamStatus::Processing
    })
}

fn extract_path_string(body: &Value, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    lookup_path(body, path).map(extract_string).unwrap_or_default()
}

fn extract_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping() -> ProgressMapping {
        ProgressMapping::from_config(Some(&json!({
            "task_id": "data.id",
            "status": "data.state",
            "progress": "data.progress",
            "output_url": "data.url",
            "error": "data.message",
            "status_mapping": {"RUNNING": "processing", "DONE": "success", "ERROR": "fail"}
        })))
    }

    #[test]
    fn test_parse_submit() {
        let body = json!({"data": {"id": "u-1", "state": "RUNNING"}});
        let result = parse_submit(&body, &mapping());
        assert_eq!(result.vendor_task_id, "u-1");
        assert_eq!(result.outcome.status, Some(UpstreamStatus::Processing));
        assert!(result.outcome.urls.is_empty());
    }

    #[test]
    fn test_parse_progress_success() {
        let body = json!({"data": {"id": "u-1", "state": "DONE", "url": "https://u/a.png", "progress": 100}});
        let result = parse_progress(&body, &mapping());
        assert_eq!(result.status, Some(UpstreamStatus::Success));
        assert_eq!(result.progress, 100);
        assert_eq!(result.urls, vec!["https://u/a.png".to_string()]);
    }

    #[test]
    fn test_parse_progress_fail_with_error() {
        let body = json!({"data": {"state": "ERROR", "message": "nsfw content"}});
        let result = parse_progress(&body, &mapping());
        assert_eq!(result.status, Some(UpstreamStatus::Fail));
        assert_eq!(result.error, "nsfw content");
    }

    #[test]
    fn test_parse_callback() {
        let mapping = ProgressMapping::from_config(Some(&json!({
            "task_id": "jobId",
            "status": "state",
            "output_url": "url",
            "status_mapping": {"OK": "success"}
        })));
        let body = json!({"jobId": "u-2", "state": "OK", "url": "https://u/b.png"});
        let (outcome, vendor_task_id) = parse_callback(&body, &mapping);
        assert_eq!(vendor_task_id, "u-2");
        assert_eq!(outcome.status, Some(UpstreamStatus::Success));
        assert_eq!(outcome.urls, vec!["https://u/b.png".to_string()]);
    }

    #[test]
    fn test_numeric_task_id() {
        let body = json!({"data": {"id": 987654}});
        let result = parse_submit(&body, &mapping());
        assert_eq!(result.vendor_task_id, "987654");
    }

    #[test]
    fn test_unknown_status_treated_as_processing() {
        let body = json!({"data": {"state": "QUEUED_SOMEWHERE"}});
        let result = parse_progress(&body, &mapping());
        assert_eq!(result.status, Some(UpstreamStatus::Processing));
    }

    #[test]
    fn test_missing_status_path() {
        let body = json!({"data": {}});
        let result = parse_progress(&body, &mapping());
        assert_eq!(result.status, None);
    }

    #[test]
    fn test_progress_from_string() {
        let body = json!({"data": {"progress": "42"}});
        let result = parse_progress(&body, &mapping());
        assert_eq!(result.progress, 42);
    }
}
