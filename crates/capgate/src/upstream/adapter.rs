//! 通用上游适配器
//!
//! 每个任务阶段由 (channel, channel_account, channel_capability) 物化一个
//! 适配器实例，提交/轮询/回调解析均由配置驱动，不存在按渠道硬编码的分支。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use capgate_entity::channel_request_log::RequestType;
use capgate_entity::{channel, channel_account, channel_capability};
use reqwest::{Method, Url};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::mapping::progress::{
    parse_callback, parse_progress, parse_submit, ProgressMapping, ProgressOutcome, SubmitOutcome,
};
use crate::mapping::value_to_string;
use crate::upstream::audit::{AuditRecord, AuditSink};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
const CONTENT_TYPE_MULTIPART: &str = "multipart/form-data";

/// 一次上游调用的错误
///
/// retryable 区分传输类错误（网络、超时、5xx，可交由队列重试）
/// 与确定性错误（4xx、配置坏掉，重试无意义）。
#[derive(Error, Debug)]
#[error("{message}")]
pub struct UpstreamCallError {
    pub retryable: bool,
    pub message: String,
}

impl UpstreamCallError {
    fn transport(message: String) -> Self {
        Self {
            retryable: true,
            message,
        }
    }

    fn fatal(message: String) -> Self {
        Self {
            retryable: false,
            message,
        }
    }
}

pub struct UpstreamAdapter {
    channel: channel::Model,
    account: channel_account::Model,
    cc: channel_capability::Model,
    client: reqwest::Client,
    audit: AuditSink,
    task_id: i32,
    task_no: String,
}

impl UpstreamAdapter {
    pub fn new(
        channel: channel::Model,
        account: channel_account::Model,
        cc: channel_capability::Model,
        client: reqwest::Client,
        audit: AuditSink,
        task_id: i32,
        task_no: String,
    ) -> Self {
        Self {
            channel,
            account,
            cc,
            client,
            audit,
            task_id,
            task_no,
        }
    }

    /// 提交任务到上游，返回解析结果与原始响应体
    pub async fn submit(
        &self,
        params: &Map<String, Value>,
    ) -> Result<(SubmitOutcome, Value), UpstreamCallError> {
        let url = format!("{}{}", self.channel.base_url, self.cc.request_path);
        let method = default_if_empty(&self.cc.request_method, "POST");

        let body = self
            .request_with_params(RequestType::Submit, &method, &url, params.clone())
            .await?;

        let raw: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let mapping = ProgressMapping::from_config(self.cc.response_mapping.as_ref());
        Ok((parse_submit(&raw, &mapping), raw))
    }

    /// 轮询上游任务进度，poll_path 中的 {task_id} 会被替换
    pub async fn poll(&self, vendor_task_id: &str) -> Result<ProgressOutcome, UpstreamCallError> {
        let poll_path = self.cc.poll_path.replace("{task_id}", vendor_task_id);
        let url = format!("{}{}", self.channel.base_url, poll_path);
        let method = default_if_empty(&self.cc.poll_method, "GET");

        let body = if method.eq_ignore_ascii_case("POST") {
            // POST 轮询：以 task_id 为种子参数，经轮询参数映射后发出
            let mut seed = Map::new();
            seed.insert("task_id".to_string(), Value::String(vendor_task_id.to_string()));
            let params = crate::mapping::param::map_params(&seed, self.cc.poll_param_mapping.as_ref())
                .map_err(|e| UpstreamCallError::fatal(format!("invalid poll param mapping: {e:#}")))?;
            self.request_with_params(RequestType::Poll, &method, &url, params)
                .await?
        } else {
            self.request_bare(RequestType::Poll, &method, &url).await?
        };

        let raw: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let mapping = ProgressMapping::from_config(
            self.cc
                .poll_response_mapping
                .as_ref()
                .or(self.cc.response_mapping.as_ref()),
        );
        Ok(parse_progress(&raw, &mapping))
    }

    fn auth_location(&self) -> &str {
        default_if_empty(&self.cc.auth_location, "header")
    }

    fn auth_key(&self) -> &str {
        default_if_empty(&self.cc.auth_key, "Authorization")
    }

    fn auth_value(&self) -> String {
        let prefix = if self.cc.auth_value_prefix.is_empty() && self.auth_location() == "header" {
            "Bearer "
        } else {
            self.cc.auth_value_prefix.as_str()
        };
        format!("{}{}", prefix, self.account.api_key)
    }

    /// query 认证在 URL 上追加 auth_key=api_key
    fn build_url(&self, url: &str) -> Result<Url, UpstreamCallError> {
        let mut url = Url::parse(url)
            .map_err(|e| UpstreamCallError::fatal(format!("invalid upstream url {url}: {e}")))?;
        if self.auth_location() == "query" {
            url.query_pairs_mut()
                .append_pair(self.auth_key(), &self.account.api_key);
        }
        Ok(url)
    }

    /// 携带参数的请求，body 按 content_type 编码
    async fn request_with_params(
        &self,
        request_type: RequestType,
        method: &str,
        url: &str,
        mut params: Map<String, Value>,
    ) -> Result<String, UpstreamCallError> {
        // body 认证把凭证注入请求参数
        if self.auth_location() == "body" {
            params.insert(self.auth_key().to_string(), Value::String(self.auth_value()));
        }

        let url = self.build_url(url)?;
        let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::POST);
        let mut request = self.client.request(method.clone(), url.clone()).timeout(REQUEST_TIMEOUT);

        let mut headers = HashMap::new();
        if self.auth_location() == "header" {
            headers.insert(self.auth_key().to_string(), self.auth_value());
            request = request.header(self.auth_key(), self.auth_value());
        }

        let request_body;
        match self.cc.content_type.as_str() {
            CONTENT_TYPE_FORM => {
                let form: HashMap<String, String> =
                    params.iter().map(|(k, v)| (k.clone(), value_to_string(v))).collect();
                request_body = serde_json::to_string(&form).unwrap_or_default();
                request = request.form(&form);
            }
            CONTENT_TYPE_MULTIPART => {
                let mut form = reqwest::multipart::Form::new();
                for (k, v) in &params {
                    form = form.text(k.clone(), value_to_string(v));
                }
                request_body = serde_json::to_string(&params).unwrap_or_default();
                request = request.multipart(form);
            }
            _ => {
                request_body = serde_json::to_string(&params).unwrap_or_default();
                request = request.json(&params);
            }
        }

        self.execute(request_type, method.as_str(), url.as_str(), headers, request_body, request)
            .await
    }

    /// 不带 body 的请求（GET 轮询）
    async fn request_bare(
        &self,
        request_type: RequestType,
        method: &str,
        url: &str,
    ) -> Result<String, UpstreamCallError> {
        let url = self.build_url(url)?;
        let method = Method::from_bytes(method.as_bytes()).unwrap_or(Method::GET);
        let mut request = self.client.request(method.clone(), url.clone()).timeout(REQUEST_TIMEOUT);

        let mut headers = HashMap::new();
        if self.auth_location() == "header" {
            headers.insert(self.auth_key().to_string(), self.auth_value());
            request = request.header(self.auth_key(), self.auth_value());
        }

        self.execute(request_type, method.as_str(), url.as_str(), headers, String::new(), request)
            .await
    }

    /// 发出请求并记录审计日志，HTTP >= 400 按可重试性分类后报错
    async fn execute(
        &self,
        request_type: RequestType,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        request_body: String,
        request: reqwest::RequestBuilder,
    ) -> Result<String, UpstreamCallError> {
        let start = Instant::now();
        let mut record = AuditRecord {
            task_id: self.task_id,
            task_no: self.task_no.clone(),
            channel_id: self.channel.id,
            account_id: self.account.id,
            capability_code: self.cc.capability_code.clone(),
            request_type,
            method: method.to_string(),
            url: url.to_string(),
            request_headers: serde_json::to_string(&headers).unwrap_or_default(),
            request_body,
            status_code: 0,
            response_body: String::new(),
            duration_ms: 0,
            error_message: String::new(),
        };

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                record.duration_ms = start.elapsed().as_millis() as i64;
                record.error_message = format!("{e:#}");
                self.audit.record(record);
                return Err(UpstreamCallError::transport(format!("request upstream failed: {e:#}")));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        record.status_code = status.as_u16() as i32;
        record.response_body = body.clone();
        record.duration_ms = start.elapsed().as_millis() as i64;
        if status.as_u16() >= 400 {
            record.error_message = format!("upstream returned {}", status.as_u16());
        }
        self.audit.record(record);

        if status.as_u16() >= 400 {
            let message = format!("upstream api error: status {}, body: {}", status.as_u16(), body);
            // 5xx 视为传输错误可重试，4xx 重试无意义
            return Err(if status.is_server_error() {
                UpstreamCallError::transport(message)
            } else {
                UpstreamCallError::fatal(message)
            });
        }

        Ok(body)
    }
}

/// 解析回调请求体：优先 callback_mapping，缺省回退 response_mapping
///
/// 两个映射都未配置时返回 None，回调匹配会跳过该配置。
pub fn parse_callback_body(
    cc: &channel_capability::Model,
    body: &Value,
) -> Option<(ProgressOutcome, String)> {
    let config = cc.callback_mapping.as_ref().or(cc.response_mapping.as_ref())?;
    let mapping = ProgressMapping::from_config(Some(config));
    Some(parse_callback(body, &mapping))
}

fn default_if_empty<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cc_with_mappings() -> channel_capability::Model {
        channel_capability::Model {
            id: 1,
            channel_id: 1,
            capability_code: "text2img".into(),
            model: "m1".into(),
            name: "test".into(),
            price: 1.0,
            price_unit: "request".into(),
            result_mode: channel_capability::ResultMode::Callback,
            request_path: "/v1/jobs".into(),
            request_method: "POST".into(),
            content_type: "application/json".into(),
            auth_location: "header".into(),
            auth_key: String::new(),
            auth_value_prefix: String::new(),
            poll_path: String::new(),
            poll_method: String::new(),
            poll_interval: 5,
            poll_max_attempts: 60,
            poll_param_mapping: None,
            poll_response_mapping: None,
            param_mapping: None,
            response_mapping: Some(json!({"task_id": "id", "status": "state"})),
            callback_mapping: Some(json!({
                "task_id": "jobId",
                "status": "state",
                "output_url": "url",
                "status_mapping": {"OK": "success"}
            })),
            extra_config: None,
            status: 1,
            created_at: Default::default(),
            updated_at: Default::default(),
        }
    }

    #[test]
    fn test_parse_callback_prefers_callback_mapping() {
        let cc = cc_with_mappings();
        let body = json!({"jobId": "u-2", "state": "OK", "url": "https://u/b.png"});
        let (outcome, vendor_task_id) = parse_callback_body(&cc, &body).unwrap();
        assert_eq!(vendor_task_id, "u-2");
        assert_eq!(
            outcome.status,
            Some(crate::mapping::progress::UpstreamStatus::Success)
        );
    }

    #[test]
    fn test_parse_callback_falls_back_to_response_mapping() {
        let mut cc = cc_with_mappings();
        cc.callback_mapping = None;
        let body = json!({"id": "u-3", "state": "processing"});
        let (_, vendor_task_id) = parse_callback_body(&cc, &body).unwrap();
        assert_eq!(vendor_task_id, "u-3");
    }

    #[test]
    fn test_parse_callback_skipped_without_mapping() {
        let mut cc = cc_with_mappings();
        cc.callback_mapping = None;
        cc.response_mapping = None;
        assert!(parse_callback_body(&cc, &json!({})).is_none());
    }
}
