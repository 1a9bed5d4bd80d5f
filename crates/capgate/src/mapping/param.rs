//! 标准入参到上游入参的映射

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::mapping::{convert_type, value_to_string, TypeConversion};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ParamMapping {
    /// 字段重命名：标准名 -> 上游名
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    /// 枚举值重映射（仅对字符串值生效）
    #[serde(default)]
    pub value_mapping: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub type_convert: HashMap<String, TypeConversion>,
    /// 无条件注入的固定参数
    #[serde(default)]
    pub fixed_params: Map<String, Value>,
    /// 模板参数，如 "{width}x{height}"，引用的键缺失时整项省略
    #[serde(default)]
    pub computed_params: HashMap<String, String>,
    #[serde(default)]
    pub param_rules: HashMap<String, ParamRule>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ParamRule {
    /// 输入中出现任一排斥字段时跳过该字段
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// 将统一参数映射为上游参数
///
/// 顺序：固定参数 -> 逐字段（规则/重命名/值映射/类型转换）-> 计算参数。
/// 未配置映射时原样透传。
pub fn map_params(standard: &Map<String, Value>, mapping: Option<&Value>) -> Result<Map<String, Value>> {
    let Some(raw) = mapping.filter(|v| !v.is_null()) else {
        return Ok(standard.clone());
    };

    let mapping: ParamMapping =
        serde_json::from_value(raw.clone()).context("invalid param mapping config")?;

    let mut result = Map::new();

    // 1. 固定参数
    for (k, v) in &mapping.fixed_params {
        result.insert(k.clone(), v.clone());
    }

    // 2. 逐字段映射
    for (std_field, value) in standard {
        if let Some(rule) = mapping.param_rules.get(std_field) {
            if rule.excludes.iter().any(|ex| standard.contains_key(ex)) {
                continue;
            }
        }

        let target = mapping
            .field_mapping
            .get(std_field)
            .cloned()
            .unwrap_or_else(|| std_field.clone());

        let mut final_value = value.clone();
        if let Some(value_map) = mapping.value_mapping.get(std_field) {
            if let Value::String(s) = &final_value {
                if let Some(mapped) = value_map.get(s) {
                    final_value = Value::String(mapped.clone());
                }
            }
        }

        if let Some(conv) = mapping.type_convert.get(std_field) {
            final_value = convert_type(final_value, conv);
        }

        result.insert(target, final_value);
    }

    // 3. 计算参数
    for (target, template) in &mapping.computed_params {
        if let Some(computed) = compute_template(template, standard) {
            result.insert(target.clone(), Value::String(computed));
        }
    }

    Ok(result)
}

/// 渲染 "{a}x{b}" 形式的模板，任一引用键缺失时返回 None
fn compute_template(template: &str, params: &Map<String, Value>) -> Option<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            result.push(c);
            continue;
        }
        let mut key = String::new();
        for inner in chars.by_ref() {
            if inner == '}' {
                break;
            }
            key.push(inner);
        }
        let value = params.get(&key)?;
        result.push_str(&value_to_string(value));
    }

    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_passthrough_without_mapping() {
        let input = obj(json!({"prompt": "a cat", "n": 2}));
        let out = map_params(&input, None).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_field_and_value_mapping() {
        let input = obj(json!({"prompt": "a cat", "quality": "high"}));
        let mapping = json!({
            "field_mapping": {"prompt": "text"},
            "value_mapping": {"quality": {"high": "hd", "low": "sd"}}
        });
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"text": "a cat", "quality": "hd"})));
    }

    #[test]
    fn test_fixed_params_injection() {
        let input = obj(json!({"prompt": "x"}));
        let mapping = json!({"fixed_params": {"response_format": "url", "n": 1}});
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"prompt": "x", "response_format": "url", "n": 1})));
    }

    // 规格场景：computed + type_convert 组合
    #[test]
    fn test_computed_and_type_convert() {
        let input = obj(json!({"width": 512, "height": 768, "tags": ["a", "b"]}));
        let mapping = json!({
            "field_mapping": {"tags": "labels"},
            "type_convert": {"tags": {"type": "array_to_string", "separator": ","}},
            "computed_params": {"size": "{width}x{height}"}
        });
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert_eq!(
            out,
            obj(json!({"width": 512, "height": 768, "labels": "a,b", "size": "512x768"}))
        );
    }

    #[test]
    fn test_computed_omitted_when_key_missing() {
        let input = obj(json!({"width": 512}));
        let mapping = json!({"computed_params": {"size": "{width}x{height}"}});
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert!(!out.contains_key("size"));
    }

    #[test]
    fn test_param_rules_excludes() {
        let input = obj(json!({"image_url": "https://a/i.png", "image_base64": "xxx"}));
        let mapping = json!({
            "param_rules": {"image_base64": {"excludes": ["image_url"]}}
        });
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert!(out.contains_key("image_url"));
        assert!(!out.contains_key("image_base64"));
    }

    #[test]
    fn test_string_to_array() {
        let input = obj(json!({"tags": "a, b ,c"}));
        let mapping = json!({
            "type_convert": {"tags": {"type": "string_to_array"}}
        });
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"tags": ["a", "b", "c"]})));
    }

    #[test]
    fn test_empty_string_to_empty_array() {
        let input = obj(json!({"tags": ""}));
        let mapping = json!({
            "type_convert": {"tags": {"type": "string_to_array"}}
        });
        let out = map_params(&input, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"tags": []})));
    }

    #[test]
    fn test_invalid_mapping_config() {
        let input = obj(json!({"prompt": "x"}));
        let mapping = json!({"field_mapping": "not an object"});
        assert!(map_params(&input, Some(&mapping)).is_err());
    }
}
