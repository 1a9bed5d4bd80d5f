//! 上游响应到统一结果的映射

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::mapping::{convert_type, lookup_path, TypeConversion};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResponseMapping {
    /// 标准名 -> 上游响应中的 JSON 路径
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    #[serde(default)]
    pub value_mapping: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub type_convert: HashMap<String, TypeConversion>,
    /// 数组投影：把源数组的每个元素映射为标准对象
    #[serde(default)]
    pub array_handling: HashMap<String, ArrayMapping>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ArrayMapping {
    #[serde(default)]
    pub source_path: String,
    /// 标准键 -> 数组元素中的源键
    #[serde(default)]
    pub item_mapping: HashMap<String, String>,
}

/// 将上游响应映射为统一结果，路径缺失的字段省略
///
/// 未配置映射时原样透传上游响应
pub fn map_response(vendor: &Map<String, Value>, mapping: Option<&Value>) -> Result<Map<String, Value>> {
    let Some(raw) = mapping.filter(|v| !v.is_null()) else {
        return Ok(vendor.clone());
    };

    let mapping: ResponseMapping =
        serde_json::from_value(raw.clone()).context("invalid response mapping config")?;

    let root = Value::Object(vendor.clone());
    let mut result = Map::new();

    for (std_field, path) in &mapping.field_mapping {
        let Some(value) = lookup_path(&root, path) else {
            continue;
        };
        let mut value = value.clone();

        if let Some(value_map) = mapping.value_mapping.get(std_field) {
            if let Value::String(s) = &value {
                if let Some(mapped) = value_map.get(s) {
                    value = Value::String(mapped.clone());
                }
            }
        }

        if let Some(conv) = mapping.type_convert.get(std_field) {
            value = convert_type(value, conv);
        }

        result.insert(std_field.clone(), value);
    }

    for (std_field, array_mapping) in &mapping.array_handling {
        let Some(Value::Array(source)) = lookup_path(&root, &array_mapping.source_path) else {
            continue;
        };
        let mapped: Vec<Value> = source
            .iter()
            .filter_map(|item| item.as_object())
            .map(|item| {
                let mut mapped_item = Map::new();
                for (std_key, src_key) in &array_mapping.item_mapping {
                    if let Some(v) = item.get(src_key) {
                        mapped_item.insert(std_key.clone(), v.clone());
                    }
                }
                Value::Object(mapped_item)
            })
            .collect();
        result.insert(std_field.clone(), Value::Array(mapped));
    }

    Ok(result)
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
        let vendor = obj(json!({"id": "u-1", "url": "https://a/x.png"}));
        let out = map_response(&vendor, None).unwrap();
        assert_eq!(out, vendor);
    }

    #[test]
    fn test_path_extraction() {
        let vendor = obj(json!({
            "data": {"output": {"images": [{"url": "https://a/1.png"}]}}
        }));
        let mapping = json!({
            "field_mapping": {"image_url": "data.output.images[0].url"}
        });
        let out = map_response(&vendor, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"image_url": "https://a/1.png"})));
    }

    #[test]
    fn test_missing_path_omitted() {
        let vendor = obj(json!({"data": {}}));
        let mapping = json!({
            "field_mapping": {"image_url": "data.output.url", "status": "data.state"}
        });
        let out = map_response(&vendor, Some(&mapping)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_value_mapping_after_extraction() {
        let vendor = obj(json!({"data": {"state": "DONE"}}));
        let mapping = json!({
            "field_mapping": {"status": "data.state"},
            "value_mapping": {"status": {"DONE": "success", "RUNNING": "processing"}}
        });
        let out = map_response(&vendor, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"status": "success"})));
    }

    #[test]
    fn test_type_convert_after_extraction() {
        let vendor = obj(json!({"data": {"urls": "a.png,b.png"}}));
        let mapping = json!({
            "field_mapping": {"urls": "data.urls"},
            "type_convert": {"urls": {"type": "string_to_array"}}
        });
        let out = map_response(&vendor, Some(&mapping)).unwrap();
        assert_eq!(out, obj(json!({"urls": ["a.png", "b.png"]})));
    }

    #[test]
    fn test_array_handling() {
        let vendor = obj(json!({
            "data": {"items": [
                {"img": "https://a/1.png", "seed": 1},
                {"img": "https://a/2.png", "seed": 2}
            ]}
        }));
        let mapping = json!({
            "array_handling": {
                "images": {
                    "source_path": "data.items",
                    "item_mapping": {"url": "img", "seed": "seed"}
                }
            }
        });
        let out = map_response(&vendor, Some(&mapping)).unwrap();
        assert_eq!(
            out,
            obj(json!({"images": [
                {"url": "https://a/1.png", "seed": 1},
                {"url": "https://a/2.png", "seed": 2}
            ]}))
        );
    }

    // 往返性质：param 映射重命名的键，response 映射用对应路径取回原值
    #[test]
    fn test_roundtrip_with_param_mapping() {
        use crate::mapping::param::map_params;

        let input = obj(json!({"prompt": "a cat", "tags": ["x", "y"]}));
        let param_mapping = json!({
            "field_mapping": {"prompt": "text", "tags": "labels"},
            "type_convert": {"tags": {"type": "array_to_string"}}
        });
        let upstream = map_params(&input, Some(&param_mapping)).unwrap();

        let response_mapping = json!({
            "field_mapping": {"prompt": "text", "tags": "labels"},
            "type_convert": {"tags": {"type": "string_to_array"}}
        });
        let back = map_response(&upstream, Some(&response_mapping)).unwrap();
        assert_eq!(back, input);
    }
}
