//! 声明式映射引擎
//!
//! 纯函数实现，不做任何 I/O：
//! - `param`：标准入参 -> 上游入参
//! - `response`：上游响应 -> 统一结果（field_mapping 形态）
//! - `progress`：上游响应 -> 任务进度（task_id/status/... JSON 路径形态）

pub mod param;
pub mod progress;
pub mod response;

use serde::Deserialize;
use serde_json::Value;

/// 类型转换配置，参数与响应两个方向共用
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TypeConversion {
    /// array_to_string / string_to_array
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub separator: String,
}

/// 分隔符为空按逗号处理，字面量 "\n" 解码为换行
fn decode_separator(separator: &str) -> String {
    let sep = if separator.is_empty() { "," } else { separator };
    sep.replace("\\n", "\n")
}

/// 将 JSON 值转为字符串，字符串原样，其余值按 JSON 字面量输出
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 执行 array<->string 类型转换，无法转换时原样返回
fn convert_type(value: Value, conv: &TypeConversion) -> Value {
    let sep = decode_separator(&conv.separator);

    match conv.kind.as_str() {
        "array_to_string" => match value {
            Value::Array(arr) => {
                let parts: Vec<String> = arr.iter().map(value_to_string).collect();
                Value::String(parts.join(&sep))
            }
            Value::String(_) => value,
            other => other,
        },
        "string_to_array" => match value {
            Value::String(s) => {
                if s.is_empty() {
                    return Value::Array(vec![]);
                }
                let parts: Vec<Value> = s
                    .split(sep.as_str())
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect();
                Value::Array(parts)
            }
            Value::Array(arr) => Value::Array(
                arr.into_iter()
                    .filter(|v| v.is_string())
                    .collect(),
            ),
            other => other,
        },
        _ => value,
    }
}

/// 按路径取值，支持 data.output.images[0].url 形式的点分路径与数组下标
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        if let Some(idx) = part.find('[') {
            let key = &part[..idx];
            let index: usize = part[idx + 1..part.len().checked_sub(1)?].parse().ok()?;
            current = current.get(key)?.get(index)?;
        } else {
            current = current.get(part)?;
        }
    }
    Some(current)
}

/// 从 JSON 值安全提取字符串，数字会被格式化
fn extract_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_separator() {
        assert_eq!(decode_separator(""), ",");
        assert_eq!(decode_separator(";"), ";");
        assert_eq!(decode_separator("\\n"), "\n");
    }

    #[test]
    fn test_lookup_path() {
        let data = json!({
            "data": {
                "output": {
                    "images": [{"url": "https://a/1.png"}, {"url": "https://a/2.png"}]
                },
                "id": 42
            }
        });
        assert_eq!(
            lookup_path(&data, "data.output.images[0].url"),
            Some(&json!("https://a/1.png"))
        );
        assert_eq!(
            lookup_path(&data, "data.output.images[1].url"),
            Some(&json!("https://a/2.png"))
        );
        assert_eq!(lookup_path(&data, "data.id"), Some(&json!(42)));
        assert_eq!(lookup_path(&data, "data.output.images[2].url"), None);
        assert_eq!(lookup_path(&data, "data.missing.url"), None);
    }

    #[test]
    fn test_convert_array_to_string() {
        let conv = TypeConversion {
            kind: "array_to_string".into(),
            separator: String::new(),
        };
        assert_eq!(convert_type(json!(["a", "b"]), &conv), json!("a,b"));
        assert_eq!(convert_type(json!(["a", 1]), &conv), json!("a,1"));
        assert_eq!(convert_type(json!("already"), &conv), json!("already"));
    }

    #[test]
    fn test_convert_string_to_array() {
        let conv = TypeConversion {
            kind: "string_to_array".into(),
            separator: String::new(),
        };
        assert_eq!(convert_type(json!("a, b ,c"), &conv), json!(["a", "b", "c"]));
        assert_eq!(convert_type(json!(""), &conv), json!([]));
        assert_eq!(convert_type(json!("a,,b"), &conv), json!(["a", "b"]));
    }

    #[test]
    fn test_convert_newline_separator() {
        let conv = TypeConversion {
            kind: "string_to_array".into(),
            separator: "\\n".into(),
        };
        assert_eq!(convert_type(json!("a\nb"), &conv), json!(["a", "b"]));
    }

    #[test]
    fn test_extract_string() {
        assert_eq!(extract_string(&json!("u-1")), "u-1");
        assert_eq!(extract_string(&json!(12345)), "12345");
        assert_eq!(extract_string(&Value::Null), "");
    }
}
