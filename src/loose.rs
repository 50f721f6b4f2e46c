//! 面板返回值的宽松类型转换
//!
//! 面板不同版本对同一字段的编码并不一致：数字可能是字符串，
//! 布尔值可能是 0/1 或 "true"。这里的函数供 `#[serde(deserialize_with)]` 使用。

use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use serde_json::Value;

/// 布尔值：接受 bool、0/1、"true"/"false"/"1"/"0"
pub fn bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(D::Error::custom(format!("无法将 {} 解析为布尔值", n))),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("无法将 {:?} 解析为布尔值", s))),
        },
        other => Err(D::Error::custom(format!("期望布尔值，实际为 {}", kind(&other)))),
    }
}

/// 整数：接受数字、数字字符串；空字符串与 null 视为 0
pub fn i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => number_to_i64(&n).map_err(D::Error::custom),
        Value::String(s) => string_to_i64(&s).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("期望整数，实际为 {}", kind(&other)))),
    }
}

/// 端口号：整数且落在 0..=65535
pub fn port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = match Value::deserialize(deserializer)? {
        Value::Number(n) => number_to_i64(&n).map_err(D::Error::custom)?,
        Value::String(s) => string_to_i64(&s).map_err(D::Error::custom)?,
        other => {
            return Err(D::Error::custom(format!(
                "期望端口号，实际为 {}",
                kind(&other)
            )))
        }
    };
    u16::try_from(value).map_err(|_| D::Error::custom(format!("端口超出范围: {}", value)))
}

/// 字符串：数字会被转成字符串，null 视为空字符串
pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!("期望字符串，实际为 {}", kind(&other)))),
    }
}

/// 数组：null 视为空数组
pub fn vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn number_to_i64(n: &serde_json::Number) -> Result<i64, String> {
    if let Some(v) = n.as_i64() {
        return Ok(v);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(format!("无法将 {} 解析为整数", n)),
    }
}

fn string_to_i64(s: &str) -> Result<i64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }
    s.parse::<i64>()
        .map_err(|_| format!("无法将 {:?} 解析为整数", s))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
