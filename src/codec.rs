//! 面板响应解码
//!
//! 面板的响应统一包在 `{"success": bool, "msg": string, "obj": any}` 中。
//! 解码分三步：解析信封、展开以字符串形式嵌入的 JSON、按结构校验。
//! 任一字段不合法时整个响应被拒绝，不会返回半成品记录。

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

pub const FIELD_SUCCESS: &str = "success";
pub const FIELD_MSG: &str = "msg";
pub const FIELD_OBJ: &str = "obj";

/// 可以从面板响应中解码出来的记录
pub trait PanelRecord: DeserializeOwned {
    /// 面板以 JSON 字符串形式下发的字段，解码前会先展开
    const EMBEDDED_JSON: &'static [&'static str] = &[];
}

/// 响应信封
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(deserialize_with = "crate::loose::bool")]
    pub success: bool,
    #[serde(default, deserialize_with = "crate::loose::string")]
    pub msg: String,
    #[serde(default)]
    pub obj: Option<Value>,
}

impl Envelope {
    /// `obj` 为空（缺失或 null）
    pub fn is_empty(&self) -> bool {
        matches!(self.obj, None | Some(Value::Null))
    }
}

/// 解析信封；`success=false` 时返回 `Error::Panel`
pub fn decode_envelope(body: &[u8]) -> Result<Envelope> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| Error::Decode(format!("{}: {}", e, preview(body))))?;
    if !value.is_object() {
        return Err(Error::validation(".", "响应不是 JSON 对象"));
    }

    let envelope: Envelope = decode_value(value, "")?;
    if !envelope.success {
        return Err(Error::Panel(envelope.msg));
    }
    Ok(envelope)
}

/// 将 `obj` 解码为单条记录，`obj` 为空时返回 `None`
pub fn decode_obj<T: PanelRecord>(envelope: Envelope) -> Result<Option<T>> {
    match envelope.obj {
        None | Some(Value::Null) => Ok(None),
        Some(mut value) => {
            expand_embedded(&mut value, T::EMBEDDED_JSON, FIELD_OBJ)?;
            decode_value(value, FIELD_OBJ).map(Some)
        }
    }
}

/// 将 `obj` 解码为记录列表，`obj` 为空时返回空列表
pub fn decode_list<T: PanelRecord>(envelope: Envelope) -> Result<Vec<T>> {
    match envelope.obj {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(mut items)) => {
            for (i, item) in items.iter_mut().enumerate() {
                expand_embedded(item, T::EMBEDDED_JSON, &format!("{}[{}]", FIELD_OBJ, i))?;
            }
            decode_value(Value::Array(items), FIELD_OBJ)
        }
        Some(_) => Err(Error::validation(FIELD_OBJ, "期望数组")),
    }
}

/// 按结构解码，出错时给出完整字段路径
pub fn decode_value<T: DeserializeOwned>(value: Value, root: &str) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = join_path(root, &e.path().to_string());
        Error::validation(path, e.into_inner().to_string())
    })
}

/// 把字符串形式的 JSON 字段原地展开为对象
fn expand_embedded(value: &mut Value, fields: &[&str], path: &str) -> Result<()> {
    let Some(map) = value.as_object_mut() else {
        return Ok(());
    };

    for field in fields {
        let parsed = match map.get(*field) {
            Some(Value::String(raw)) if raw.trim().is_empty() => Value::Object(Default::default()),
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
                Error::validation(join_path(path, field), format!("内嵌 JSON 解析失败: {}", e))
            })?,
            _ => continue,
        };
        map.insert(field.to_string(), parsed);
    }
    Ok(())
}

fn join_path(root: &str, path: &str) -> String {
    let path = if path == "." { "" } else { path };
    match (root.is_empty(), path.is_empty()) {
        (true, true) => ".".to_string(),
        (true, false) => path.to_string(),
        (false, true) => root.to_string(),
        (false, false) if path.starts_with('[') => format!("{}{}", root, path),
        (false, false) => format!("{}.{}", root, path),
    }
}

fn preview(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.into_owned()
    }
}
