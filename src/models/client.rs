//! 入站下的客户端（用户凭据与配额）

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::traffic::TrafficStats;
use crate::codec::PanelRecord;

/// 入站 `settings.clients` 中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// vmess/vless 使用的 UUID
    #[serde(default, deserialize_with = "crate::loose::string", skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// trojan 使用的密码
    #[serde(default, deserialize_with = "crate::loose::string", skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// 面板内唯一的客户端标识
    pub email: String,

    #[serde(default = "default_enable", deserialize_with = "crate::loose::bool")]
    pub enable: bool,

    #[serde(default, deserialize_with = "crate::loose::string", skip_serializing_if = "String::is_empty")]
    pub flow: String,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub limit_ip: i64,

    /// 流量配额（字节），0 表示不限
    #[serde(rename = "totalGB", default, deserialize_with = "crate::loose::i64")]
    pub total_gb: i64,

    /// 过期时间（毫秒时间戳），0 表示永不过期
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub expiry_time: i64,

    /// Telegram 用户 ID，旧版面板以字符串下发
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub tg_id: i64,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub sub_id: String,

    /// 自动重置周期（天）
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub reset: i64,

    #[serde(default, deserialize_with = "crate::loose::string", skip_serializing_if = "String::is_empty")]
    pub comment: String,

    /// 所属入站，由客户端库在读取时填充，不会发送给面板
    #[serde(skip)]
    pub inbound_id: i64,
}

fn default_enable() -> bool {
    true
}

impl PanelRecord for Client {}

impl Client {
    /// 新建一个启用状态的客户端，并生成随机 UUID
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            password: String::new(),
            email: email.into(),
            enable: true,
            flow: String::new(),
            limit_ip: 0,
            total_gb: 0,
            expiry_time: 0,
            tg_id: 0,
            sub_id: String::new(),
            reset: 0,
            comment: String::new(),
            inbound_id: 0,
        }
    }

    /// 面板在 updateClient/delClient 中使用的标识
    ///
    /// trojan 用密码，shadowsocks 用 email，其余协议用 UUID。
    pub fn key_for(&self, protocol: &str) -> &str {
        match protocol {
            "trojan" => &self.password,
            "shadowsocks" => &self.email,
            _ => &self.id,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.expiry_time)
    }
}

/// 面板 `clientStats` 中的一行流量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTraffic {
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub id: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub inbound_id: i64,

    #[serde(default = "default_enable", deserialize_with = "crate::loose::bool")]
    pub enable: bool,

    pub email: String,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub up: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub down: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub expiry_time: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub total: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub reset: i64,
}

impl PanelRecord for ClientTraffic {}

impl ClientTraffic {
    pub fn traffic(&self) -> TrafficStats {
        TrafficStats::new(self.up, self.down)
    }

    /// 配额用尽（total 为 0 表示不限）
    pub fn is_depleted(&self) -> bool {
        self.total > 0 && self.traffic().total() >= self.total
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.expiry_time)
    }
}

/// 面板用毫秒时间戳表示过期时间，<=0 表示不过期
///
/// 负数在面板里表示“首次使用后 N 毫秒过期”，这里同样视为没有固定时间点。
pub(crate) fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
