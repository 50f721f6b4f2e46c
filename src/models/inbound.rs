//! 入站（代理监听）配置

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::client::{millis_to_datetime, Client, ClientTraffic};
use super::traffic::TrafficStats;
use crate::codec::PanelRecord;
use crate::error::{Error, Result};

pub const FIELD_SETTINGS: &str = "settings";
pub const FIELD_STREAM_SETTINGS: &str = "streamSettings";
pub const FIELD_SNIFFING: &str = "sniffing";

/// 面板中的一个入站
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    /// 面板分配的 ID，创建前为 0
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub id: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub up: i64,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub down: i64,

    /// 流量配额（字节），0 表示不限
    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub total: i64,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub remark: String,

    #[serde(deserialize_with = "crate::loose::bool")]
    pub enable: bool,

    #[serde(default, deserialize_with = "crate::loose::i64")]
    pub expiry_time: i64,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub listen: String,

    #[serde(deserialize_with = "crate::loose::port")]
    pub port: u16,

    pub protocol: String,

    pub settings: Settings,

    pub stream_settings: StreamSettings,

    pub sniffing: Sniffing,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub tag: String,

    #[serde(default, deserialize_with = "crate::loose::vec")]
    pub client_stats: Vec<ClientTraffic>,
}

impl PanelRecord for Inbound {
    const EMBEDDED_JSON: &'static [&'static str] =
        &[FIELD_SETTINGS, FIELD_STREAM_SETTINGS, FIELD_SNIFFING];
}

impl Inbound {
    pub fn new(port: u16, protocol: impl Into<String>) -> Self {
        Self {
            id: 0,
            up: 0,
            down: 0,
            total: 0,
            remark: String::new(),
            enable: true,
            expiry_time: 0,
            listen: String::new(),
            port,
            protocol: protocol.into(),
            settings: Settings::default(),
            stream_settings: StreamSettings::default(),
            sniffing: Sniffing::default(),
            tag: String::new(),
            client_stats: Vec::new(),
        }
    }

    pub fn traffic(&self) -> TrafficStats {
        TrafficStats::new(self.up, self.down)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.expiry_time)
    }

    /// 按 email 查找客户端
    pub fn client(&self, email: &str) -> Option<&Client> {
        self.settings.clients.iter().find(|c| c.email == email)
    }

    /// 按 email 查找客户端的流量记录
    pub fn client_traffic(&self, email: &str) -> Option<&ClientTraffic> {
        self.client_stats.iter().find(|c| c.email == email)
    }

    /// 客户端列表，并填充所属入站 ID
    pub fn owned_clients(&self) -> Vec<Client> {
        self.settings
            .clients
            .iter()
            .cloned()
            .map(|mut c| {
                c.inbound_id = self.id;
                c
            })
            .collect()
    }

    /// add/update 请求体
    ///
    /// 面板要求 settings、streamSettings、sniffing 以 JSON 字符串提交，
    /// 流量计数与 clientStats 由面板维护，不随请求发送。
    pub fn to_payload(&self) -> Result<Value> {
        Ok(json!({
            "remark": self.remark,
            "enable": self.enable,
            "listen": self.listen,
            "port": self.port,
            "protocol": self.protocol,
            "expiryTime": self.expiry_time,
            "total": self.total,
            FIELD_SETTINGS: encode_embedded(FIELD_SETTINGS, &self.settings)?,
            FIELD_STREAM_SETTINGS: encode_embedded(FIELD_STREAM_SETTINGS, &self.stream_settings)?,
            FIELD_SNIFFING: encode_embedded(FIELD_SNIFFING, &self.sniffing)?,
        }))
    }
}

/// 协议相关设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, deserialize_with = "crate::loose::vec")]
    pub clients: Vec<Client>,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub decryption: String,

    #[serde(default, deserialize_with = "crate::loose::vec")]
    pub fallbacks: Vec<Value>,

    /// 其他协议字段（如 shadowsocks 的 method）原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 传输层设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(default, deserialize_with = "crate::loose::string")]
    pub security: String,

    #[serde(default, deserialize_with = "crate::loose::string")]
    pub network: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tcp_settings: Map<String, Value>,

    #[serde(default, deserialize_with = "crate::loose::vec")]
    pub external_proxy: Vec<Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub reality_settings: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub xtls_settings: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tls_settings: Map<String, Value>,

    /// ws/grpc/httpupgrade 等其他传输设置
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 流量嗅探设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sniffing {
    #[serde(deserialize_with = "crate::loose::bool")]
    pub enabled: bool,

    #[serde(default, deserialize_with = "crate::loose::vec")]
    pub dest_override: Vec<String>,

    #[serde(default, deserialize_with = "crate::loose::bool")]
    pub metadata_only: bool,

    #[serde(default, deserialize_with = "crate::loose::bool")]
    pub route_only: bool,
}

fn encode_embedded<T: Serialize>(field: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::validation(field, format!("序列化失败: {}", e)))
}
