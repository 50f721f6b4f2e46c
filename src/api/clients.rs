//! 客户端管理接口
//!
//! 客户端挂在入站的 `settings.clients` 下，面板没有单独的列表接口，
//! 列表与按 email 查询都通过读取入站完成。

use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{endpoint, segment};
use super::inbounds::InboundsApi;
use crate::codec::{decode_value, Envelope, FIELD_OBJ};
use crate::error::{Error, Result};
use crate::models::{Client, ClientTraffic};
use crate::session::Session;

const ADD_CLIENT: &str = "addClient";
const UPDATE_CLIENT: &str = "updateClient";
/// 面板路由为 `{inbound}/delClient/{key}`，入站 ID 在操作名之前
const DEL_CLIENT: &str = "delClient";
const GET_CLIENT_TRAFFICS: &str = "getClientTraffics";
const GET_CLIENT_TRAFFICS_BY_ID: &str = "getClientTrafficsById";
const CLIENT_IPS: &str = "clientIps";
const CLEAR_CLIENT_IPS: &str = "clearClientIps";
/// 同样是 `{inbound}/resetClientTraffic/{email}`
const RESET_CLIENT_TRAFFIC: &str = "resetClientTraffic";
const DEL_DEPLETED_CLIENTS: &str = "delDepletedClients";
const ONLINES: &str = "onlines";

/// 面板在客户端没有 IP 记录时返回的占位文本
const NO_IP_RECORD: &str = "No IP Record";

/// 客户端接口
#[derive(Clone)]
pub struct ClientsApi {
    session: Arc<Session>,
    inbounds: InboundsApi,
}

impl ClientsApi {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        let inbounds = InboundsApi::new(session.clone());
        Self { session, inbounds }
    }

    /// 所有入站下的客户端
    pub async fn list(&self) -> Result<Vec<Client>> {
        let inbounds = self.inbounds.list().await?;
        Ok(inbounds.iter().flat_map(|i| i.owned_clients()).collect())
    }

    /// 指定入站下的客户端
    pub async fn list_in(&self, inbound_id: i64) -> Result<Vec<Client>> {
        Ok(self.inbounds.get(inbound_id).await?.owned_clients())
    }

    /// 按 email 查找客户端
    pub async fn get(&self, email: &str) -> Result<Client> {
        debug!("查找客户端: email={}", email);
        self.list()
            .await?
            .into_iter()
            .find(|c| c.email == email)
            .ok_or_else(|| Error::NotFound(format!("客户端 {}", email)))
    }

    /// 向入站添加客户端，返回面板保存后的记录
    pub async fn add(&self, inbound_id: i64, clients: &[Client]) -> Result<Vec<Client>> {
        info!("添加 {} 个客户端到入站 {}", clients.len(), inbound_id);
        self.session
            .post(&endpoint(ADD_CLIENT), client_payload(inbound_id, clients)?)
            .await?;

        let inbound = self.inbounds.get(inbound_id).await?;
        let saved = inbound.owned_clients();
        clients
            .iter()
            .map(|wanted| {
                saved
                    .iter()
                    .find(|c| c.email == wanted.email)
                    .cloned()
                    .ok_or_else(|| {
                        Error::NotFound(format!("入站 {} 中的客户端 {}", inbound_id, wanted.email))
                    })
            })
            .collect()
    }

    /// 更新客户端
    ///
    /// `key` 是面板用来定位客户端的标识，见 [`Client::key_for`]。
    pub async fn update(&self, inbound_id: i64, key: &str, client: &Client) -> Result<Client> {
        info!("更新客户端: inbound_id={}, email={}", inbound_id, client.email);
        let path = endpoint(format!("{}/{}", UPDATE_CLIENT, segment(key)));
        self.session
            .post(&path, client_payload(inbound_id, std::slice::from_ref(client))?)
            .await?;

        self.list_in(inbound_id)
            .await?
            .into_iter()
            .find(|c| c.email == client.email)
            .ok_or_else(|| Error::NotFound(format!("入站 {} 中的客户端 {}", inbound_id, client.email)))
    }

    pub async fn delete(&self, inbound_id: i64, key: &str) -> Result<()> {
        info!("删除客户端: inbound_id={}, key={}", inbound_id, key);
        let path = endpoint(format!("{}/{}/{}", inbound_id, DEL_CLIENT, segment(key)));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }

    /// 客户端流量记录
    pub async fn traffic(&self, email: &str) -> Result<ClientTraffic> {
        let path = endpoint(format!("{}/{}", GET_CLIENT_TRAFFICS, segment(email)));
        self.session
            .get_obj(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("客户端 {} 的流量记录", email)))
    }

    /// 按客户端 UUID 查询流量记录
    pub async fn traffic_by_id(&self, id: &str) -> Result<Vec<ClientTraffic>> {
        let path = endpoint(format!("{}/{}", GET_CLIENT_TRAFFICS_BY_ID, segment(id)));
        self.session.get_list(&path).await
    }

    /// 客户端最近使用过的 IP
    pub async fn ips(&self, email: &str) -> Result<Vec<String>> {
        let path = endpoint(format!("{}/{}", CLIENT_IPS, segment(email)));
        let envelope = self.session.call(Method::POST, &path, None).await?;
        parse_ips(envelope)
    }

    pub async fn clear_ips(&self, email: &str) -> Result<()> {
        info!("清除客户端 IP 记录: email={}", email);
        let path = endpoint(format!("{}/{}", CLEAR_CLIENT_IPS, segment(email)));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }

    pub async fn reset_traffic(&self, inbound_id: i64, email: &str) -> Result<()> {
        info!("重置客户端流量: inbound_id={}, email={}", inbound_id, email);
        let path = endpoint(format!("{}/{}/{}", inbound_id, RESET_CLIENT_TRAFFIC, segment(email)));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }

    /// 删除入站下配额或有效期已用尽的客户端
    pub async fn delete_depleted(&self, inbound_id: i64) -> Result<()> {
        info!("删除已耗尽的客户端: inbound_id={}", inbound_id);
        let path = endpoint(format!("{}/{}", DEL_DEPLETED_CLIENTS, inbound_id));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }

    /// 当前在线客户端的 email
    pub async fn online(&self) -> Result<Vec<String>> {
        let envelope = self.session.call(Method::POST, &endpoint(ONLINES), None).await?;
        match envelope.obj {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => decode_value(value, FIELD_OBJ),
        }
    }
}

/// addClient/updateClient 请求体，settings 以 JSON 字符串提交
fn client_payload(inbound_id: i64, clients: &[Client]) -> Result<Value> {
    let settings = serde_json::to_string(&json!({ "clients": clients }))
        .map_err(|e| Error::validation("settings", format!("序列化失败: {}", e)))?;
    Ok(json!({
        "id": inbound_id,
        "settings": settings,
    }))
}

/// 面板返回的 IP 记录可能是数组、数组的 JSON 文本或占位文本
fn parse_ips(envelope: Envelope) -> Result<Vec<String>> {
    match envelope.obj {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() || text == NO_IP_RECORD {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(text) {
                Ok(value @ Value::Array(_)) => decode_value(value, FIELD_OBJ),
                _ => Ok(vec![text.to_string()]),
            }
        }
        Some(value) => decode_value(value, FIELD_OBJ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_envelope;

    fn envelope(obj: Value) -> Envelope {
        decode_envelope(json!({"success": true, "msg": "", "obj": obj}).to_string().as_bytes())
            .unwrap()
    }

    #[test]
    fn test_client_payload() {
        let mut client = Client::new("alice");
        client.inbound_id = 4;
        let payload = client_payload(4, &[client]).unwrap();
        assert_eq!(payload["id"], 4);

        let settings: Value = serde_json::from_str(payload["settings"].as_str().unwrap()).unwrap();
        assert_eq!(settings["clients"][0]["email"], "alice");
        assert!(settings["clients"][0].get("inboundId").is_none());
    }

    #[test]
    fn test_parse_ips() {
        assert!(parse_ips(envelope(json!("No IP Record"))).unwrap().is_empty());
        assert!(parse_ips(envelope(Value::Null)).unwrap().is_empty());
        assert_eq!(
            parse_ips(envelope(json!("[\"1.1.1.1\",\"2.2.2.2\"]"))).unwrap(),
            vec!["1.1.1.1", "2.2.2.2"]
        );
        assert_eq!(
            parse_ips(envelope(json!(["3.3.3.3"]))).unwrap(),
            vec!["3.3.3.3"]
        );
        assert_eq!(parse_ips(envelope(json!("4.4.4.4"))).unwrap(), vec!["4.4.4.4"]);
    }

    #[test]
    fn test_parse_ips_rejects_non_strings() {
        match parse_ips(envelope(json!([1, 2]))) {
            Err(Error::Validation { path, .. }) => assert_eq!(path, "obj[0]"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            endpoint(format!("{}/{}/{}", 2, DEL_CLIENT, "uuid")),
            "panel/api/inbounds/2/delClient/uuid"
        );
        assert_eq!(endpoint(ONLINES), "panel/api/inbounds/onlines");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        assert_eq!(segment("alice@example.com"), "alice%40example.com");
        assert_eq!(
            endpoint(format!("{}/{}", GET_CLIENT_TRAFFICS, segment("a#b?c"))),
            "panel/api/inbounds/getClientTraffics/a%23b%3Fc"
        );
        assert_eq!(segment("p/w"), "p%2Fw");
        assert_eq!(segment("b86c0cdc-8a02-4da4"), "b86c0cdc-8a02-4da4");
    }
}
