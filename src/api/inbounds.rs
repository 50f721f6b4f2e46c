//! 入站管理接口

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, info};

use super::endpoint;
use crate::codec::{decode_obj, FIELD_OBJ};
use crate::error::{Error, Result};
use crate::models::{Inbound, TrafficStats};
use crate::session::Session;

const LIST: &str = "list";
const GET: &str = "get";
const ADD: &str = "add";
const UPDATE: &str = "update";
const DELETE: &str = "del";
const RESET_ALL_TRAFFICS: &str = "resetAllTraffics";
const RESET_ALL_CLIENT_TRAFFICS: &str = "resetAllClientTraffics";

/// 面板对不存在的记录返回的错误信息
const RECORD_NOT_FOUND: &str = "record not found";

/// 入站接口客户端
#[derive(Clone)]
pub struct InboundsApi {
    session: Arc<Session>,
}

impl InboundsApi {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// 获取所有入站
    pub async fn list(&self) -> Result<Vec<Inbound>> {
        debug!("获取入站列表");
        let inbounds: Vec<Inbound> = self.session.get_list(&endpoint(LIST)).await?;
        debug!("获取到 {} 个入站", inbounds.len());
        Ok(inbounds)
    }

    /// 按 ID 获取入站，不存在时返回 `Error::NotFound`
    pub async fn get(&self, id: i64) -> Result<Inbound> {
        debug!("获取入站: id={}", id);
        let path = endpoint(format!("{}/{}", GET, id));
        match self.session.get_obj(&path).await {
            Ok(Some(inbound)) => Ok(inbound),
            Ok(None) => Err(not_found(id)),
            Err(Error::Panel(msg)) if is_record_not_found(&msg) => Err(not_found(id)),
            Err(e) => Err(e),
        }
    }

    /// 创建入站，返回面板分配了 ID 的记录
    pub async fn add(&self, inbound: &Inbound) -> Result<Inbound> {
        info!("创建入站: port={}, protocol={}", inbound.port, inbound.protocol);
        let envelope = self.session.post(&endpoint(ADD), inbound.to_payload()?).await?;
        let created: Inbound = decode_obj(envelope)?.ok_or_else(|| {
            Error::validation(FIELD_OBJ, "创建入站后面板未返回记录")
        })?;
        info!("✅ 入站已创建: id={}", created.id);
        Ok(created)
    }

    /// 更新入站
    ///
    /// 面板未返回记录时重新读取一次。
    pub async fn update(&self, id: i64, inbound: &Inbound) -> Result<Inbound> {
        info!("更新入站: id={}", id);
        let path = endpoint(format!("{}/{}", UPDATE, id));
        let envelope = self.session.post(&path, inbound.to_payload()?).await?;
        match decode_obj(envelope)? {
            Some(updated) => Ok(updated),
            None => self.get(id).await,
        }
    }

    /// 删除入站，面板的错误原样返回
    pub async fn delete(&self, id: i64) -> Result<()> {
        info!("删除入站: id={}", id);
        let path = endpoint(format!("{}/{}", DELETE, id));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }

    /// 入站当前的上下行流量
    pub async fn traffic(&self, id: i64) -> Result<TrafficStats> {
        Ok(self.get(id).await?.traffic())
    }

    /// 重置所有入站的流量计数
    pub async fn reset_traffics(&self) -> Result<()> {
        info!("重置所有入站流量");
        self.session
            .call(Method::POST, &endpoint(RESET_ALL_TRAFFICS), None)
            .await?;
        Ok(())
    }

    /// 重置入站下所有客户端的流量计数
    pub async fn reset_client_traffics(&self, id: i64) -> Result<()> {
        info!("重置入站客户端流量: id={}", id);
        let path = endpoint(format!("{}/{}", RESET_ALL_CLIENT_TRAFFICS, id));
        self.session.call(Method::POST, &path, None).await?;
        Ok(())
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("入站 {}", id))
}

fn is_record_not_found(msg: &str) -> bool {
    msg.to_ascii_lowercase().contains(RECORD_NOT_FOUND)
}
