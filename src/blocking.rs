//! 阻塞 API
//!
//! 与 [`AsyncApi`] 提供相同的操作，内部持有一个单线程 tokio 运行时。
//! 不能在异步运行时内部调用，否则 `block_on` 会 panic。

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::api::{AsyncApi, ClientsApi, DatabaseApi, InboundsApi};
use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::models::{Client, ClientTraffic, Inbound, TrafficStats};
use crate::transport::Backend;

/// 面板阻塞客户端
pub struct Api {
    inner: AsyncApi,
    runtime: Runtime,
}

impl Api {
    pub fn new(config: PanelConfig) -> Result<Self> {
        Ok(Self {
            inner: AsyncApi::new(config)?,
            runtime: build_runtime()?,
        })
    }

    pub fn with_backend(config: &PanelConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        Ok(Self {
            inner: AsyncApi::with_backend(config, backend),
            runtime: build_runtime()?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(PanelConfig::from_env()?)
    }

    pub fn login(&self) -> Result<()> {
        self.runtime.block_on(self.inner.login())
    }

    pub fn logout(&self) {
        self.runtime.block_on(self.inner.logout())
    }

    pub fn is_authenticated(&self) -> bool {
        self.runtime.block_on(self.inner.is_authenticated())
    }

    pub fn inbounds(&self) -> Inbounds<'_> {
        Inbounds {
            api: self.inner.inbounds(),
            runtime: &self.runtime,
        }
    }

    pub fn clients(&self) -> Clients<'_> {
        Clients {
            api: self.inner.clients(),
            runtime: &self.runtime,
        }
    }

    pub fn database(&self) -> Database<'_> {
        Database {
            api: self.inner.database(),
            runtime: &self.runtime,
        }
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Transport(format!("无法创建 tokio 运行时: {}", e)))
}

/// 阻塞版入站接口
pub struct Inbounds<'a> {
    api: &'a InboundsApi,
    runtime: &'a Runtime,
}

impl Inbounds<'_> {
    pub fn list(&self) -> Result<Vec<Inbound>> {
        self.runtime.block_on(self.api.list())
    }

    pub fn get(&self, id: i64) -> Result<Inbound> {
        self.runtime.block_on(self.api.get(id))
    }

    pub fn add(&self, inbound: &Inbound) -> Result<Inbound> {
        self.runtime.block_on(self.api.add(inbound))
    }

    pub fn update(&self, id: i64, inbound: &Inbound) -> Result<Inbound> {
        self.runtime.block_on(self.api.update(id, inbound))
    }

    pub fn delete(&self, id: i64) -> Result<()> {
        self.runtime.block_on(self.api.delete(id))
    }

    pub fn traffic(&self, id: i64) -> Result<TrafficStats> {
        self.runtime.block_on(self.api.traffic(id))
    }

    pub fn reset_traffics(&self) -> Result<()> {
        self.runtime.block_on(self.api.reset_traffics())
    }

    pub fn reset_client_traffics(&self, id: i64) -> Result<()> {
        self.runtime.block_on(self.api.reset_client_traffics(id))
    }
}

/// 阻塞版客户端接口
pub struct Clients<'a> {
    api: &'a ClientsApi,
    runtime: &'a Runtime,
}

impl Clients<'_> {
    pub fn list(&self) -> Result<Vec<Client>> {
        self.runtime.block_on(self.api.list())
    }

    pub fn list_in(&self, inbound_id: i64) -> Result<Vec<Client>> {
        self.runtime.block_on(self.api.list_in(inbound_id))
    }

    pub fn get(&self, email: &str) -> Result<Client> {
        self.runtime.block_on(self.api.get(email))
    }

    pub fn add(&self, inbound_id: i64, clients: &[Client]) -> Result<Vec<Client>> {
        self.runtime.block_on(self.api.add(inbound_id, clients))
    }

    pub fn update(&self, inbound_id: i64, key: &str, client: &Client) -> Result<Client> {
        self.runtime.block_on(self.api.update(inbound_id, key, client))
    }

    pub fn delete(&self, inbound_id: i64, key: &str) -> Result<()> {
        self.runtime.block_on(self.api.delete(inbound_id, key))
    }

    pub fn traffic(&self, email: &str) -> Result<ClientTraffic> {
        self.runtime.block_on(self.api.traffic(email))
    }

    pub fn traffic_by_id(&self, id: &str) -> Result<Vec<ClientTraffic>> {
        self.runtime.block_on(self.api.traffic_by_id(id))
    }

    pub fn ips(&self, email: &str) -> Result<Vec<String>> {
        self.runtime.block_on(self.api.ips(email))
    }

    pub fn clear_ips(&self, email: &str) -> Result<()> {
        self.runtime.block_on(self.api.clear_ips(email))
    }

    pub fn reset_traffic(&self, inbound_id: i64, email: &str) -> Result<()> {
        self.runtime.block_on(self.api.reset_traffic(inbound_id, email))
    }

    pub fn delete_depleted(&self, inbound_id: i64) -> Result<()> {
        self.runtime.block_on(self.api.delete_depleted(inbound_id))
    }

    pub fn online(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.api.online())
    }
}

/// 阻塞版数据库接口
pub struct Database<'a> {
    api: &'a DatabaseApi,
    runtime: &'a Runtime,
}

impl Database<'_> {
    pub fn export(&self) -> Result<()> {
        self.runtime.block_on(self.api.export())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_requires_login() {
        let api = Api::new(PanelConfig::new("http://127.0.0.1:9", "admin", "admin")).unwrap();
        assert!(!api.is_authenticated());
        assert!(matches!(api.inbounds().list(), Err(Error::NotAuthenticated)));
        assert!(matches!(api.clients().get("x"), Err(Error::NotAuthenticated)));
    }
}
