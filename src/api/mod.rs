//! 异步 API
//!
//! [`AsyncApi`] 持有会话，资源接口通过 `Arc` 共享同一会话。

mod clients;
mod database;
mod inbounds;

pub use clients::ClientsApi;
pub use database::DatabaseApi;
pub use inbounds::InboundsApi;

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

use tracing::debug;

use crate::config::PanelConfig;
use crate::error::Result;
use crate::session::Session;
use crate::transport::{Backend, HttpBackend};

/// 入站相关接口的公共前缀
const INBOUNDS_BASE: &str = "panel/api/inbounds";

pub(crate) fn endpoint(path: impl Display) -> String {
    format!("{}/{}", INBOUNDS_BASE, path)
}

/// 对 email、密码等放进路径的值做百分号编码
pub(crate) fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// 面板异步客户端
///
/// ```no_run
/// # async fn run() -> x3ui::Result<()> {
/// let api = x3ui::AsyncApi::from_env()?;
/// api.login().await?;
/// for inbound in api.inbounds().list().await? {
///     println!("{} {}", inbound.id, inbound.remark);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AsyncApi {
    session: Arc<Session>,
    inbounds: InboundsApi,
    clients: ClientsApi,
    database: DatabaseApi,
}

impl AsyncApi {
    /// 使用 reqwest 后端创建客户端，不会发起网络请求
    pub fn new(config: PanelConfig) -> Result<Self> {
        config.validate()?;
        let backend = HttpBackend::new(&config)?;
        Ok(Self::with_backend(&config, Arc::new(backend)))
    }

    /// 使用自定义后端创建客户端
    pub fn with_backend(config: &PanelConfig, backend: Arc<dyn Backend>) -> Self {
        debug!("创建面板客户端: host={}", config.base_url());
        let session = Arc::new(Session::new(config, backend));
        Self {
            inbounds: InboundsApi::new(session.clone()),
            clients: ClientsApi::new(session.clone()),
            database: DatabaseApi::new(session.clone()),
            session,
        }
    }

    /// 从 `XUI_*` 环境变量读取配置
    pub fn from_env() -> Result<Self> {
        Self::new(PanelConfig::from_env()?)
    }

    pub async fn login(&self) -> Result<()> {
        self.session.login().await
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    pub fn inbounds(&self) -> &InboundsApi {
        &self.inbounds
    }

    pub fn clients(&self) -> &ClientsApi {
        &self.clients
    }

    pub fn database(&self) -> &DatabaseApi {
        &self.database
    }
}
