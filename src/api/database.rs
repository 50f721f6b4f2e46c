//! 数据库备份接口

use std::sync::Arc;

use reqwest::Method;
use tracing::info;

use super::endpoint;
use crate::error::Result;
use crate::session::Session;

const CREATE_BACKUP: &str = "createbackup";

#[derive(Clone)]
pub struct DatabaseApi {
    session: Arc<Session>,
}

impl DatabaseApi {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// 触发面板导出数据库备份
    ///
    /// 备份由面板发送给已配置的 Telegram 管理员，本接口不返回备份内容。
    pub async fn export(&self) -> Result<()> {
        info!("请求面板导出数据库备份");
        self.session
            .call(Method::GET, &endpoint(CREATE_BACKUP), None)
            .await?;
        info!("✅ 数据库备份已触发");
        Ok(())
    }
}
