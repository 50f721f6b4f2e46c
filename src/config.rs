//! 面板连接配置
//!
//! 支持三种来源：代码构造、环境变量、TOML 配置文件。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const ENV_HOST: &str = "XUI_HOST";
pub const ENV_USERNAME: &str = "XUI_USERNAME";
pub const ENV_PASSWORD: &str = "XUI_PASSWORD";
pub const ENV_TLS_VERIFY: &str = "XUI_TLS_VERIFY";
pub const ENV_TIMEOUT: &str = "XUI_TIMEOUT";
pub const ENV_AUTO_RELOGIN: &str = "XUI_AUTO_RELOGIN";
pub const ENV_SESSION_COOKIE: &str = "XUI_SESSION_COOKIE";
pub const ENV_CA_CERT: &str = "XUI_CA_CERT";

/// 面板连接配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PanelConfig {
    /// 面板地址（例如 https://panel.example.com:2053/secret-path）
    pub host: String,

    /// 面板用户名
    pub username: String,

    /// 面板密码
    pub password: String,

    /// 是否校验服务端证书
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// 会话过期时是否自动重新登录并重试一次
    #[serde(default = "default_auto_relogin")]
    pub auto_relogin: bool,

    /// 会话 Cookie 名称，不指定时取登录响应中的第一个 Cookie
    #[serde(default)]
    pub session_cookie: Option<String>,

    /// 自定义 CA 证书（PEM）
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_auto_relogin() -> bool {
    true
}

impl PanelConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            verify_tls: default_verify_tls(),
            timeout_secs: default_timeout_secs(),
            auto_relogin: default_auto_relogin(),
            session_cookie: None,
            ca_cert: None,
        }
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_auto_relogin(mut self, enabled: bool) -> Self {
        self.auto_relogin = enabled;
        self
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.session_cookie = Some(name.into());
        self
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref).map_err(|e| {
            Error::Config(format!("无法读取配置文件 {}: {}", path_ref.display(), e))
        })?;

        let config: PanelConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        let mut config = PanelConfig::new(
            required_env(ENV_HOST)?,
            required_env(ENV_USERNAME)?,
            required_env(ENV_PASSWORD)?,
        );

        if let Some(verify) = optional_env(ENV_TLS_VERIFY) {
            config.verify_tls = parse_flag(ENV_TLS_VERIFY, &verify)?;
        }
        if let Some(timeout) = optional_env(ENV_TIMEOUT) {
            config.timeout_secs = timeout
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} 不是合法的秒数: {}", ENV_TIMEOUT, timeout)))?;
        }
        if let Some(relogin) = optional_env(ENV_AUTO_RELOGIN) {
            config.auto_relogin = parse_flag(ENV_AUTO_RELOGIN, &relogin)?;
        }
        config.session_cookie = optional_env(ENV_SESSION_COOKIE);
        config.ca_cert = optional_env(ENV_CA_CERT).map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(Error::Config("面板地址不能为空".to_string()));
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(Error::Config(format!(
                "面板地址必须以 http:// 或 https:// 开头: {}",
                host
            )));
        }
        if self.username.is_empty() {
            return Err(Error::Config("用户名不能为空".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("请求超时必须大于 0".to_string()));
        }
        Ok(())
    }

    /// 去掉末尾 `/` 的面板地址
    pub fn base_url(&self) -> &str {
        self.host.trim().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| Error::Config(format!("缺少环境变量 {}", key)))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} 不是合法的开关值: {}", key, value))),
    }
}
