//! HTTP 传输层
//!
//! `Backend` 只负责把一次请求发出去并带回原始响应，
//! 会话、重登录等逻辑都在 `session` 中处理。

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, SET_COOKIE};
use reqwest::Method;
use serde_json::Value;
use std::fs;
use tracing::debug;

use crate::config::PanelConfig;
use crate::error::{Error, Result};

/// 面板下发的会话 Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// `Cookie` 请求头的值
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// 发往面板的一次请求
#[derive(Debug, Clone)]
pub struct PanelRequest {
    pub method: Method,
    /// 相对于面板地址的路径，不带前导 `/`
    pub path: String,
    pub body: Option<Value>,
    pub cookie: Option<SessionCookie>,
}

/// 面板返回的原始响应
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub cookies: Vec<SessionCookie>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401/403 视为会话失效
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 请求发送接口
///
/// 默认实现为 `HttpBackend`，测试中可替换为内存实现。
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: PanelRequest) -> Result<RawResponse>;
}

/// 基于 reqwest 的 HTTP 实现
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &PanelConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(!config.verify_tls);

        if let Some(path) = &config.ca_cert {
            let pem = fs::read(path).map_err(|e| {
                Error::Config(format!("无法读取 CA 证书 {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("CA 证书格式错误: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("HTTP 客户端构建失败: {}", e)))?;

        Ok(Self {
            base_url: config.base_url().to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&self, request: PanelRequest) -> Result<RawResponse> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method, &url)
            .header(ACCEPT, "application/json");
        if let Some(cookie) = &request.cookie {
            builder = builder.header(COOKIE, cookie.header_value());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect();
        let body = resp.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            body,
            cookies,
        })
    }
}

/// 解析一条 `Set-Cookie` 头，只取名称和值
///
/// 值为空的 Cookie（面板用来清除会话）会被忽略。
pub fn parse_set_cookie(header: &str) -> Option<SessionCookie> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    let value = value.trim().trim_matches('"');
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some(SessionCookie::new(name, value))
}
