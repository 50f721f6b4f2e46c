//! 3x-ui 面板 API 客户端
//!
//! 登录面板后保存会话 Cookie，对入站与客户端进行增删改查。
//! 提供异步的 [`AsyncApi`] 与阻塞的 [`blocking::Api`] 两种入口，
//! 两者的操作完全一致。会话过期时默认自动重新登录并重试一次。

pub mod api;
pub mod blocking;
pub mod codec;
pub mod config;
pub mod error;
mod loose;
pub mod models;
pub mod session;
pub mod transport;

pub use api::{AsyncApi, ClientsApi, DatabaseApi, InboundsApi};
pub use config::PanelConfig;
pub use error::{Error, Result};
pub use models::{Client, ClientTraffic, Inbound, Settings, Sniffing, StreamSettings, TrafficStats};
pub use transport::{Backend, HttpBackend, PanelRequest, RawResponse, SessionCookie};
