//! 面板数据模型
//!
//! 字段名与面板 JSON 保持一致（camelCase），类型不一致的字段
//! 统一通过 `crate::loose` 做转换。

mod client;
mod inbound;
mod traffic;

pub use client::{Client, ClientTraffic};
pub use inbound::{Inbound, Settings, Sniffing, StreamSettings};
pub use traffic::TrafficStats;
