use serde::{Deserialize, Serialize};

/// 上下行流量快照（字节）
///
/// 每次都从面板重新读取，不做缓存。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub up: i64,
    pub down: i64,
}

impl TrafficStats {
    pub fn new(up: i64, down: i64) -> Self {
        Self { up, down }
    }

    pub fn total(&self) -> i64 {
        self.up.saturating_add(self.down)
    }
}
