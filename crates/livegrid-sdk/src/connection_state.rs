//! 连接状态管理
//!
//! 推送通道的连接状态与统计，由传输层维护，hub 只读取。

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// 未连接
    Disconnected,
    /// 连接中
    Connecting,
    /// 已连接
    Connected,
    /// 重连中
    Reconnecting,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "未连接"),
            ConnectionStatus::Connecting => write!(f, "连接中"),
            ConnectionStatus::Connected => write!(f, "已连接"),
            ConnectionStatus::Reconnecting => write!(f, "重连中"),
        }
    }
}

/// 连接状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// 已完成的重连次数
    pub reconnect_count: u64,
    /// 已接收推送数
    pub messages_received: u64,
    /// 已发出的控制消息数（Subscribe / Unsubscribe）
    pub invocations_sent: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            reconnect_count: 0,
            messages_received: 0,
            invocations_sent: 0,
        }
    }

    /// 生成状态摘要（用于日志打印）
    pub fn summary(&self) -> String {
        format!(
            "【连接状态】状态: {}, 重连: {}次, 接收: {}条, 控制消息: {}条",
            self.status, self.reconnect_count, self.messages_received, self.invocations_sent
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// 连接状态管理器（线程安全）
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateManager {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.state.write().status = status;
    }

    /// 标记重连完成
    pub fn mark_reconnected(&self) {
        let mut state = self.state.write();
        state.status = ConnectionStatus::Connected;
        state.reconnect_count += 1;
    }

    pub fn increment_received(&self) {
        self.state.write().messages_received += 1;
    }

    pub fn increment_invocations(&self) {
        self.state.write().invocations_sent += 1;
    }

    /// 获取当前状态快照
    pub fn get_state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// 打印状态到日志
    pub fn log_state(&self) {
        tracing::info!("{}", self.get_state().summary());
    }
}
