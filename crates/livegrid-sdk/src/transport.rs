//! 推送通道传输层抽象
//!
//! hub 只依赖 [`HubTransport`]：
//! - `start` / `status` 管理连接
//! - `invoke` 发送控制消息（Subscribe / Unsubscribe）
//! - `messages` 订阅入站推送
//! - `on_reconnected` 注册重连回调，由传输层在重连完成后调用
//!
//! 真实网络传输不在本 crate 内；[`LoopbackTransport`] 把客户端接到进程内的
//! [`MemoryFeed`]，用于演示和测试。

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::connection_state::{ConnectionState, ConnectionStateManager, ConnectionStatus};
use crate::error::{LivegridError, Result};
use crate::feed::MemoryFeed;

/// 订阅控制消息
pub const SUBSCRIBE: &str = "Subscribe";
/// 取消订阅控制消息
pub const UNSUBSCRIBE: &str = "Unsubscribe";

/// 服务端推送的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    /// 事件名，如 `students_create`
    pub target: String,
    pub payload: serde_json::Value,
}

/// 重连回调
pub type ReconnectCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// 可重连的推送通道
#[async_trait]
pub trait HubTransport: Send + Sync {
    fn status(&self) -> ConnectionStatus;

    /// 建立连接
    async fn start(&self) -> Result<()>;

    /// 调用服务端方法（Subscribe / Unsubscribe）
    async fn invoke(&self, method: &str, topic: &str) -> Result<()>;

    /// 订阅入站推送；重连前后是同一条流
    fn messages(&self) -> broadcast::Receiver<HubMessage>;

    /// 注册重连回调
    fn on_reconnected(&self, callback: ReconnectCallback);
}

/// 进程内回环传输
#[derive(Clone)]
pub struct LoopbackTransport {
    feed: MemoryFeed,
    sender: broadcast::Sender<HubMessage>,
    connection_id: Arc<RwLock<Option<u64>>>,
    state: ConnectionStateManager,
    callbacks: Arc<RwLock<Vec<ReconnectCallback>>>,
}

impl LoopbackTransport {
    pub fn new(feed: MemoryFeed, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            feed,
            sender,
            connection_id: Arc::new(RwLock::new(None)),
            state: ConnectionStateManager::new(),
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 当前连接在 feed 中的 ID
    pub fn connection_id(&self) -> Option<u64> {
        *self.connection_id.read()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get_state()
    }

    /// 模拟断线重连
    ///
    /// 服务端会丢弃旧连接及其分组，重连成功后依次调用已注册的回调。
    pub async fn simulate_reconnect(&self) -> Result<()> {
        let old_id = self.connection_id.write().take().ok_or(LivegridError::NotConnected)?;
        self.state.set_status(ConnectionStatus::Reconnecting);
        self.feed.unregister(old_id);
        warn!("⚠️ 连接 {} 已断开，开始重连", old_id);

        let new_id = self.feed.register(self.sender.clone(), self.state.clone());
        *self.connection_id.write() = Some(new_id);
        self.state.mark_reconnected();
        info!("✅ 重连成功: {} -> {}", old_id, new_id);
        self.state.log_state();

        // 不持锁调用回调
        let callbacks: Vec<ReconnectCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback().await;
        }
        Ok(())
    }
}

#[async_trait]
impl HubTransport for LoopbackTransport {
    fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    async fn start(&self) -> Result<()> {
        self.state.set_status(ConnectionStatus::Connecting);
        let id = self.feed.register(self.sender.clone(), self.state.clone());
        *self.connection_id.write() = Some(id);
        self.state.set_status(ConnectionStatus::Connected);
        info!("🔗 回环连接已建立: {}", id);
        Ok(())
    }

    async fn invoke(&self, method: &str, topic: &str) -> Result<()> {
        let id = self.connection_id().ok_or(LivegridError::NotConnected)?;
        self.state.increment_invocations();
        match method {
            SUBSCRIBE => self.feed.add_to_group(id, topic),
            UNSUBSCRIBE => self.feed.remove_from_group(id, topic),
            other => {
                return Err(LivegridError::Transport(format!("未知的 hub 方法: {}", other)));
            }
        }
        debug!("{}({}) via connection {}", method, topic, id);
        Ok(())
    }

    fn messages(&self) -> broadcast::Receiver<HubMessage> {
        self.sender.subscribe()
    }

    fn on_reconnected(&self, callback: ReconnectCallback) {
        self.callbacks.write().push(callback);
    }
}
