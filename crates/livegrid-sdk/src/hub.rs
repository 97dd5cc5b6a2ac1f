//! 通知订阅通道
//!
//! 维护已加入的 topic 集合，传输层重连后自动重新加入全部 topic。
//! 服务端加入分组是幂等的，重复 Subscribe 不会有副作用。

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::connection_state::ConnectionStatus;
use crate::entity::Entity;
use crate::error::Result;
use crate::push::PushEvents;
use crate::transport::{HubMessage, HubTransport, SUBSCRIBE, UNSUBSCRIBE};

struct HubInner {
    transport: Arc<dyn HubTransport>,
    joined: RwLock<HashSet<String>>,
}

impl HubInner {
    async fn rejoin_all(&self) {
        let topics: Vec<String> = self.joined.read().await.iter().cloned().collect();
        info!("🔄 重连完成，重新加入 {} 个 topic", topics.len());
        for topic in topics {
            if let Err(e) = self.transport.invoke(SUBSCRIBE, &topic).await {
                warn!("⚠️ 重新加入 {} 失败: {}", topic, e);
            }
        }
    }
}

/// 通知订阅通道
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

impl NotificationHub {
    pub fn new(transport: Arc<dyn HubTransport>) -> Self {
        let inner = Arc::new(HubInner {
            transport,
            joined: RwLock::new(HashSet::new()),
        });

        // 回调只持有弱引用，避免 transport ↔ hub 循环引用
        let weak: Weak<HubInner> = Arc::downgrade(&inner);
        inner.transport.on_reconnected(Arc::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.rejoin_all().await;
                }
            }
            .boxed()
        }));

        Self { inner }
    }

    /// 连接；已连接或连接中时什么都不做
    pub async fn connect(&self) -> Result<()> {
        let status = self.inner.transport.status();
        if status != ConnectionStatus::Disconnected {
            debug!("hub 已处于 {}，跳过连接", status);
            return Ok(());
        }
        self.inner.transport.start().await
    }

    /// 加入 topic
    pub async fn join(&self, topic: &str) -> Result<()> {
        self.inner.joined.write().await.insert(topic.to_string());
        self.inner.transport.invoke(SUBSCRIBE, topic).await?;
        info!("✅ 已加入 topic: {}", topic);
        Ok(())
    }

    /// 离开 topic；未加入时什么都不做
    pub async fn leave(&self, topic: &str) -> Result<()> {
        if !self.inner.joined.write().await.remove(topic) {
            debug!("topic {} 未加入，忽略 leave", topic);
            return Ok(());
        }
        self.inner.transport.invoke(UNSUBSCRIBE, topic).await?;
        info!("已离开 topic: {}", topic);
        Ok(())
    }

    pub async fn is_joined(&self, topic: &str) -> bool {
        self.inner.joined.read().await.contains(topic)
    }

    pub async fn joined_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.joined.read().await.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.transport.status()
    }

    /// 订阅原始推送
    pub fn messages(&self) -> broadcast::Receiver<HubMessage> {
        self.inner.transport.messages()
    }

    /// 订阅某个实体类型的 create / update / delete 推送
    pub fn events<T: Entity>(&self) -> PushEvents<T> {
        PushEvents::new(self.messages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MemoryFeed;
    use crate::transport::LoopbackTransport;

    fn hub_with_feed() -> (NotificationHub, LoopbackTransport, MemoryFeed) {
        let feed = MemoryFeed::new();
        let transport = LoopbackTransport::new(feed.clone(), 32);
        let hub = NotificationHub::new(Arc::new(transport.clone()));
        (hub, transport, feed)
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (hub, transport, _feed) = hub_with_feed();
        hub.connect().await.unwrap();
        let first = transport.connection_id();
        hub.connect().await.unwrap();
        assert_eq!(transport.connection_id(), first);
        assert_eq!(hub.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn leave_unjoined_topic_is_noop() {
        let (hub, transport, _feed) = hub_with_feed();
        hub.connect().await.unwrap();
        hub.leave("courses").await.unwrap();
        assert_eq!(transport.connection_state().invocations_sent, 0);
    }

    #[tokio::test]
    async fn join_and_leave_track_topics() {
        let (hub, _transport, feed) = hub_with_feed();
        hub.connect().await.unwrap();
        hub.join("students").await.unwrap();
        hub.join("courses").await.unwrap();
        assert_eq!(hub.joined_topics().await, vec!["courses", "students"]);
        assert_eq!(feed.group_size("students"), 1);

        hub.leave("students").await.unwrap();
        assert!(!hub.is_joined("students").await);
        assert_eq!(feed.group_size("students"), 0);
        assert_eq!(feed.group_size("courses"), 1);
    }

    #[tokio::test]
    async fn reconnect_replays_joins() {
        let (hub, transport, feed) = hub_with_feed();
        hub.connect().await.unwrap();
        hub.join("students").await.unwrap();
        hub.join("courses").await.unwrap();
        hub.leave("courses").await.unwrap();

        transport.simulate_reconnect().await.unwrap();

        assert_eq!(feed.group_size("students"), 1);
        assert_eq!(feed.group_size("courses"), 0);
        assert_eq!(hub.joined_topics().await, vec!["students"]);
    }

    #[tokio::test]
    async fn join_before_connect_fails_but_is_remembered() {
        let (hub, transport, feed) = hub_with_feed();
        assert!(hub.join("students").await.is_err());
        assert!(hub.is_joined("students").await);

        // 连接建立后的首次重连会补上这个 topic
        hub.connect().await.unwrap();
        transport.simulate_reconnect().await.unwrap();
        assert_eq!(feed.group_size("students"), 1);
    }
}
