//! 进程内通知中心（服务端 hub）
//!
//! 维护连接与分组：
//! - 分组名为端点名（如 `students`）或单条实体分组（如 `students.12`）
//! - 向多个分组发送时，每个连接只收到一次

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::connection_state::ConnectionStateManager;
use crate::transport::HubMessage;

struct Connection {
    sender: broadcast::Sender<HubMessage>,
    state: ConnectionStateManager,
}

#[derive(Default)]
struct FeedInner {
    connections: RwLock<HashMap<u64, Connection>>,
    groups: RwLock<HashMap<String, HashSet<u64>>>,
    next_id: AtomicU64,
}

/// 进程内通知中心
#[derive(Clone, Default)]
pub struct MemoryFeed {
    inner: Arc<FeedInner>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接，返回连接 ID
    pub fn register(&self, sender: broadcast::Sender<HubMessage>, state: ConnectionStateManager) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.connections.write().insert(id, Connection { sender, state });
        debug!("连接 {} 已注册", id);
        id
    }

    /// 移除连接及其全部分组
    pub fn unregister(&self, id: u64) {
        self.inner.connections.write().remove(&id);
        let mut groups = self.inner.groups.write();
        for members in groups.values_mut() {
            members.remove(&id);
        }
        groups.retain(|_, members| !members.is_empty());
        debug!("连接 {} 已移除", id);
    }

    pub fn add_to_group(&self, id: u64, group: &str) {
        self.inner
            .groups
            .write()
            .entry(group.to_string())
            .or_default()
            .insert(id);
        info!("连接 {} 加入分组 {}", id, group);
    }

    pub fn remove_from_group(&self, id: u64, group: &str) {
        let mut groups = self.inner.groups.write();
        if let Some(members) = groups.get_mut(group) {
            members.remove(&id);
            if members.is_empty() {
                groups.remove(group);
            }
        }
        info!("连接 {} 离开分组 {}", id, group);
    }

    /// 分组当前成员数
    pub fn group_size(&self, group: &str) -> usize {
        self.inner.groups.read().get(group).map_or(0, HashSet::len)
    }

    /// 向若干分组推送，返回实际投递的连接数
    pub fn send_to_groups(&self, groups: &[String], target: &str, payload: serde_json::Value) -> usize {
        let recipients: HashSet<u64> = {
            let all = self.inner.groups.read();
            groups
                .iter()
                .filter_map(|g| all.get(g))
                .flat_map(|members| members.iter().copied())
                .collect()
        };

        let connections = self.inner.connections.read();
        let mut delivered = 0;
        for id in recipients {
            if let Some(connection) = connections.get(&id) {
                let message = HubMessage {
                    target: target.to_string(),
                    payload: payload.clone(),
                };
                // 客户端尚未订阅消息流时 send 会失败，仍视为已投递
                let _ = connection.sender.send(message);
                connection.state.increment_received();
                delivered += 1;
            }
        }
        debug!("📡 {} -> {:?}: 投递 {} 个连接", target, groups, delivered);
        delivered
    }
}
