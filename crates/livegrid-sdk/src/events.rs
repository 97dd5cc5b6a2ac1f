//! 集合变更事件 - 供 UI 绑定的细粒度通知
//!
//! 功能包括：
//! - add / remove / replace 三类变更
//! - 同步监听器（在缓存修改后立即回调，不能回到缓存的修改路径）
//! - broadcast 订阅（供异步消费者使用）
//! - 事件统计

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
            ChangeKind::Replace => "replace",
        }
    }
}

/// 集合变更（index 为缓存中的绝对位置）
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// 从 index 起写入了一段数据
    Add { items: Vec<T>, index: usize },
    /// index 处的数据被移除，后续数据前移
    Remove { item: T, index: usize },
    /// index 处的数据被替换
    Replace { item: T, old_item: T, index: usize },
}

impl<T> CollectionChange<T> {
    pub fn kind(&self) -> ChangeKind {
        match self {
            CollectionChange::Add { .. } => ChangeKind::Add,
            CollectionChange::Remove { .. } => ChangeKind::Remove,
            CollectionChange::Replace { .. } => ChangeKind::Replace,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            CollectionChange::Add { index, .. }
            | CollectionChange::Remove { index, .. }
            | CollectionChange::Replace { index, .. } => *index,
        }
    }
}

/// 变更监听器类型
pub type ChangeListener<T> = Box<dyn Fn(&CollectionChange<T>) + Send + Sync>;

/// 变更统计
#[derive(Debug, Clone, Default)]
pub struct ChangeStats {
    pub total_changes: u64,
    pub changes_by_kind: HashMap<ChangeKind, u64>,
    pub listener_count: usize,
}

/// 变更通知器
pub struct ChangeNotifier<T> {
    sender: broadcast::Sender<CollectionChange<T>>,
    listeners: Arc<RwLock<Vec<ChangeListener<T>>>>,
    stats: Arc<RwLock<ChangeStats>>,
}

impl<T: Clone + Send + 'static> ChangeNotifier<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(RwLock::new(ChangeStats::default())),
        }
    }

    /// 发布变更
    pub fn emit(&self, change: CollectionChange<T>) {
        debug!("Emitting change: {} @ {}", change.kind().as_str(), change.index());

        {
            let mut stats = self.stats.write();
            stats.total_changes += 1;
            *stats.changes_by_kind.entry(change.kind()).or_insert(0) += 1;
        }

        for listener in self.listeners.read().iter() {
            listener(&change);
        }

        // 没有订阅者时 send 会失败，属正常场景
        if self.sender.send(change).is_err() {
            debug!("No active change receivers");
        }
    }

    /// 订阅变更流
    pub fn subscribe(&self) -> broadcast::Receiver<CollectionChange<T>> {
        self.sender.subscribe()
    }

    /// 添加同步监听器
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        listeners.push(Box::new(listener));
        self.stats.write().listener_count = listeners.len();
    }

    /// 移除所有监听器
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
        self.stats.write().listener_count = 0;
    }

    pub fn stats(&self) -> ChangeStats {
        self.stats.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
