//! 进程内集合后端
//!
//! 实现与服务端一致的查询语义，并在增删改后向 [`MemoryFeed`] 推送通知：
//! - 查询：自由文本过滤 → 计数 → 校验排序字段 → 排序 → 分页
//! - create 推送到 `<endpoint>` 分组
//! - update / delete 推送到 `<endpoint>` 与 `<endpoint>.<key>` 分组

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::error::Result;
use crate::feed::MemoryFeed;
use crate::remote::{PageRequest, PageResult, RemoteCollection};

/// 主键生成器
pub type KeyGenerator<K> = Box<dyn Fn() -> K + Send + Sync>;

/// 从 `start` 开始递增的主键生成器
pub fn sequential_keys<K: From<u32>>(start: u32) -> KeyGenerator<K> {
    let next = AtomicU32::new(start);
    Box::new(move || K::from(next.fetch_add(1, Ordering::SeqCst)))
}

/// 进程内集合后端
pub struct MemoryBackend<T: Entity> {
    items: RwLock<Vec<T>>,
    feed: MemoryFeed,
    key_gen: KeyGenerator<T::Key>,
    fetch_calls: AtomicUsize,
}

impl<T: Entity> MemoryBackend<T> {
    pub fn new(feed: MemoryFeed, key_gen: KeyGenerator<T::Key>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            feed,
            key_gen,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// 直接写入初始数据，不推送通知
    pub fn seed<I: IntoIterator<Item = T>>(&self, items: I) {
        self.items.write().extend(items);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已处理的分页查询次数
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// 当前全部数据（按插入顺序）
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    fn publish(&self, groups: Vec<String>, target: String, item: &impl serde::Serialize) -> Result<()> {
        let payload = serde_json::to_value(item)?;
        self.feed.send_to_groups(&groups, &target, payload);
        Ok(())
    }
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for MemoryBackend<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let descriptor = T::descriptor();

        let mut matched: Vec<T> = self
            .items
            .read()
            .iter()
            .filter(|item| descriptor.matches_query(item, &request.query))
            .cloned()
            .collect();
        let total_items = matched.len();

        let compare = descriptor.comparator(&request.sort_by).map_err(|e| {
            warn!("⚠️ 排序字段不可用: {}", request.sort_by);
            e
        })?;
        matched.sort_by(compare);
        if !request.ascending {
            matched.reverse();
        }

        let items: Vec<T> = matched
            .into_iter()
            .skip(request.offset())
            .take(request.page_length)
            .collect();
        debug!(
            "{} 第 {} 页: {} 条 / 共 {} 条",
            descriptor.endpoint,
            request.page,
            items.len(),
            total_items
        );
        Ok(PageResult { items, total_items })
    }

    async fn fetch_one(&self, raw_key: &str) -> Result<Option<T>> {
        let items = self.items.read();
        let found = T::descriptor().find_by_any_key(items.iter(), raw_key).cloned();
        if found.is_none() {
            warn!("{} with id {} not found", T::descriptor().endpoint, raw_key);
        }
        Ok(found)
    }

    async fn create(&self, item: &T) -> Result<T::Key> {
        let descriptor = T::descriptor();
        let mut item = item.clone();
        let key = (self.key_gen)();
        item.set_key(key.clone());
        self.items.write().push(item.clone());
        info!("{} with id {} created", descriptor.endpoint, key);

        self.publish(
            vec![descriptor.endpoint.to_string()],
            descriptor.create_event(),
            &item,
        )?;
        Ok(key)
    }

    async fn update(&self, item: &T) -> Result<bool> {
        let descriptor = T::descriptor();
        let replaced = {
            let mut items = self.items.write();
            match items.iter_mut().find(|existing| existing.key() == item.key()) {
                Some(existing) => {
                    *existing = item.clone();
                    true
                }
                None => false,
            }
        };
        if !replaced {
            warn!("{} with id {} not found", descriptor.endpoint, item.key());
            return Ok(false);
        }
        info!("{} with id {} overridden", descriptor.endpoint, item.key());

        self.publish(
            vec![descriptor.endpoint.to_string(), descriptor.item_topic(item.key())],
            descriptor.update_event(),
            item,
        )?;
        Ok(true)
    }

    async fn remove(&self, key: &T::Key) -> Result<bool> {
        let descriptor = T::descriptor();
        let removed = {
            let mut items = self.items.write();
            let before = items.len();
            items.retain(|existing| existing.key() != key);
            items.len() != before
        };
        if !removed {
            warn!("{} with id {} not found", descriptor.endpoint, key);
            return Ok(false);
        }
        info!("{} with id {} deleted", descriptor.endpoint, key);

        self.publish(
            vec![descriptor.endpoint.to_string(), descriptor.item_topic(key)],
            descriptor.delete_event(),
            key,
        )?;
        Ok(true)
    }
}
