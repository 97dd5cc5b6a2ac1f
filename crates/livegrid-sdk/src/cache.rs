//! 窗口缓存 - 远端集合的本地分页视图
//!
//! 本地维护一个稀疏列表（按绝对位置存放，只保存已加载的位置），并始终让
//! 当前页及其前后两页（窗口）保持加载：
//! - 翻页 / 改页长：补齐窗口，已完整加载的页不会重复请求
//! - 改排序 / 改查询：清空本地列表后重新加载窗口
//! - 服务端推送的 create / update / delete 直接在本地对齐，并发出细粒度变更通知
//!
//! 缓存只有一个所有者，所有修改都通过 `&mut self` 串行执行。

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::LivegridConfig;
use crate::entity::{Comparator, Entity};
use crate::error::{LivegridError, Result};
use crate::events::{ChangeNotifier, ChangeStats, CollectionChange};
use crate::hub::NotificationHub;
use crate::push::{PushEvent, PushEvents};
use crate::remote::{PageRequest, RemoteCollection};

/// 窗口 `[page - 1, page + 2)` 的结束位置，溢出时返回 `None`
fn window_end(page: usize, page_length: usize) -> Option<usize> {
    page.checked_add(2)?.checked_mul(page_length)
}

fn check_window(page: usize, page_length: usize) -> Result<()> {
    match window_end(page, page_length) {
        Some(_) => Ok(()),
        None => Err(LivegridError::InvalidArgument(format!(
            "第 {} 页（页长 {}）超出可寻址范围",
            page, page_length
        ))),
    }
}

/// 窗口缓存
pub struct WindowedCache<T: Entity> {
    remote: Arc<dyn RemoteCollection<T>>,
    hub: NotificationHub,
    notifier: ChangeNotifier<T>,
    slots: BTreeMap<usize, T>,
    total_items: usize,
    page: usize,
    page_length: usize,
    sort_by: String,
    ascending: bool,
    query: String,
    comparator: Comparator<T>,
    initialized: bool,
    disposed: bool,
}

impl<T: Entity> WindowedCache<T> {
    pub fn new(remote: Arc<dyn RemoteCollection<T>>, hub: NotificationHub, config: &LivegridConfig) -> Self {
        Self {
            remote,
            hub,
            notifier: ChangeNotifier::new(config.event_buffer_size),
            slots: BTreeMap::new(),
            total_items: 0,
            page: 0,
            page_length: config.default_page_length.max(1),
            sort_by: String::new(),
            ascending: true,
            query: String::new(),
            comparator: T::descriptor().key_comparator(),
            initialized: false,
            disposed: false,
        }
    }

    fn endpoint(&self) -> &'static str {
        T::descriptor().endpoint
    }

    /// 连接 hub，加载初始窗口，然后加入实体 topic
    ///
    /// 返回的推送流在加入 topic 之前就已订阅，加入之后发布的推送不会丢失，
    /// 交给 [`apply`](Self::apply) 处理。
    pub async fn init(&mut self) -> Result<PushEvents<T>> {
        if self.disposed {
            return Err(LivegridError::InvalidArgument("缓存已释放".to_string()));
        }
        if self.initialized {
            debug!("{} 缓存已初始化", self.endpoint());
            return Ok(self.push_events());
        }
        let events = self.hub.events::<T>();
        self.hub.connect().await?;
        self.reload().await?;
        self.hub.join(self.endpoint()).await?;
        self.initialized = true;
        info!("✅ {} 缓存已初始化，共 {} 条", self.endpoint(), self.total_items);
        Ok(events)
    }

    /// 离开实体 topic，之后不再处理推送；重复调用无效果
    pub async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        self.hub.leave(self.endpoint()).await?;
        info!("{} 缓存已释放", self.endpoint());
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ========== 视图状态 ==========

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_length(&self) -> usize {
        self.page_length
    }

    pub fn sort_by(&self) -> &str {
        &self.sort_by
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// 服务端报告的总条数
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// 总页数；空集合也算一页
    pub fn pages(&self) -> usize {
        if self.total_items == 0 {
            1
        } else {
            (self.total_items - 1) / self.page_length + 1
        }
    }

    /// 跳转到指定页；窗口位置溢出时返回 `InvalidArgument`，视图状态不变
    pub async fn set_page(&mut self, page: usize) -> Result<()> {
        check_window(page, self.page_length)?;
        self.page = page;
        self.fill_window().await
    }

    pub async fn next_page(&mut self) -> Result<()> {
        let page = self
            .page
            .checked_add(1)
            .ok_or_else(|| LivegridError::InvalidArgument("已是最后可寻址的页".to_string()))?;
        self.set_page(page).await
    }

    /// 上一页；已在第 0 页时什么都不做
    pub async fn prev_page(&mut self) -> Result<()> {
        match self.page.checked_sub(1) {
            Some(page) => self.set_page(page).await,
            None => Ok(()),
        }
    }

    pub async fn set_page_length(&mut self, page_length: usize) -> Result<()> {
        if page_length == 0 {
            return Err(LivegridError::InvalidArgument("page_length 必须大于 0".to_string()));
        }
        check_window(self.page, page_length)?;
        self.page_length = page_length;
        self.fill_window().await
    }

    /// 修改排序；字段不可排序时返回错误，视图状态不变
    pub async fn set_sort(&mut self, sort_by: &str, ascending: bool) -> Result<()> {
        self.comparator = T::descriptor().comparator(sort_by)?;
        self.sort_by = sort_by.to_string();
        self.ascending = ascending;
        self.reload().await
    }

    pub async fn set_query(&mut self, query: &str) -> Result<()> {
        self.query = query.to_string();
        self.reload().await
    }

    /// 清空本地列表并重新加载窗口
    pub async fn reload(&mut self) -> Result<()> {
        debug!("{} 重新加载 (sortBy={:?}, query={:?})", self.endpoint(), self.sort_by, self.query);
        self.slots.clear();
        self.fill_window().await
    }

    // page 和 page_length 只经由校验过的 setter 修改，窗口内的运算不会溢出
    async fn fill_window(&mut self) -> Result<()> {
        if let Some(prev) = self.page.checked_sub(1) {
            self.fetch_page(prev).await?;
        }
        self.fetch_page(self.page).await?;
        self.fetch_page(self.page + 1).await
    }

    fn page_range(&self, page: usize) -> Result<Range<usize>> {
        page.checked_mul(self.page_length)
            .and_then(|start| Some(start..start.checked_add(self.page_length)?))
            .ok_or_else(|| LivegridError::InvalidArgument(format!("第 {} 页超出可寻址范围", page)))
    }

    fn is_page_loaded(&self, range: &Range<usize>) -> bool {
        self.slots.range(range.clone()).count() == range.len()
    }

    /// 加载一页；该页已完整加载时不发请求
    pub async fn fetch_page(&mut self, page: usize) -> Result<()> {
        let range = self.page_range(page)?;
        if self.is_page_loaded(&range) {
            debug!("{} 第 {} 页已加载，跳过请求", self.endpoint(), page);
            return Ok(());
        }

        let request = PageRequest {
            page,
            page_length: self.page_length,
            sort_by: self.sort_by.clone(),
            ascending: self.ascending,
            query: self.query.clone(),
        };
        let result = self.remote.fetch_page(&request).await?;
        self.total_items = result.total_items;

        if result.items.is_empty() {
            return Ok(());
        }
        for (index, item) in range.clone().zip(result.items.iter()) {
            self.slots.insert(index, item.clone());
        }
        self.notifier.emit(CollectionChange::Add {
            items: result.items,
            index: range.start,
        });
        Ok(())
    }

    /// 把一页标记为未加载
    pub fn invalidate_page(&mut self, page: usize) {
        if let Ok(range) = self.page_range(page) {
            self.slots.retain(|index, _| !range.contains(index));
        }
    }

    /// 丢弃一页后重新加载
    pub async fn refetch_page(&mut self, page: usize) -> Result<()> {
        self.invalidate_page(page);
        self.fetch_page(page).await
    }

    // ========== 读取 ==========

    /// 当前页第 `index` 条；`index` 超出页长时返回 `Index` 错误，未加载时返回 `None`
    pub fn get(&self, index: usize) -> Result<Option<&T>> {
        if index >= self.page_length {
            return Err(LivegridError::Index {
                index,
                page_length: self.page_length,
            });
        }
        Ok(self.slots.get(&(self.page * self.page_length + index)))
    }

    /// 当前页已加载的数据
    pub fn page_items(&self) -> Vec<&T> {
        match self.page_range(self.page) {
            Ok(range) => self.slots.range(range).map(|(_, item)| item).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 绝对位置上的数据
    pub fn slot(&self, index: usize) -> Option<&T> {
        self.slots.get(&index)
    }

    /// 整个稀疏列表：绝对位置 → 已加载的数据
    pub fn slots(&self) -> &BTreeMap<usize, T> {
        &self.slots
    }

    // ========== 变更通知 ==========

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionChange<T>> {
        self.notifier.subscribe()
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        self.notifier.add_listener(listener);
    }

    pub fn change_stats(&self) -> ChangeStats {
        self.notifier.stats()
    }

    /// 额外订阅一路推送流，只能收到订阅之后的推送
    pub fn push_events(&self) -> PushEvents<T> {
        self.hub.events::<T>()
    }

    // ========== 推送对齐 ==========

    /// 处理一条服务端推送；释放后不做任何处理
    pub async fn apply(&mut self, event: PushEvent<T>) -> Result<()> {
        if self.disposed {
            debug!("{} 缓存已释放，忽略推送", self.endpoint());
            return Ok(());
        }
        match event {
            PushEvent::Created(item) => self.on_remote_create(item).await,
            PushEvent::Updated(item) => {
                self.on_remote_update(item);
                Ok(())
            }
            PushEvent::Deleted(key) => self.on_remote_delete(&key).await,
        }
    }

    fn position_of(&self, key: &T::Key) -> Option<usize> {
        self.slots
            .iter()
            .find(|(_, item)| item.key() == key)
            .map(|(index, _)| *index)
    }

    fn compare(&self, a: &T, b: &T) -> Ordering {
        let ordering = (self.comparator)(a, b);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }

    /// 在 `index` 处插入，之后的数据整体后移一位
    fn shift_insert(&mut self, index: usize, item: T) {
        let tail = self.slots.split_off(&index);
        self.slots.insert(index, item);
        self.slots.extend(tail.into_iter().map(|(i, v)| (i + 1, v)));
    }

    /// 移除 `index` 处的数据，之后的数据整体前移一位
    fn shift_remove(&mut self, index: usize) -> Option<T> {
        let removed = self.slots.remove(&index)?;
        let tail = self.slots.split_off(&index);
        self.slots.extend(tail.into_iter().map(|(i, v)| (i - 1, v)));
        Some(removed)
    }

    fn emit_added(&self, index: usize, item: T) {
        self.notifier.emit(CollectionChange::Add {
            items: vec![item],
            index,
        });
    }

    /// 远端新建
    ///
    /// 从当前页前一条开始，到下一页末尾为止，寻找新数据的位置：
    /// - 遇到未加载位置：写入该位置，后面的数据不移动
    /// - 应排在当前页之前：不在本地插入，只重新加载上一页，当前页内容保持不动
    /// - 应排在某条之前：插入该位置，后面的数据后移
    /// - 扫描完仍未找到：属于窗口之外，留给以后的翻页加载
    pub async fn on_remote_create(&mut self, item: T) -> Result<()> {
        self.total_items += 1;
        if !T::descriptor().matches_query(&item, &self.query) {
            debug!("新建的 {} 不满足当前查询", item.key());
            return Ok(());
        }

        let (page_start, scan_end) = match (
            self.page.checked_mul(self.page_length),
            window_end(self.page, self.page_length),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                warn!("⚠️ 第 {} 页超出可寻址范围，忽略新建推送", self.page);
                return Ok(());
            }
        };
        let scan_start = page_start.saturating_sub(1);

        for index in scan_start..scan_end {
            let ordering = self.slots.get(&index).map(|current| self.compare(&item, current));

            match ordering {
                None => {
                    self.slots.insert(index, item.clone());
                    self.emit_added(index, item);
                    return Ok(());
                }
                Some(Ordering::Less) if index < page_start => {
                    debug!("新建的 {} 排在当前页之前，重新加载上一页", item.key());
                    return self.refetch_page(self.page - 1).await;
                }
                Some(Ordering::Less) => {
                    self.shift_insert(index, item.clone());
                    self.emit_added(index, item);
                    return Ok(());
                }
                Some(_) => {}
            }
        }
        debug!("新建的 {} 位于窗口之外", item.key());
        Ok(())
    }

    /// 远端更新；不在本地时忽略
    pub fn on_remote_update(&mut self, item: T) {
        let Some(index) = self.position_of(item.key()) else {
            debug!("更新的 {} 不在本地", item.key());
            return;
        };
        if let Some(old_item) = self.slots.insert(index, item.clone()) {
            self.notifier.emit(CollectionChange::Replace { item, old_item, index });
        }
    }

    /// 远端删除
    ///
    /// 总数先减一；若在本地则移除并通知，然后重新加载所在页，把后面滑入的数据补上。
    pub async fn on_remote_delete(&mut self, key: &T::Key) -> Result<()> {
        self.total_items = self.total_items.saturating_sub(1);
        let Some(index) = self.position_of(key) else {
            debug!("删除的 {} 不在本地", key);
            return Ok(());
        };

        if let Some(item) = self.shift_remove(index) {
            self.notifier.emit(CollectionChange::Remove { item, index });
        }
        self.refetch_page(index / self.page_length).await
    }

    // ========== 远端命令 ==========
    // 不修改本地列表，由服务端推送对齐

    /// 创建并把服务端生成的主键写回 `item`
    pub async fn create(&self, item: &mut T) -> Result<T::Key> {
        let key = self.remote.create(item).await?;
        item.set_key(key.clone());
        Ok(key)
    }

    pub async fn update(&self, item: &T) -> Result<bool> {
        self.remote.update(item).await
    }

    pub async fn remove(&self, key: &T::Key) -> Result<bool> {
        self.remote.remove(key).await
    }
}

impl<T: Entity> Drop for WindowedCache<T> {
    fn drop(&mut self) {
        if self.initialized && !self.disposed {
            warn!("⚠️ {} 缓存未调用 dispose 就被释放，topic 仍在订阅中", self.endpoint());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_state::ConnectionStatus;
    use crate::feed::MemoryFeed;
    use crate::memory::{sequential_keys, MemoryBackend};
    use crate::remote::PageResult;
    use crate::testing::{student, students, Harness, Student};
    use crate::transport::{HubMessage, HubTransport, LoopbackTransport, ReconnectCallback, SUBSCRIBE};
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    fn drain(rx: &mut broadcast::Receiver<CollectionChange<Student>>) -> Vec<CollectionChange<Student>> {
        let mut changes = Vec::new();
        while let Ok(change) = rx.try_recv() {
            changes.push(change);
        }
        changes
    }

    #[tokio::test]
    async fn init_loads_window_and_joins_topic() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();

        assert_eq!(h.cache.total_items(), 30);
        assert_eq!(h.cache.pages(), 3);
        assert_eq!(h.page_ids(), (1..=10).collect::<Vec<u64>>());
        assert_eq!(h.cache.slots().len(), 20);
        assert_eq!(h.backend.fetch_calls(), 2);
        assert!(h.hub.is_joined("students").await);
        assert_eq!(h.feed.group_size("students"), 1);
    }

    #[tokio::test]
    async fn loaded_pages_are_not_fetched_again() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();

        h.cache.set_page(1).await.unwrap();
        assert_eq!(h.backend.fetch_calls(), 3);
        assert_eq!(h.page_ids(), (11..=20).collect::<Vec<u64>>());

        h.cache.prev_page().await.unwrap();
        h.cache.fetch_page(1).await.unwrap();
        assert_eq!(h.backend.fetch_calls(), 3);

        // 绝对位置与页长无关，已加载的数据仍然有效
        h.cache.set_page_length(5).await.unwrap();
        assert_eq!(h.backend.fetch_calls(), 3);
        assert_eq!(h.page_ids(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn prev_page_at_zero_is_noop() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        h.cache.prev_page().await.unwrap();
        assert_eq!(h.cache.page(), 0);

        h.cache.next_page().await.unwrap();
        h.cache.next_page().await.unwrap();
        assert_eq!(h.cache.page(), 2);
        assert_eq!(h.page_ids(), (21..=30).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn zero_page_length_is_rejected() {
        let mut h = Harness::new(5, 10);
        let err = h.cache.set_page_length(0).await.unwrap_err();
        assert!(matches!(err, LivegridError::InvalidArgument(_)));
        assert_eq!(h.cache.page_length(), 10);
    }

    #[tokio::test]
    async fn sort_change_reloads_everything() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();

        h.cache.set_sort("firstName", false).await.unwrap();
        assert_eq!(h.backend.fetch_calls(), 4);
        assert_eq!(h.page_ids(), (21..=30).rev().collect::<Vec<u64>>());
        assert_eq!(h.cache.slots().len(), 20);

        let err = h.cache.set_sort("nickname", true).await.unwrap_err();
        assert!(matches!(err, LivegridError::SortField(_)));
        assert_eq!(h.cache.sort_by(), "firstName");
        assert!(!h.cache.ascending());
        assert_eq!(h.backend.fetch_calls(), 4);
    }

    #[tokio::test]
    async fn query_change_reloads_with_filter() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();

        h.cache.set_query("student1").await.unwrap();
        assert_eq!(h.cache.total_items(), 10);
        assert_eq!(h.cache.pages(), 1);
        assert_eq!(h.page_ids(), (10..=19).collect::<Vec<u64>>());
        assert_eq!(h.cache.slots().len(), 10);
    }

    #[tokio::test]
    async fn empty_collection_has_one_page() {
        let mut h = Harness::new(0, 10);
        h.cache.init().await.unwrap();

        assert_eq!(h.cache.pages(), 1);
        assert_eq!(h.cache.total_items(), 0);
        assert!(h.cache.slots().is_empty());
        assert!(h.cache.page_items().is_empty());
        assert!(h.cache.get(0).unwrap().is_none());

        let err = h.cache.get(10).unwrap_err();
        assert!(matches!(err, LivegridError::Index { index: 10, page_length: 10 }));
    }

    #[tokio::test]
    async fn get_reads_relative_to_current_page() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        h.cache.set_page(1).await.unwrap();

        assert_eq!(h.cache.get(0).unwrap().map(|s| s.id), Some(11));
        assert_eq!(h.cache.get(9).unwrap().map(|s| s.id), Some(20));
        assert!(h.cache.get(10).is_err());
    }

    #[tokio::test]
    async fn pushed_delete_removes_and_refetches_page() {
        let mut h = Harness::new(30, 10);
        let mut events = h.cache.init().await.unwrap();
        let mut rx = h.cache.subscribe();

        assert!(h.backend.remove(&4).await.unwrap());
        let event = events.recv().await.unwrap();
        assert_eq!(event, PushEvent::Deleted(4));
        h.cache.apply(event).await.unwrap();

        assert_eq!(h.cache.total_items(), 29);
        assert_eq!(h.backend.fetch_calls(), 3);
        assert_eq!(h.page_ids(), vec![1, 2, 3, 5, 6, 7, 8, 9, 10, 11]);

        let changes = drain(&mut rx);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            CollectionChange::Remove {
                item: student(4, "Student04", "s4@school.edu"),
                index: 3
            }
        );
        assert_eq!(changes[1].index(), 0);
    }

    #[tokio::test]
    async fn delete_of_unknown_item_only_adjusts_total() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        let mut rx = h.cache.subscribe();

        h.cache.apply(PushEvent::Deleted(25)).await.unwrap();
        assert_eq!(h.cache.total_items(), 29);
        assert_eq!(h.backend.fetch_calls(), 2);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let mut empty = Harness::new(0, 10);
        empty.cache.init().await.unwrap();
        empty.cache.apply(PushEvent::Deleted(1)).await.unwrap();
        assert_eq!(empty.cache.total_items(), 0);
    }

    #[tokio::test]
    async fn pushed_update_replaces_in_place() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        let mut rx = h.cache.subscribe();

        let renamed = student(3, "Renamed", "s3@school.edu");
        h.cache.apply(PushEvent::Updated(renamed.clone())).await.unwrap();
        assert_eq!(h.cache.get(2).unwrap(), Some(&renamed));
        assert_eq!(h.cache.total_items(), 30);
        assert_eq!(
            rx.try_recv().unwrap(),
            CollectionChange::Replace {
                item: renamed,
                old_item: student(3, "Student03", "s3@school.edu"),
                index: 2
            }
        );

        // 不在本地的数据不产生通知
        h.cache.apply(PushEvent::Updated(student(25, "Far", "far@x.io"))).await.unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn pushed_create_inserts_in_sort_order() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        h.cache.set_sort("firstName", true).await.unwrap();
        let mut rx = h.cache.subscribe();

        h.cache
            .apply(PushEvent::Created(student(31, "Student05x", "s31@school.edu")))
            .await
            .unwrap();

        assert_eq!(h.cache.total_items(), 31);
        assert_eq!(h.page_ids(), vec![1, 2, 3, 4, 5, 31, 6, 7, 8, 9]);
        let change = rx.try_recv().unwrap();
        assert_eq!(change.kind(), crate::events::ChangeKind::Add);
        assert_eq!(change.index(), 5);
    }

    #[tokio::test]
    async fn pushed_create_appends_at_end_of_data() {
        let mut h = Harness::new(5, 10);
        h.cache.init().await.unwrap();
        let mut rx = h.cache.subscribe();

        let mut created = student(0, "Student06", "s6@school.edu");
        let key = h.cache.create(&mut created).await.unwrap();
        assert_eq!(key, 6);
        assert_eq!(created.id, 6);
        // create 本身不修改本地列表
        assert_eq!(h.cache.slots().len(), 5);

        h.cache.apply(PushEvent::Created(created)).await.unwrap();
        assert_eq!(h.page_ids(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(rx.try_recv().unwrap().index(), 5);
    }

    #[tokio::test]
    async fn pushed_create_before_current_page_refetches_previous_page() {
        let mut h = Harness::new(40, 10);
        h.cache.init().await.unwrap();
        h.cache.set_sort("id", false).await.unwrap();
        h.cache.set_page(1).await.unwrap();
        let mut events = h.cache.push_events();
        let calls = h.backend.fetch_calls();
        let current: Vec<u64> = h.page_ids();
        assert_eq!(current, (21..=30).rev().collect::<Vec<u64>>());

        let mut rx = h.cache.subscribe();
        let mut created = student(0, "Newest", "new@school.edu");
        h.cache.create(&mut created).await.unwrap();
        assert_eq!(created.id, 41);

        let event = events.recv().await.unwrap();
        h.cache.apply(event).await.unwrap();

        // 当前页保持不动，上一页重新加载
        assert_eq!(h.page_ids(), current);
        assert_eq!(h.backend.fetch_calls(), calls + 1);
        let previous: Vec<u64> = h.cache.slots().range(0..10).map(|(_, s)| s.id).collect();
        assert_eq!(previous, (32..=41).rev().collect::<Vec<u64>>());
        assert_eq!(h.cache.total_items(), 41);

        let changes = drain(&mut rx);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].index(), 0);
    }

    #[tokio::test]
    async fn pushed_create_outside_window_is_not_inserted() {
        let mut h = Harness::new(50, 10);
        h.cache.init().await.unwrap();
        let mut rx = h.cache.subscribe();

        h.cache
            .apply(PushEvent::Created(student(51, "Student51", "s51@school.edu")))
            .await
            .unwrap();
        assert_eq!(h.cache.total_items(), 51);
        assert_eq!(h.cache.slots().len(), 20);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn pushed_create_not_matching_query_is_ignored() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        h.cache.set_query("student1").await.unwrap();
        let mut rx = h.cache.subscribe();

        h.cache
            .apply(PushEvent::Created(student(31, "Zed", "zed@x.io")))
            .await
            .unwrap();
        assert_eq!(h.cache.total_items(), 11);
        assert_eq!(h.cache.slots().len(), 10);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_stops_reconciliation() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();

        h.cache.dispose().await.unwrap();
        h.cache.dispose().await.unwrap();
        assert!(h.cache.is_disposed());
        assert!(!h.hub.is_joined("students").await);
        assert_eq!(h.feed.group_size("students"), 0);

        h.cache.apply(PushEvent::Deleted(1)).await.unwrap();
        assert_eq!(h.cache.total_items(), 30);
        assert_eq!(h.page_ids(), (1..=10).collect::<Vec<u64>>());

        let err = h.cache.init().await.unwrap_err();
        assert!(matches!(err, LivegridError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn pushes_resume_after_reconnect() {
        let mut h = Harness::new(30, 10);
        let mut events = h.cache.init().await.unwrap();

        h.transport.simulate_reconnect().await.unwrap();
        assert_eq!(h.feed.group_size("students"), 1);

        h.backend.update(&student(2, "Renamed", "s2@school.edu")).await.unwrap();
        let event = events.recv().await.unwrap();
        h.cache.apply(event).await.unwrap();
        assert_eq!(h.cache.get(1).unwrap().map(|s| s.first_name.as_str()), Some("Renamed"));
    }

    #[tokio::test]
    async fn listeners_see_changes_synchronously() {
        let mut h = Harness::new(3, 10);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        h.cache.add_listener(move |change| seen_clone.lock().push(change.index()));

        h.cache.init().await.unwrap();
        assert_eq!(*seen.lock(), vec![0]);
        assert_eq!(h.cache.change_stats().total_changes, 1);
    }

    #[tokio::test]
    async fn pushed_create_fills_interior_hole_without_shifting() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        h.cache.invalidate_page(0);
        assert_eq!(h.cache.slots().len(), 10);
        let mut rx = h.cache.subscribe();

        h.cache
            .apply(PushEvent::Created(student(31, "Student31", "s31@school.edu")))
            .await
            .unwrap();

        assert_eq!(h.cache.slot(0).map(|s| s.id), Some(31));
        assert!(h.cache.slot(1).is_none());
        // 已加载的下一页保持原位
        let next: Vec<u64> = h.cache.slots().range(10..20).map(|(_, s)| s.id).collect();
        assert_eq!(next, (11..=20).collect::<Vec<u64>>());
        assert_eq!(h.cache.slots().len(), 11);
        assert_eq!(rx.try_recv().unwrap().index(), 0);
    }

    #[tokio::test]
    async fn page_overflow_is_rejected_without_changing_view() {
        let mut h = Harness::new(30, 10);
        h.cache.init().await.unwrap();
        let calls = h.backend.fetch_calls();

        let err = h.cache.set_page(usize::MAX / 5).await.unwrap_err();
        assert!(matches!(err, LivegridError::InvalidArgument(_)));
        assert_eq!(h.cache.page(), 0);

        let err = h.cache.fetch_page(usize::MAX).await.unwrap_err();
        assert!(matches!(err, LivegridError::InvalidArgument(_)));

        h.cache.set_page(2).await.unwrap();
        let err = h.cache.set_page_length(usize::MAX / 3).await.unwrap_err();
        assert!(matches!(err, LivegridError::InvalidArgument(_)));
        assert_eq!(h.cache.page_length(), 10);
        // 第 2、3 页各请求一次
        assert_eq!(h.backend.fetch_calls(), calls + 2);
        assert_eq!(h.page_ids(), (21..=30).collect::<Vec<u64>>());
    }

    /// 每一页都是满的，总数很大
    struct EndlessRemote;

    #[async_trait]
    impl RemoteCollection<Student> for EndlessRemote {
        async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<Student>> {
            let start = request.offset() as u64;
            let items = (start + 1..=start + request.page_length as u64)
                .map(|id| student(id, "Endless", "endless@school.edu"))
                .collect();
            Ok(PageResult {
                items,
                total_items: 10_000_000,
            })
        }

        async fn fetch_one(&self, _raw_key: &str) -> Result<Option<Student>> {
            Ok(None)
        }

        async fn create(&self, _item: &Student) -> Result<u64> {
            Ok(0)
        }

        async fn update(&self, _item: &Student) -> Result<bool> {
            Ok(false)
        }

        async fn remove(&self, _key: &u64) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn far_page_jump_only_stores_the_window() {
        let transport = LoopbackTransport::new(MemoryFeed::new(), 8);
        let hub = NotificationHub::new(Arc::new(transport));
        let mut cache: WindowedCache<Student> =
            WindowedCache::new(Arc::new(EndlessRemote), hub, &LivegridConfig::default());

        cache.set_page(100_000).await.unwrap();

        assert_eq!(cache.slots().len(), 30);
        assert_eq!(cache.slots().keys().next(), Some(&999_990));
        assert_eq!(cache.get(0).unwrap().map(|s| s.id), Some(1_000_001));
        assert_eq!(cache.page_items().len(), 10);
    }

    /// 加入 topic 后立刻有其他客户端删除了一条数据
    struct RacingTransport {
        inner: LoopbackTransport,
        feed: MemoryFeed,
    }

    #[async_trait]
    impl HubTransport for RacingTransport {
        fn status(&self) -> ConnectionStatus {
            self.inner.status()
        }

        async fn start(&self) -> Result<()> {
            self.inner.start().await
        }

        async fn invoke(&self, method: &str, topic: &str) -> Result<()> {
            self.inner.invoke(method, topic).await?;
            if method == SUBSCRIBE {
                self.feed.send_to_groups(
                    &[topic.to_string()],
                    &format!("{}_delete", topic),
                    serde_json::json!(4),
                );
            }
            Ok(())
        }

        fn messages(&self) -> broadcast::Receiver<HubMessage> {
            self.inner.messages()
        }

        fn on_reconnected(&self, callback: ReconnectCallback) {
            self.inner.on_reconnected(callback)
        }
    }

    #[tokio::test]
    async fn push_published_right_after_join_is_delivered() {
        let feed = MemoryFeed::new();
        let backend = Arc::new(MemoryBackend::<Student>::new(feed.clone(), sequential_keys(31)));
        backend.seed(students(30));
        let transport = RacingTransport {
            inner: LoopbackTransport::new(feed.clone(), 64),
            feed,
        };
        let hub = NotificationHub::new(Arc::new(transport));
        let remote: Arc<dyn RemoteCollection<Student>> = backend.clone();
        let mut cache = WindowedCache::new(remote, hub, &LivegridConfig::default());

        let mut events = cache.init().await.unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event, PushEvent::Deleted(4));

        cache.apply(event).await.unwrap();
        assert_eq!(cache.total_items(), 29);
        cache.dispose().await.unwrap();
    }

    struct FailingRemote;

    #[async_trait]
    impl RemoteCollection<Student> for FailingRemote {
        async fn fetch_page(&self, _request: &PageRequest) -> Result<PageResult<Student>> {
            Err(LivegridError::request(Some(500), "boom"))
        }

        async fn fetch_one(&self, _raw_key: &str) -> Result<Option<Student>> {
            Ok(None)
        }

        async fn create(&self, _item: &Student) -> Result<u64> {
            Err(LivegridError::request(Some(500), "boom"))
        }

        async fn update(&self, _item: &Student) -> Result<bool> {
            Ok(false)
        }

        async fn remove(&self, _key: &u64) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn fetch_failure_propagates_to_caller() {
        let transport = crate::transport::LoopbackTransport::new(MemoryFeed::new(), 8);
        let hub = NotificationHub::new(Arc::new(transport));
        let mut cache: WindowedCache<Student> =
            WindowedCache::new(Arc::new(FailingRemote), hub, &LivegridConfig::default());

        let err = cache.init().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(cache.total_items(), 0);

        let mut item = student(0, "Ada", "ada@x.io");
        assert!(cache.create(&mut item).await.is_err());
        assert_eq!(item.id, 0);
    }
}
