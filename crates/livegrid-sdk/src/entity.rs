//! 实体描述 - 每种实体类型的静态配置
//!
//! 每个实体类型在编译期声明一份 [`EntityDescriptor`]：
//! - REST 端点名（同时也是通知 topic 名）
//! - 主键字段
//! - 可搜索字段（自由文本查询时做子串匹配）
//! - 可排序字段（字段名 → 比较函数）
//! - 按任意键查找的策略列表（按声明顺序尝试，解析失败即跳过）

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LivegridError, Result};

/// 字段比较函数
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// 可被窗口缓存管理的实体
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 主键类型
    type Key: Clone
        + Debug
        + Display
        + Ord
        + Hash
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn key(&self) -> &Self::Key;

    /// 写回服务端生成的主键
    fn set_key(&mut self, key: Self::Key);

    fn descriptor() -> &'static EntityDescriptor<Self>;
}

/// 可搜索字段
pub struct SearchableField<T> {
    pub name: &'static str,
    /// 取出用于匹配的文本
    pub text: fn(&T) -> String,
}

/// 可排序字段
pub struct SortableField<T> {
    pub name: &'static str,
    pub compare: Comparator<T>,
}

/// 按某个键字段查找的策略
///
/// `matches` 先把原始键解析成该字段的类型；解析失败返回 `None`（该策略不适用），
/// 否则返回是否命中。
pub struct KeyLookup<T> {
    pub field: &'static str,
    pub matches: fn(&T, &str) -> Option<bool>,
}

/// 实体类型的静态描述
pub struct EntityDescriptor<T: 'static> {
    /// REST 端点，同时是通知 topic
    pub endpoint: &'static str,
    pub key_field: &'static str,
    pub searchable: &'static [SearchableField<T>],
    pub sortable: &'static [SortableField<T>],
    pub lookups: &'static [KeyLookup<T>],
}

impl<T: Entity> EntityDescriptor<T> {
    /// 按字段名解析比较函数，空字段名回退到主键顺序
    ///
    /// 字段名大小写不敏感。
    pub fn comparator(&self, sort_by: &str) -> Result<Comparator<T>> {
        if sort_by.is_empty() || sort_by.eq_ignore_ascii_case(self.key_field) {
            return Ok(compare_keys::<T>);
        }
        self.sortable
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(sort_by))
            .map(|f| f.compare)
            .ok_or_else(|| LivegridError::SortField(sort_by.to_string()))
    }

    /// 主键顺序
    pub fn key_comparator(&self) -> Comparator<T> {
        compare_keys::<T>
    }

    /// 字段是否可排序
    pub fn is_sortable(&self, sort_by: &str) -> bool {
        self.comparator(sort_by).is_ok()
    }

    /// 自由文本匹配：空查询匹配所有，否则任一可搜索字段包含查询串（忽略大小写）
    pub fn matches_query(&self, item: &T, query: &str) -> bool {
        if query.trim().is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        self.searchable
            .iter()
            .any(|f| (f.text)(item).to_lowercase().contains(&needle))
    }

    /// 按任意键查找
    pub fn find_by_any_key<'a, I>(&self, items: I, raw_key: &str) -> Option<&'a T>
    where
        I: IntoIterator<Item = &'a T> + Clone,
    {
        for lookup in self.lookups {
            let mut applicable = true;
            let found = items.clone().into_iter().find(|item| match (lookup.matches)(item, raw_key) {
                Some(hit) => hit,
                None => {
                    applicable = false;
                    false
                }
            });
            if found.is_some() {
                return found;
            }
            if !applicable {
                tracing::debug!("键 {} 不适用于字段 {}，跳过", raw_key, lookup.field);
            }
        }
        None
    }

    /// 实体 create 事件名
    pub fn create_event(&self) -> String {
        format!("{}_create", self.endpoint)
    }

    pub fn update_event(&self) -> String {
        format!("{}_update", self.endpoint)
    }

    pub fn delete_event(&self) -> String {
        format!("{}_delete", self.endpoint)
    }

    /// 单条实体的通知分组
    pub fn item_topic(&self, key: &T::Key) -> String {
        format!("{}.{}", self.endpoint, key)
    }
}

fn compare_keys<T: Entity>(a: &T, b: &T) -> Ordering {
    a.key().cmp(b.key())
}
