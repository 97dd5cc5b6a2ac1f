//! 远端集合接口
//!
//! 分页查询 + 增删改。每次调用只发一次请求：不缓存、不重试，错误直接返回给调用方。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::Result;

/// 分页查询参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
    pub page: usize,
    pub page_length: usize,
    /// 空字符串表示按主键排序
    pub sort_by: String,
    pub ascending: bool,
    pub query: String,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_length: usize::MAX,
            sort_by: String::new(),
            ascending: true,
            query: String::new(),
        }
    }
}

impl PageRequest {
    /// 该页第一条数据的绝对位置
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_length)
    }
}

/// 分页查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// 满足查询条件的总条数（服务端权威值）
    pub total_items: usize,
}

/// 远端集合
#[async_trait]
pub trait RemoteCollection<T: Entity>: Send + Sync {
    /// 查询一页
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>>;

    /// 按任意键查询单条，不存在时返回 `None`
    async fn fetch_one(&self, raw_key: &str) -> Result<Option<T>>;

    /// 创建，返回服务端生成的主键
    async fn create(&self, item: &T) -> Result<T::Key>;

    /// 更新；目标不存在时返回 `false`
    async fn update(&self, item: &T) -> Result<bool>;

    /// 删除；目标不存在时返回 `false`
    async fn remove(&self, key: &T::Key) -> Result<bool>;
}
