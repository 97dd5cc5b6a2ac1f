//! HTTP 客户端模块 - 远端集合的 REST 实现
//!
//! 每种实体类型对应一个端点：
//! - `GET    {base}/{endpoint}?page&pageLength&sortBy&ascending&query`
//! - `GET    {base}/{endpoint}/{key}`
//! - `POST   {base}/{endpoint}`，返回新主键
//! - `PUT    {base}/{endpoint}/{key}`
//! - `DELETE {base}/{endpoint}/{key}`
//!
//! 不缓存、不重试。

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::config::{HttpClientConfig, LivegridConfig};
use crate::entity::Entity;
use crate::error::{LivegridError, Result};
use crate::remote::{PageRequest, PageResult, RemoteCollection};
use crate::version;

/// 基于 REST 的远端集合
pub struct HttpCollection<T: Entity> {
    client: Client,
    endpoint_url: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> HttpCollection<T> {
    /// 创建新的 HTTP 集合客户端
    pub fn new(config: &HttpClientConfig, base_url: &str) -> Result<Self> {
        let mut builder = Client::builder().user_agent(version::user_agent());

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| LivegridError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let endpoint_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            T::descriptor().endpoint
        );
        info!("✅ HTTP 客户端已创建 ({})", endpoint_url);

        Ok(Self {
            client,
            endpoint_url,
            _marker: PhantomData,
        })
    }

    pub fn from_config(config: &LivegridConfig) -> Result<Self> {
        config.validate()?;
        Self::new(&config.http_client_config, &config.api_base_url)
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    fn item_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint_url, key)
    }
}

/// 非成功状态码转成请求错误
async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "无法读取错误信息".to_string());
    error!("❌ {}失败，HTTP 状态码: {}, 错误: {}", action, status, error_text);
    Err(LivegridError::request(
        Some(status.as_u16()),
        format!("{}失败 ({})", action, error_text),
    ))
}

/// 读取并解析响应体；解析失败同样算作请求错误
async fn read_json<R: DeserializeOwned>(response: Response, action: &str) -> Result<R> {
    let status = response.status().as_u16();
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| {
        error!("❌ {}响应无法解析，HTTP 状态码: {}, 错误: {}", action, status, e);
        LivegridError::request(Some(status), format!("{}响应无法解析 ({})", action, e))
    })
}

#[async_trait]
impl<T: Entity> RemoteCollection<T> for HttpCollection<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>> {
        debug!("GET {} page={} sortBy={:?}", self.endpoint_url, request.page, request.sort_by);
        let response = self
            .client
            .get(&self.endpoint_url)
            .query(request)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            error!("❌ 服务端拒绝排序字段: {}", request.sort_by);
            return Err(LivegridError::SortField(request.sort_by.clone()));
        }
        let response = check_status(response, "查询分页").await?;
        read_json(response, "查询分页").await
    }

    async fn fetch_one(&self, raw_key: &str) -> Result<Option<T>> {
        let response = self.client.get(self.item_url(raw_key)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} 不存在", raw_key);
            return Ok(None);
        }
        let response = check_status(response, "查询").await?;
        Ok(Some(read_json(response, "查询").await?))
    }

    async fn create(&self, item: &T) -> Result<T::Key> {
        let response = self.client.post(&self.endpoint_url).json(item).send().await?;
        let response = check_status(response, "创建").await?;
        let key: T::Key = read_json(response, "创建").await?;
        info!("✅ 已创建 {}", self.item_url(&key.to_string()));
        Ok(key)
    }

    async fn update(&self, item: &T) -> Result<bool> {
        let url = self.item_url(&item.key().to_string());
        let response = self.client.put(&url).json(item).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("更新目标不存在: {}", url);
            return Ok(false);
        }
        check_status(response, "更新").await?;
        Ok(true)
    }

    async fn remove(&self, key: &T::Key) -> Result<bool> {
        let url = self.item_url(&key.to_string());
        let response = self.client.delete(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("删除目标不存在: {}", url);
            return Ok(false);
        }
        check_status(response, "删除").await?;
        Ok(true)
    }
}
