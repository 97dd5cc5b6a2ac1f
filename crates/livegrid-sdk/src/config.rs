//! SDK 配置

use serde::{Deserialize, Serialize};

use crate::error::{LivegridError, Result};

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// Livegrid SDK 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivegridConfig {
    /// REST API 基础 URL，例如 `https://school.example.com/api/v1/`
    pub api_base_url: String,
    /// 新建缓存的默认每页条数
    pub default_page_length: usize,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 变更通知 broadcast 容量
    pub event_buffer_size: usize,
}

impl Default for LivegridConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api/v1/".to_string(),
            default_page_length: 10,
            http_client_config: HttpClientConfig::default(),
            event_buffer_size: 1000,
        }
    }
}

impl LivegridConfig {
    pub fn builder() -> LivegridConfigBuilder {
        LivegridConfigBuilder::new()
    }

    /// 从 JSON 文档加载配置，缺省字段取默认值
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LivegridConfig =
            serde_json::from_str(json).map_err(|e| LivegridError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.default_page_length == 0 {
            return Err(LivegridError::Config("default_page_length 必须大于 0".to_string()));
        }
        if self.event_buffer_size == 0 {
            return Err(LivegridError::Config("event_buffer_size 必须大于 0".to_string()));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(LivegridError::Config("api_base_url 不能为空".to_string()));
        }
        Ok(())
    }
}

/// Livegrid SDK 配置构建器
pub struct LivegridConfigBuilder {
    config: LivegridConfig,
}

impl LivegridConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LivegridConfig::default(),
        }
    }

    pub fn api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn default_page_length(mut self, page_length: usize) -> Self {
        self.config.default_page_length = page_length;
        self
    }

    /// 设置 HTTP 客户端配置
    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> LivegridConfig {
        self.config
    }
}

impl Default for LivegridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
