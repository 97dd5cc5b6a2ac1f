/// SDK 统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum LivegridError {
    /// 远端请求失败：非成功状态码、传输层错误或响应体无法解析
    #[error("Request error{}: {message}", .status.map(|s| format!(" [{}]", s)).unwrap_or_default())]
    Request {
        status: Option<u16>,
        message: String,
    },

    /// 推送或配置负载无法反序列化
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 访问当前页窗口之外的位置（调用方违约）
    #[error("Index {index} out of range for page length {page_length}")]
    Index { index: usize, page_length: usize },

    /// 排序字段不存在或不可排序
    #[error("Property {0} not found or not sortable")]
    SortField(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for LivegridError {
    fn from(error: serde_json::Error) -> Self {
        LivegridError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for LivegridError {
    fn from(error: reqwest::Error) -> Self {
        LivegridError::Request {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

impl LivegridError {
    /// 构造请求错误
    pub fn request<T: std::fmt::Display>(status: Option<u16>, message: T) -> Self {
        LivegridError::Request {
            status,
            message: message.to_string(),
        }
    }

    /// 判断是否是远端请求错误
    pub fn is_request_error(&self) -> bool {
        matches!(self, LivegridError::Request { .. })
    }

    /// 获取 HTTP 状态码（如果有）
    pub fn status(&self) -> Option<u16> {
        match self {
            LivegridError::Request { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LivegridError>;
