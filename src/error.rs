use thiserror::Error;

use crate::models::stage::Stage;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（4xx，不重试）
    #[error("输入错误: {0}")]
    Validation(#[from] ValidationError),
    /// 外部生成/存储服务错误（5xx，不自动重试）
    #[error("上游服务错误: {0}")]
    Upstream(#[from] UpstreamError),
    /// 会话状态机错误（仅客户端）
    #[error("会话错误: {0}")]
    Session(#[from] SessionError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 输入校验错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// 作文题目为空
    #[error("essay question must not be empty")]
    EmptyQuestion,
    /// 论点为空
    #[error("point must not be empty")]
    EmptyPoint,
    /// 论据为空
    #[error("evidence must not be empty")]
    EmptyEvidence,
    /// 解释为空
    #[error("explanation must not be empty")]
    EmptyExplanation,
    /// 聊天内容为空
    #[error("missing or invalid 'content'")]
    EmptyContent,
    /// 不支持的文件类型
    #[error("only PDF files are allowed (got '{mime}')")]
    UnsupportedType { mime: String },
    /// 表单中没有文件字段
    #[error("no file found in form data")]
    MissingFile,
    /// 文件为空
    #[error("uploaded file is empty")]
    EmptyFile,
    /// 文件过大
    #[error("file is {size} bytes, limit is {max} bytes")]
    FileTooLarge { size: usize, max: usize },
    /// 服务端没有给出任何论点
    #[error("no points were offered for this question")]
    NoPoints,
    /// 选择的论点不在候选列表中
    #[error("point '{point}' was not offered in this session")]
    PointNotOffered { point: String },
    /// 缺少图片数据
    #[error("missing image data")]
    MissingImage,
    /// 服务端拒绝了请求（客户端视角）
    #[error("{0}")]
    Rejected(String),
}

/// 外部服务错误
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// 网络请求失败
    #[error("request to {endpoint} failed: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回非成功状态码
    #[error("{endpoint} returned {status}: {body}")]
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 请求超时
    #[error("{endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },
    /// 响应解析失败
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 流式响应中途报错
    #[error("generation stream failed: {message}")]
    StreamFailed { message: String },
    /// Chat Completions 调用失败
    #[error("model {model} call failed: {source}")]
    Completion {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// 会话状态机错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// 上一个操作尚未完成
    #[error("another action is still in flight")]
    Busy,
    /// 当前阶段不允许该操作
    #[error("'{action}' is not allowed at stage '{stage}'")]
    InvalidTransition { stage: Stage, action: &'static str },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少 API 密钥
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    /// 配置值非法
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
    /// 配置文件读取失败
    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Upstream(UpstreamError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建状态码错误
    pub fn bad_status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        AppError::Upstream(UpstreamError::BadStatus {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        })
    }

    /// 创建超时错误
    pub fn timeout(endpoint: impl Into<String>, secs: u64) -> Self {
        AppError::Upstream(UpstreamError::Timeout {
            endpoint: endpoint.into(),
            secs,
        })
    }

    /// 创建解析失败错误
    pub fn decode_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Upstream(UpstreamError::Decode {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建非法阶段转换错误
    pub fn invalid_transition(stage: Stage, action: &'static str) -> Self {
        AppError::Session(SessionError::InvalidTransition { stage, action })
    }

    /// 是否属于客户端输入错误
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
