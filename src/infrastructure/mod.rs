//! 基础设施层
//!
//! 外部生成服务和文档存储服务，只暴露能力，不认识 PEEL 流程

pub mod openai_files;
pub mod openai_responses;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::AppResult;
use crate::models::AttachmentRef;

pub use openai_files::OpenAiFiles;
pub use openai_responses::OpenAiResponses;

/// 逐段到达的生成文本
pub type TextStream = BoxStream<'static, AppResult<String>>;

/// 一次生成请求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    /// 系统指令（来自提示词注册表）
    pub instructions: String,
    /// 用户消息
    pub input: String,
    /// 会话附件，原样透传给检索层
    pub attachments: Vec<AttachmentRef>,
    /// 模式标记，写入请求元数据
    pub mode: Option<String>,
}

impl GenerationRequest {
    pub fn new(instructions: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_attachments(mut self, attachments: &[AttachmentRef]) -> Self {
        self.attachments = attachments.to_vec();
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }
}

/// 文本生成能力
#[async_trait]
pub trait Generator: Send + Sync {
    /// 一次性返回全部文本（可能为空字符串）
    async fn generate(&self, request: GenerationRequest) -> AppResult<String>;

    /// 流式返回文本；丢弃返回的流即取消上游传输
    async fn generate_stream(&self, request: GenerationRequest) -> AppResult<TextStream>;
}

/// 文档存储能力
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 存储一个文件，每次调用都会创建新的远端对象
    async fn store(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> AppResult<AttachmentRef>;
}
