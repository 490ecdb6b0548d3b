//! 自由聊天服务 - 业务能力层
//!
//! 按模式选择系统指令，流式返回回答。调用方丢弃流即取消，已收到的部分不保存

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ValidationError};
use crate::infrastructure::{GenerationRequest, Generator, TextStream};
use crate::models::{AttachmentRef, Mode};
use crate::utils::{truncate_text, with_deadline};

/// 自由聊天服务
pub struct ChatService {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl ChatService {
    pub fn new(generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            generator,
            timeout: config.request_timeout(),
        }
    }

    /// 覆盖超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 发起一次聊天
    ///
    /// 超时同时作用于建立连接和相邻两段文本之间的等待
    pub async fn chat(
        &self,
        content: &str,
        mode: Option<&str>,
        attachments: &[AttachmentRef],
    ) -> AppResult<TextStream> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let mode = Mode::parse(mode);
        info!("💬 [{}] {}", mode.name(), truncate_text(content.trim(), 80));

        let request = GenerationRequest::new(mode.instructions(), content.trim())
            .with_attachments(attachments)
            .with_mode(mode.name());

        let stream = with_deadline("chat", self.timeout, self.generator.generate_stream(request)).await?;
        Ok(with_idle_timeout(stream, self.timeout))
    }
}

/// 相邻两段文本之间最多等待 `idle`，超时后产出一个错误并结束
fn with_idle_timeout(stream: TextStream, idle: Duration) -> TextStream {
    futures::stream::unfold(Some(stream), move |state| async move {
        let mut stream = state?;
        match tokio::time::timeout(idle, stream.next()).await {
            Ok(Some(item)) => Some((item, Some(stream))),
            Ok(None) => None,
            Err(_) => {
                warn!("⏱️ 聊天流 {} 秒无新内容，已取消", idle.as_secs());
                Some((Err(AppError::timeout("chat stream", idle.as_secs())), None))
            }
        }
    })
    .boxed()
}
