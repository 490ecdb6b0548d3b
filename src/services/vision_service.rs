//! 图片分析服务 - 业务能力层
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 调用 Chat Completions（Vision）
//! - 兼容 OpenAI API 的服务均可

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, UpstreamError, ValidationError};
use crate::models::prompts::vision_prompt;
use crate::utils::with_deadline;

/// 模型没有给出内容时的回复
pub const VISION_PLACEHOLDER: &str = "Sorry, I couldn't analyze the image.";

/// 图片分析服务
///
/// 职责：
/// - 校验图片数据
/// - 把学生的问题和图片一起交给视觉模型
pub struct VisionService {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
}

impl VisionService {
    /// 创建新的图片分析服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_api_base);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.vision_model_name.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// 分析一张图片
    ///
    /// # 参数
    /// - `base64`: 图片内容（base64，不含 data: 前缀）
    /// - `mime_type`: 图片类型，必须是 `image/*`
    /// - `user_text`: 学生附带的问题（可选）
    pub async fn analyze(
        &self,
        base64: &str,
        mime_type: &str,
        user_text: Option<&str>,
    ) -> AppResult<String> {
        let data_url = build_data_url(base64, mime_type)?;
        let prompt = vision_prompt(user_text);

        info!("🖼️ 分析图片（{}，{} 字符）", mime_type, base64.len());
        with_deadline("vision", self.timeout, self.describe(&prompt, data_url)).await
    }

    async fn describe(&self, prompt: &str, data_url: String) -> AppResult<String> {
        let model_error = |e: async_openai::error::OpenAIError| {
            AppError::Upstream(UpstreamError::Completion {
                model: self.model_name.clone(),
                source: Box::new(e),
            })
        };

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: Some(ImageDetail::High),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(model_error)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .max_tokens(800u32)
            .build()
            .map_err(model_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("视觉模型调用失败: {}", e);
            model_error(e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        match content {
            Some(text) => {
                debug!("视觉模型返回 {} 字符", text.len());
                Ok(text)
            }
            None => {
                warn!("⚠️ 视觉模型返回内容为空，使用占位回复");
                Ok(VISION_PLACEHOLDER.to_string())
            }
        }
    }
}

/// 校验并拼出 data URL
fn build_data_url(base64: &str, mime_type: &str) -> Result<String, ValidationError> {
    let (base64, mime_type) = (base64.trim(), mime_type.trim());
    if base64.is_empty() || mime_type.is_empty() {
        return Err(ValidationError::MissingImage);
    }
    if !mime_type.to_ascii_lowercase().starts_with("image/") {
        return Err(ValidationError::UnsupportedType {
            mime: mime_type.to_string(),
        });
    }
    Ok(format!("data:{};base64,{}", mime_type, base64))
}
