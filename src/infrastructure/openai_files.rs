//! Files API 客户端 - 基础设施层
//!
//! 只负责把文件字节上传到外部存储，换回一个不透明 ID

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::DocumentStore;
use crate::models::AttachmentRef;
use crate::utils::truncate_text;

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

/// Files API 存储
pub struct OpenAiFiles {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiFiles {
    pub fn new(config: &Config) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::request_failed("http client", e))?;

        Ok(Self {
            http,
            api_base: config.openai_api_base.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
        })
    }
}

#[async_trait]
impl DocumentStore for OpenAiFiles {
    async fn store(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> AppResult<AttachmentRef> {
        let endpoint = format!("{}/files", self.api_base);
        debug!("上传文件 {}（{} 字节）", file_name, bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| AppError::request_failed(&endpoint, e))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "user_data")
            .part("file", part);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("文件上传失败: {}", e);
                AppError::request_failed(&endpoint, e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("文件上传返回 {}: {}", status, truncate_text(&body, 300));
            return Err(AppError::bad_status(endpoint, status, truncate_text(&body, 300)));
        }

        let file: FileObject = response
            .json()
            .await
            .map_err(|e| AppError::decode_failed(&endpoint, e))?;

        debug!("文件上传成功: {}", file.id);
        Ok(AttachmentRef::new(file.id))
    }
}
