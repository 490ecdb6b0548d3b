/// 辅导服务客户端
///
/// 封装客户端对服务端各接口的调用
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, ValidationError};
use crate::infrastructure::TextStream;
use crate::models::wire::{ErrorBody, UploadResponse};
use crate::models::{
    AttachmentRef, ChatRequest, EvidenceOptions, EvidenceRequest, ExplanationRequest,
    ExplanationResponse, PointsRequest, PointsResponse,
};

/// 服务端接口契约
///
/// 客户端状态机只依赖这个 trait，测试时可替换为内存实现
#[async_trait]
pub trait TutorApi: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> AppResult<AttachmentRef>;

    async fn generate_points(&self, request: &PointsRequest) -> AppResult<PointsResponse>;

    async fn generate_evidence(&self, request: &EvidenceRequest) -> AppResult<EvidenceOptions>;

    async fn evaluate_explanation(&self, request: &ExplanationRequest) -> AppResult<ExplanationResponse>;

    /// 流式聊天；丢弃返回的流即中断传输
    async fn chat(&self, request: &ChatRequest) -> AppResult<TextStream>;
}

/// 基于 HTTP 的实现
pub struct HttpTutorApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTutorApi {
    /// 创建新的客户端
    ///
    /// # 参数
    /// - `base_url`: 服务端地址，例如 `http://127.0.0.1:3000`
    pub fn new(base_url: impl Into<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::request_failed("http client", e))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> AppResult<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::request_failed(&url, e))?;
        let response = check_status(&url, response).await?;

        response.json().await.map_err(|e| AppError::decode_failed(&url, e))
    }
}

/// 非 2xx 响应转换为错误：4xx 视为输入错误，其余视为上游错误
async fn check_status(url: &str, response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    warn!("{} 返回 {}: {}", url, status, message);

    if status.is_client_error() {
        Err(ValidationError::Rejected(message).into())
    } else {
        Err(AppError::bad_status(url, status.as_u16(), message))
    }
}

#[async_trait]
impl TutorApi for HttpTutorApi {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> AppResult<AttachmentRef> {
        let url = self.url("/api/upload");

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| AppError::request_failed(&url, e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::request_failed(&url, e))?;
        let response = check_status(&url, response).await?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::decode_failed(&url, e))?;
        Ok(body.id)
    }

    async fn generate_points(&self, request: &PointsRequest) -> AppResult<PointsResponse> {
        self.post_json("/api/generate-points", request).await
    }

    async fn generate_evidence(&self, request: &EvidenceRequest) -> AppResult<EvidenceOptions> {
        self.post_json("/api/generate-evidence", request).await
    }

    async fn evaluate_explanation(&self, request: &ExplanationRequest) -> AppResult<ExplanationResponse> {
        self.post_json("/api/generate-explanation", request).await
    }

    async fn chat(&self, request: &ChatRequest) -> AppResult<TextStream> {
        let url = self.url("/api/chat");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::request_failed(&url, e))?;
        let response = check_status(&url, response).await?;

        Ok(utf8_text_stream(response.bytes_stream()))
    }
}

/// 把字节流按 UTF-8 边界切成文本片段
///
/// 被拆开的多字节字符留到下一块再输出
pub fn utf8_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    futures::stream::unfold((Box::pin(bytes), Vec::<u8>::new()), |(mut bytes, mut carry)| async move {
        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    carry.extend_from_slice(chunk.as_ref());
                    let valid = match std::str::from_utf8(&carry) {
                        Ok(text) => text.len(),
                        // 真正的非法字节：整体按有损方式输出，避免无限累积
                        Err(e) if e.error_len().is_some() => carry.len(),
                        Err(e) => e.valid_up_to(),
                    };
                    if valid == 0 {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&carry[..valid]).into_owned();
                    carry.drain(..valid);
                    return Some((Ok(text), (bytes, carry)));
                }
                Some(Err(e)) => {
                    return Some((Err(AppError::request_failed("chat stream", e)), (bytes, carry)));
                }
                None => {
                    if carry.is_empty() {
                        return None;
                    }
                    let text = String::from_utf8_lossy(&carry).into_owned();
                    carry.clear();
                    return Some((Ok(text), (bytes, carry)));
                }
            }
        }
    })
    .boxed()
}
