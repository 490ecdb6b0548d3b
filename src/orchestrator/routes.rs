//! HTTP 接口 - 编排层
//!
//! 只做请求解析、调用服务和错误映射，不含业务判断

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, UpstreamError, ValidationError};
use crate::infrastructure::{DocumentStore, Generator};
use crate::models::wire::{ErrorBody, UploadResponse};
use crate::models::{
    ChatRequest, EvidenceOptions, EvidenceRequest, ExplanationRequest, ExplanationResponse,
    PointsRequest, PointsResponse, VisionRequest,
};
use crate::services::{ChatService, DocumentIngestor, PeelService, VisionService};

/// 上游失败时返回给调用方的文字；具体原因只写日志
pub const UPSTREAM_FAILED_MESSAGE: &str = "upstream service failed";
/// 上游超时时返回给调用方的文字
pub const UPSTREAM_TIMEOUT_MESSAGE: &str = "upstream service timed out";
/// 配置错误时返回给调用方的文字
pub const SERVER_MISCONFIGURED_MESSAGE: &str = "server is misconfigured";

/// 各接口共享的服务
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<DocumentIngestor>,
    pub peel: Arc<PeelService>,
    pub chat: Arc<ChatService>,
    pub vision: Arc<VisionService>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// 用给定的生成器和文档存储组装服务
    pub fn new(generator: Arc<dyn Generator>, store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self {
            ingestor: Arc::new(DocumentIngestor::new(store, config)),
            peel: Arc::new(PeelService::new(generator.clone(), config)),
            chat: Arc::new(ChatService::new(generator, config)),
            vision: Arc::new(VisionService::new(config)),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Session(_) => StatusCode::CONFLICT,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("❌ {}", self);
        } else {
            warn!("⚠️ {}", self);
        }

        // 输入类错误带具体原因；上游和配置错误只给固定文字
        let message = match &self {
            AppError::Validation(e) => e.to_string(),
            AppError::Session(e) => e.to_string(),
            AppError::Upstream(UpstreamError::Timeout { .. }) => UPSTREAM_TIMEOUT_MESSAGE.to_string(),
            AppError::Upstream(_) => UPSTREAM_FAILED_MESSAGE.to_string(),
            AppError::Config(_) => SERVER_MISCONFIGURED_MESSAGE.to_string(),
        };
        let body = ErrorBody { error: message };
        (status, Json(body)).into_response()
    }
}

/// JSON 请求体
///
/// 解析失败时返回 400 `{error}`，而不是框架默认的纯文本响应
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ValidationError::Rejected(rejection.body_text()).into()),
        }
    }
}

/// 构建路由
///
/// 请求体上限按上传上限的两倍设置，给 base64 图片和 multipart 开销留余量；
/// 超出上传上限但未超出请求体上限的文件由 ingest 返回 400
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_mul(2);

    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/generate-points", post(generate_points))
        .route("/api/generate-evidence", post(generate_evidence))
        .route("/api/generate-explanation", post(generate_explanation))
        .route("/api/chat", post(chat))
        .route("/api/vision", post(vision))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|e| ValidationError::Rejected(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ValidationError::Rejected(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ValidationError::Rejected(e.body_text()))?;

        let id = state.ingestor.ingest(&file_name, bytes.to_vec(), &mime).await?;
        return Ok(Json(UploadResponse { id }));
    }

    Err(ValidationError::MissingFile.into())
}

async fn generate_points(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PointsRequest>,
) -> AppResult<Json<PointsResponse>> {
    let points = state
        .peel
        .generate_points(&request.question, &request.file_ids)
        .await?;
    Ok(Json(PointsResponse { points }))
}

async fn generate_evidence(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EvidenceRequest>,
) -> AppResult<Json<EvidenceOptions>> {
    let options = state
        .peel
        .generate_evidence(&request.point, &request.question, &request.file_ids)
        .await?;
    Ok(Json(options))
}

async fn generate_explanation(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ExplanationRequest>,
) -> AppResult<Json<ExplanationResponse>> {
    let response = state
        .peel
        .evaluate_explanation(
            &request.explanation,
            &request.point,
            &request.evidence,
            &request.file_ids,
        )
        .await?;
    Ok(Json(response))
}

/// 以 text/plain 分块返回；客户端断开时流被丢弃，上游请求随之取消
async fn chat(State(state): State<AppState>, ApiJson(request): ApiJson<ChatRequest>) -> AppResult<Response> {
    let stream = state
        .chat
        .chat(&request.content, request.mode.as_deref(), &request.file_ids)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn vision(State(state): State<AppState>, ApiJson(request): ApiJson<VisionRequest>) -> AppResult<String> {
    state
        .vision
        .analyze(&request.base64, &request.mime_type, request.user_text.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn error_body(e: AppError) -> (StatusCode, String) {
        let response = e.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body.error)
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let (status, message) = error_body(ValidationError::EmptyQuestion.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "essay question must not be empty");

        let (status, message) = error_body(AppError::timeout("generate-points", 60)).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(message, UPSTREAM_TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn test_upstream_detail_stays_out_of_body() {
        let (status, message) = error_body(AppError::bad_status(
            "https://api.openai.com/v1/responses",
            401,
            "Incorrect API key provided: sk-live-abcd1234",
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, UPSTREAM_FAILED_MESSAGE);
    }
}
