//! Responses API 客户端 - 基础设施层
//!
//! 通过 `reqwest` 调用兼容 OpenAI 的 `/responses` 接口，
//! 挂载预置知识库的 file_search 工具，支持一次性和 SSE 流式两种返回

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, UpstreamError};
use crate::infrastructure::{GenerationRequest, Generator, TextStream};
use crate::utils::truncate_text;

/// Responses API 生成器
///
/// 职责：
/// - 拼装请求体（指令、附件、知识库工具）
/// - 解析一次性返回的 output_text
/// - 把 SSE 事件流转换成文本增量流
pub struct OpenAiResponses {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model_name: String,
    vector_store_id: String,
}

impl OpenAiResponses {
    /// 创建新的生成器
    pub fn new(config: &Config) -> AppResult<Self> {
        // 只限制连接时间，流式响应的总时长由上层超时控制
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::request_failed("http client", e))?;

        Ok(Self {
            http,
            api_base: config.openai_api_base.trim_end_matches('/').to_string(),
            api_key: config.openai_api_key.clone(),
            model_name: config.model_name.clone(),
            vector_store_id: config.vector_store_id.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.api_base)
    }

    /// 构建请求体
    ///
    /// 附件以 `input_file` 片段放在用户消息之前
    fn build_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut content: Vec<Value> = request
            .attachments
            .iter()
            .map(|id| json!({ "type": "input_file", "file_id": id.as_str() }))
            .collect();
        content.push(json!({ "type": "input_text", "text": request.input }));

        let mut body = json!({
            "model": self.model_name,
            "instructions": request.instructions,
            "input": [{ "role": "user", "content": content }],
            "truncation": "auto",
            "stream": stream,
        });

        if !self.vector_store_id.is_empty() {
            body["tools"] = json!([{
                "type": "file_search",
                "vector_store_ids": [self.vector_store_id],
            }]);
            body["tool_choice"] = json!("auto");
        }

        if let Some(mode) = &request.mode {
            body["metadata"] = json!({ "mode": mode });
        }

        body
    }

    async fn send(&self, body: &Value) -> AppResult<reqwest::Response> {
        let endpoint = self.endpoint();

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("Responses API 调用失败: {}", e);
                AppError::request_failed(&endpoint, e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            warn!("Responses API 返回 {}: {}", status, truncate_text(&text, 300));
            return Err(AppError::bad_status(endpoint, status, truncate_text(&text, 300)));
        }

        Ok(response)
    }
}

#[async_trait]
impl Generator for OpenAiResponses {
    async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
        debug!(
            "调用 Responses API，模型: {}，附件: {} 个",
            self.model_name,
            request.attachments.len()
        );

        let body = self.build_body(&request, false);
        let response = self.send(&body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| AppError::decode_failed(self.endpoint(), e))?;

        let text = extract_output_text(&value);
        debug!("Responses API 调用成功，输出长度: {} 字符", text.len());
        Ok(text)
    }

    async fn generate_stream(&self, request: GenerationRequest) -> AppResult<TextStream> {
        debug!("调用 Responses API（流式），模型: {}", self.model_name);

        let body = self.build_body(&request, true);
        let response = self.send(&body).await?;
        Ok(sse_text_stream(response.bytes_stream()))
    }
}

/// 从非流式响应中收集输出文本
///
/// 优先使用顶层 `output_text`，否则拼接 `output[].content[]` 中的 `output_text` 片段
pub fn extract_output_text(value: &Value) -> String {
    if let Some(text) = value.get("output_text").and_then(Value::as_str) {
        return text.trim().to_string();
    }

    let mut text = String::new();
    for item in value
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if item.get("type").and_then(Value::as_str) != Some("message") {
            continue;
        }
        for part in item
            .get("content")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if part.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(piece) = part.get("text").and_then(Value::as_str) {
                    text.push_str(piece);
                }
            }
        }
    }

    text.trim().to_string()
}

/// 单个 SSE 事件
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Completed,
    Failed(String),
    Other,
}

fn parse_sse_block(block: &str) -> Option<SseEvent> {
    let data = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");

    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Completed);
    }

    let value: Value = match serde_json::from_str(&data) {
        Ok(value) => value,
        Err(e) => {
            debug!("忽略无法解析的 SSE 数据: {}", e);
            return None;
        }
    };

    let event = match value.get("type").and_then(Value::as_str)? {
        "response.output_text.delta" => SseEvent::Delta(
            value
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "response.completed" | "response.done" | "done" => SseEvent::Completed,
        "response.failed" | "error" => {
            let message = value
                .pointer("/response/error/message")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            SseEvent::Failed(message)
        }
        _ => SseEvent::Other,
    };
    Some(event)
}

/// 取出缓冲区中第一个完整的事件块（以空行结尾）
fn take_block(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.windows(2).position(|w| w == b"\n\n")?;
    let block: Vec<u8> = buffer.drain(..pos + 2).collect();
    Some(String::from_utf8_lossy(&block).into_owned())
}

/// 把 SSE 字节流转换成文本增量流
///
/// 按字节缓冲，事件块完整后才解码，避免多字节字符被拆开
pub fn sse_text_stream<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = (Box::pin(bytes), Vec::<u8>::new(), false);

    futures::stream::unfold(state, |(mut bytes, mut buffer, finished)| async move {
        if finished {
            return None;
        }

        loop {
            if let Some(block) = take_block(&mut buffer) {
                match parse_sse_block(&block) {
                    Some(SseEvent::Delta(text)) if !text.is_empty() => {
                        return Some((Ok(text), (bytes, buffer, false)));
                    }
                    Some(SseEvent::Completed) => return None,
                    Some(SseEvent::Failed(message)) => {
                        warn!("生成流中途失败: {}", message);
                        let err = AppError::Upstream(UpstreamError::StreamFailed { message });
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                    _ => continue,
                }
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r')),
                Some(Err(e)) => {
                    warn!("生成流传输中断: {}", e);
                    let err = AppError::request_failed("responses stream", e);
                    return Some((Err(err), (bytes, buffer, true)));
                }
                None => {
                    // 最后一个事件块可能没有结尾空行
                    let tail = String::from_utf8_lossy(&buffer).into_owned();
                    buffer.clear();
                    return match parse_sse_block(&tail) {
                        Some(SseEvent::Delta(text)) if !text.is_empty() => {
                            Some((Ok(text), (bytes, buffer, true)))
                        }
                        Some(SseEvent::Failed(message)) => Some((
                            Err(AppError::Upstream(UpstreamError::StreamFailed { message })),
                            (bytes, buffer, true),
                        )),
                        _ => None,
                    };
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentRef;

    fn create_test_client(vector_store_id: &str) -> OpenAiResponses {
        let config = Config {
            openai_api_key: "sk-test".to_string(),
            vector_store_id: vector_store_id.to_string(),
            ..Config::default()
        };
        OpenAiResponses::new(&config).unwrap()
    }

    #[test]
    fn test_body_puts_attachments_before_text() {
        let client = create_test_client("vs_notes");
        let request = GenerationRequest::new("be kind", "Who started the Cold War?")
            .with_attachments(&[AttachmentRef::new("file-1")])
            .with_mode("essay");

        let body = client.build_body(&request, true);
        let content = body["input"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "input_file");
        assert_eq!(content[0]["file_id"], "file-1");
        assert_eq!(content[1]["text"], "Who started the Cold War?");
        assert_eq!(body["tools"][0]["vector_store_ids"][0], "vs_notes");
        assert_eq!(body["metadata"]["mode"], "essay");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_body_without_vector_store_has_no_tools() {
        let client = create_test_client("");
        let body = client.build_body(&GenerationRequest::new("i", "q"), false);
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_extract_output_text_from_items() {
        let value = json!({
            "output": [
                { "type": "file_search_call", "id": "fs_1" },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "**Ideology**: " },
                    { "type": "output_text", "text": "rival systems\n" }
                ]}
            ]
        });
        assert_eq!(extract_output_text(&value), "**Ideology**: rival systems");
        assert_eq!(extract_output_text(&json!({})), "");
    }

    #[tokio::test]
    async fn test_sse_stream_handles_split_chunks() {
        let raw = "event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"冷战\"}\n\n\
                   data: {\"type\":\"response.output_text.delta\",\"delta\":\" began\"}\r\n\r\n\
                   data: {\"type\":\"response.completed\"}\n\n\
                   data: {\"type\":\"response.output_text.delta\",\"delta\":\"ignored\"}\n\n";
        // 切成 5 字节一块，会把中文字符拆开
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            raw.as_bytes().chunks(5).map(|c| Ok(c.to_vec())).collect();

        let pieces: Vec<String> = sse_text_stream(futures::stream::iter(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(pieces, vec!["冷战".to_string(), " began".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_stream_reports_failure() {
        let raw = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"partial\"}\n\n\
                   data: {\"type\":\"response.failed\",\"response\":{\"error\":{\"message\":\"quota\"}}}\n\n";
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(raw.as_bytes().to_vec())];

        let results: Vec<AppResult<String>> =
            sse_text_stream(futures::stream::iter(chunks)).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "partial");
        assert!(matches!(
            &results[1],
            Err(AppError::Upstream(UpstreamError::StreamFailed { message })) if message == "quota"
        ));
    }

    #[test]
    fn test_parse_sse_block_variants() {
        assert_eq!(parse_sse_block(": keep-alive\n\n"), None);
        assert_eq!(parse_sse_block("data: [DONE]\n\n"), Some(SseEvent::Completed));
        assert_eq!(
            parse_sse_block("data: {\"type\":\"response.created\"}\n\n"),
            Some(SseEvent::Other)
        );
    }

    /// 需要真实密钥：`OPENAI_API_KEY=... cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_generation() {
        crate::utils::logging::init(true);
        let client = OpenAiResponses::new(&Config::from_env()).unwrap();
        let text = client
            .generate(GenerationRequest::new("Answer in one sentence.", "What was the Berlin Airlift?"))
            .await
            .unwrap();
        assert!(!text.is_empty());
    }
}
