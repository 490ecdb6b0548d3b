//! 客户端与服务端之间的 JSON 协议

use serde::{Deserialize, Serialize};

use crate::models::stage::NextStep;

/// 上传文档后得到的不透明引用
///
/// 由会话持有，原样传给后续每一次生成调用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentRef(pub String);

impl AttachmentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 上传成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: AttachmentRef,
}

/// 生成论点请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointsRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub file_ids: Vec<AttachmentRef>,
}

/// 生成论点响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsResponse {
    pub points: Vec<String>,
}

/// 生成论据请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceRequest {
    #[serde(default)]
    pub point: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub file_ids: Vec<AttachmentRef>,
}

/// 一强一弱两条论据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceOptions {
    pub weak: String,
    pub strong: String,
}

/// 解释反馈请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplanationRequest {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub point: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub file_ids: Vec<AttachmentRef>,
}

/// 解释反馈响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationResponse {
    pub feedback: String,
    #[serde(rename = "nextStep")]
    pub next_step: NextStep,
}

/// 自由聊天请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<AttachmentRef>,
}

/// 图片分析请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionRequest {
    #[serde(default)]
    pub base64: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub user_text: Option<String>,
}

/// 错误响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ids_default_to_empty() {
        let req: PointsRequest =
            serde_json::from_str(r#"{"question":"Who started the Cold War?"}"#).unwrap();
        assert!(req.file_ids.is_empty());
    }

    #[test]
    fn test_explanation_response_uses_camel_case_next_step() {
        let body = serde_json::to_value(ExplanationResponse {
            feedback: "Great job!".to_string(),
            next_step: NextStep::Link,
        })
        .unwrap();
        assert_eq!(body["nextStep"], "link");
    }

    #[test]
    fn test_vision_request_field_names() {
        let req: VisionRequest =
            serde_json::from_str(r#"{"base64":"AAAA","mimeType":"image/png","userText":"hi"}"#)
                .unwrap();
        assert_eq!(req.mime_type, "image/png");
        assert_eq!(req.user_text.as_deref(), Some("hi"));
    }
}
