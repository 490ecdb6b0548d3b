//! 写作辅导流程 - 流程层
//!
//! 核心职责：驱动一个会话走完 PEEL 段落的各个阶段
//!
//! 流程顺序：
//! 1. begin → 输入题目 → generate_points
//! 2. 选论点 → generate_evidence
//! 3. 选论据（弱论据需确认）
//! 4. 提交解释 → evaluate_explanation → 重写或完成

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clients::TutorApi;
use crate::config::Config;
use crate::error::{AppResult, SessionError, ValidationError};
use crate::infrastructure::TextStream;
use crate::models::{ChatRequest, EvidenceChoice, EvidenceRequest, ExplanationRequest, PointsRequest};
use crate::services::check_upload;
use crate::utils::with_deadline;
use crate::workflow::session::{Action, Session};

/// 请求进行中的标记，离开作用域时自动清除
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 写作辅导流程
///
/// - 持有当前会话快照
/// - 同一时间最多一个请求在途，期间其他动作返回 Busy
/// - 输入校验先于网络调用
/// - 调用失败或超时时快照保持不变
pub struct TutorFlow<A: TutorApi> {
    api: A,
    session: Mutex<Session>,
    busy: AtomicBool,
    timeout: Duration,
    max_upload_bytes: usize,
}

impl<A: TutorApi> TutorFlow<A> {
    /// 创建新的流程
    pub fn new(api: A, config: &Config) -> Self {
        Self {
            api,
            session: Mutex::new(Session::new()),
            busy: AtomicBool::new(false),
            timeout: config.request_timeout(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// 覆盖单次请求的超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// 当前快照
    pub fn snapshot(&self) -> Session {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn commit(&self, next: Session) -> Session {
        debug!("会话更新 {}", next);
        *self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next.clone();
        next
    }

    /// 不涉及网络的转换
    fn local(&self, transition: impl FnOnce(&Session) -> AppResult<Session>) -> AppResult<Session> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let next = transition(&self.snapshot())?;
        Ok(self.commit(next))
    }

    pub fn begin(&self) -> AppResult<Session> {
        self.local(Session::begin)
    }

    /// 上传一份文档并记入会话
    pub async fn attach(&self, file_name: &str, bytes: Vec<u8>, mime: &str) -> AppResult<Session> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let current = self.snapshot();
        current.check(Action::Attach)?;
        check_upload(bytes.len(), mime, self.max_upload_bytes)?;

        info!("📎 上传 {}（{} 字节）", file_name, bytes.len());
        let id = with_deadline("upload", self.timeout, self.api.upload(file_name, bytes, mime)).await?;

        let next = current.with_attachment(id)?;
        Ok(self.commit(next))
    }

    /// 提交题目，生成候选论点
    pub async fn generate_points(&self, question: &str) -> AppResult<Session> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let current = self.snapshot();
        current.check(Action::GeneratePoints)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }

        let request = PointsRequest {
            question: question.to_string(),
            file_ids: current.attachments().to_vec(),
        };
        let response = with_deadline("generate points", self.timeout, self.api.generate_points(&request))
            .await
            .map_err(|e| {
                warn!("生成论点失败: {}", e);
                e
            })?;

        let next = current.with_points(question, response.points)?;
        Ok(self.commit(next))
    }

    /// 按序号选择论点（从 0 开始）
    pub async fn select_point(&self, index: usize) -> AppResult<Session> {
        let point = self
            .snapshot()
            .points()
            .get(index)
            .cloned()
            .ok_or_else(|| ValidationError::PointNotOffered {
                point: format!("#{}", index + 1),
            })?;
        self.choose_point(&point).await
    }

    /// 选择论点，生成一强一弱两条论据
    pub async fn choose_point(&self, point: &str) -> AppResult<Session> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let current = self.snapshot();
        current.check(Action::SelectPoint)?;
        if point.trim().is_empty() {
            return Err(ValidationError::EmptyPoint.into());
        }
        if !current.points().iter().any(|p| p == point) {
            return Err(ValidationError::PointNotOffered {
                point: point.to_string(),
            }
            .into());
        }

        let request = EvidenceRequest {
            point: point.to_string(),
            question: current.question().to_string(),
            file_ids: current.attachments().to_vec(),
        };
        let options =
            with_deadline("generate evidence", self.timeout, self.api.generate_evidence(&request)).await?;

        let next = current.with_evidence(point, options)?;
        Ok(self.commit(next))
    }

    pub fn select_evidence(&self, choice: EvidenceChoice) -> AppResult<Session> {
        self.local(|session| session.select_evidence(choice))
    }

    pub fn confirm_weak_evidence(&self) -> AppResult<Session> {
        self.local(Session::confirm_weak_evidence)
    }

    /// 提交解释并取得评价
    pub async fn submit_explanation(&self, explanation: &str) -> AppResult<Session> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let current = self.snapshot();
        current.check(Action::SubmitExplanation)?;
        if explanation.trim().is_empty() {
            return Err(ValidationError::EmptyExplanation.into());
        }
        let (point, evidence) = match (current.selected_point(), current.selected_evidence_text()) {
            (Some(point), Some(evidence)) => (point.to_string(), evidence.to_string()),
            (None, _) => return Err(ValidationError::EmptyPoint.into()),
            (_, None) => return Err(ValidationError::EmptyEvidence.into()),
        };

        let request = ExplanationRequest {
            explanation: explanation.trim().to_string(),
            point,
            evidence,
            file_ids: current.attachments().to_vec(),
        };
        let response = with_deadline(
            "generate explanation",
            self.timeout,
            self.api.evaluate_explanation(&request),
        )
        .await?;

        let next = current.with_feedback(explanation, &response)?;
        Ok(self.commit(next))
    }

    pub fn another_paragraph(&self) -> AppResult<Session> {
        self.local(Session::another_paragraph)
    }

    pub fn start_over(&self) -> AppResult<Session> {
        self.local(|session| Ok(session.start_over()))
    }

    /// 自由聊天，不改变阶段
    ///
    /// 只对建立连接计时；返回的流被丢弃时传输随之中断
    pub async fn chat(&self, content: &str, mode: Option<&str>) -> AppResult<TextStream> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let request = ChatRequest {
            content: content.trim().to_string(),
            mode: mode.map(str::to_string),
            file_ids: self.snapshot().attachments().to_vec(),
        };
        with_deadline("chat", self.timeout, self.api.chat(&request)).await
    }
}
