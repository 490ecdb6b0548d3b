//! 会话快照
//!
//! 封装"学生写到了哪一步"这一信息。每次转换都返回新的快照，旧快照保持不变，
//! 因此失败的调用不会留下半截状态

use std::fmt::Display;

use serde::Serialize;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::{AttachmentRef, EvidenceChoice, EvidenceOptions, ExplanationResponse, NextStep, Stage};

/// 选了弱论据之后的一次性提醒
pub const WEAK_EVIDENCE_NUDGE: &str = "🤔 Option A is quite general. Option B names specific people, \
dates and events, which makes your paragraph much more convincing. Want to pick Option B instead? \
If you really prefer Option A, you can keep it.";

/// 对话记录中的说话人
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// 对话记录中的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub speaker: Speaker,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// 用户动作，每个动作只在特定阶段可用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Begin,
    Attach,
    GeneratePoints,
    SelectPoint,
    SelectEvidence,
    ConfirmWeakEvidence,
    SubmitExplanation,
    AnotherParagraph,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Begin => "begin",
            Action::Attach => "attach",
            Action::GeneratePoints => "generate points",
            Action::SelectPoint => "select point",
            Action::SelectEvidence => "select evidence",
            Action::ConfirmWeakEvidence => "keep weak evidence",
            Action::SubmitExplanation => "submit explanation",
            Action::AnotherParagraph => "write another paragraph",
        }
    }
}

/// 会话快照
///
/// 不变量：
/// - `selected_point` 总是 `points` 中的一项
/// - 进入 Explanation 之前一定已经选定论据
/// - 选了弱论据时，只有经过提醒并显式确认才会前进
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    stage: Stage,
    question: String,
    points: Vec<String>,
    selected_point: Option<String>,
    evidence: Option<EvidenceOptions>,
    selected_evidence: Option<EvidenceChoice>,
    weak_nudged: bool,
    explanation: String,
    attachments: Vec<AttachmentRef>,
    transcript: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn points(&self) -> &[String] {
        &self.points
    }

    pub fn selected_point(&self) -> Option<&str> {
        self.selected_point.as_deref()
    }

    pub fn evidence(&self) -> Option<&EvidenceOptions> {
        self.evidence.as_ref()
    }

    pub fn selected_evidence(&self) -> Option<EvidenceChoice> {
        self.selected_evidence
    }

    /// 当前选定论据的原文
    pub fn selected_evidence_text(&self) -> Option<&str> {
        let evidence = self.evidence.as_ref()?;
        match self.selected_evidence? {
            EvidenceChoice::Weak => Some(evidence.weak.as_str()),
            EvidenceChoice::Strong => Some(evidence.strong.as_str()),
        }
    }

    pub fn weak_nudged(&self) -> bool {
        self.weak_nudged
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn attachments(&self) -> &[AttachmentRef] {
        &self.attachments
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// 判断动作在当前阶段是否可用
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Begin => self.stage == Stage::Init,
            Action::Attach => self.stage != Stage::Init,
            Action::GeneratePoints => self.stage == Stage::Question,
            Action::SelectPoint => self.stage == Stage::Point,
            Action::SelectEvidence => self.stage == Stage::Evidence,
            Action::ConfirmWeakEvidence => {
                self.stage == Stage::Evidence
                    && self.weak_nudged
                    && self.selected_evidence == Some(EvidenceChoice::Weak)
            }
            Action::SubmitExplanation => self.stage == Stage::Explanation,
            Action::AnotherParagraph => self.stage == Stage::Done,
        }
    }

    /// 动作不可用时返回 InvalidTransition
    pub fn check(&self, action: Action) -> AppResult<()> {
        if self.allows(action) {
            Ok(())
        } else {
            Err(AppError::invalid_transition(self.stage, action.name()))
        }
    }

    fn moved_to(mut self, next: Stage) -> Self {
        debug_assert!(self.stage.can_move_to(next), "{} -> {}", self.stage, next);
        self.stage = next;
        self
    }

    /// Init → Question
    pub fn begin(&self) -> AppResult<Session> {
        self.check(Action::Begin)?;
        Ok(self.clone().moved_to(Stage::Question))
    }

    /// 记录一个已上传的附件，阶段不变
    pub fn with_attachment(&self, attachment: AttachmentRef) -> AppResult<Session> {
        self.check(Action::Attach)?;
        let mut next = self.clone();
        if !next.attachments.contains(&attachment) {
            next.attachments.push(attachment);
        }
        Ok(next)
    }

    /// Question → Point，记录题目和候选论点
    pub fn with_points(&self, question: &str, points: Vec<String>) -> AppResult<Session> {
        self.check(Action::GeneratePoints)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }
        // 至少要有一个非空论点
        let points: Vec<String> = points
            .into_iter()
            .map(|point| point.trim().to_string())
            .filter(|point| !point.is_empty())
            .collect();
        if points.is_empty() {
            return Err(ValidationError::NoPoints.into());
        }

        let mut next = self.clone();
        next.question = question.to_string();
        next.transcript.push(Message::user(format!("Essay question: {}", question)));
        next.transcript
            .extend(points.iter().map(|point| Message::assistant(point.clone())));
        next.points = points;
        next.selected_point = None;
        Ok(next.moved_to(Stage::Point))
    }

    /// Point → Evidence，论点必须是候选之一
    pub fn with_evidence(&self, point: &str, options: EvidenceOptions) -> AppResult<Session> {
        self.check(Action::SelectPoint)?;
        if !self.points.iter().any(|p| p == point) {
            return Err(ValidationError::PointNotOffered {
                point: point.to_string(),
            }
            .into());
        }

        let mut next = self.clone();
        next.transcript.push(Message::assistant(format!(
            "🔸 **{}:** {}",
            EvidenceChoice::Weak.label(),
            options.weak
        )));
        next.transcript.push(Message::assistant(format!(
            "🔹 **{}:** {}",
            EvidenceChoice::Strong.label(),
            options.strong
        )));
        next.selected_point = Some(point.to_string());
        next.evidence = Some(options);
        next.selected_evidence = None;
        next.weak_nudged = false;
        Ok(next.moved_to(Stage::Evidence))
    }

    /// 选择论据
    ///
    /// 强论据直接进入 Explanation；弱论据第一次会追加提醒并停留在 Evidence
    pub fn select_evidence(&self, choice: EvidenceChoice) -> AppResult<Session> {
        self.check(Action::SelectEvidence)?;
        let mut next = self.clone();
        next.selected_evidence = Some(choice);

        match choice {
            EvidenceChoice::Strong => Ok(next.moved_to(Stage::Explanation)),
            EvidenceChoice::Weak => {
                if !next.weak_nudged {
                    next.weak_nudged = true;
                    next.transcript.push(Message::assistant(WEAK_EVIDENCE_NUDGE));
                }
                Ok(next)
            }
        }
    }

    /// 提醒之后仍坚持弱论据
    pub fn confirm_weak_evidence(&self) -> AppResult<Session> {
        self.check(Action::ConfirmWeakEvidence)?;
        Ok(self.clone().moved_to(Stage::Explanation))
    }

    /// 记录解释的评价
    ///
    /// `Link` 表示完成；`Explanation` 表示停留并清空解释，等学生重写
    pub fn with_feedback(&self, explanation: &str, response: &ExplanationResponse) -> AppResult<Session> {
        self.check(Action::SubmitExplanation)?;
        let mut next = self.clone();
        next.transcript.push(Message::assistant(response.feedback.clone()));

        match response.next_step {
            NextStep::Link => {
                next.explanation = explanation.trim().to_string();
                Ok(next.moved_to(Stage::Done))
            }
            NextStep::Explanation => {
                next.explanation.clear();
                Ok(next.moved_to(Stage::Explanation))
            }
        }
    }

    /// Done → Point，保留题目和论点，清空本段的选择
    pub fn another_paragraph(&self) -> AppResult<Session> {
        self.check(Action::AnotherParagraph)?;
        let mut next = self.clone();
        next.selected_point = None;
        next.evidence = None;
        next.selected_evidence = None;
        next.weak_nudged = false;
        next.explanation.clear();
        Ok(next.moved_to(Stage::Point))
    }

    /// 任意阶段回到初始状态
    pub fn start_over(&self) -> Session {
        Session::default()
    }
}

impl Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[阶段#{} 论点#{} 附件#{} 消息#{}]",
            self.stage,
            self.points.len(),
            self.attachments.len(),
            self.transcript.len()
        )
    }
}
