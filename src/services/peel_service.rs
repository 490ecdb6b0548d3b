//! PEEL 生成服务 - 业务能力层
//!
//! 论点、论据、解释反馈三种生成能力，以及对模型输出的解析。
//! 模型没有给出可用内容时返回占位结果，保证客户端总有下一步可走

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::infrastructure::{GenerationRequest, Generator};
use crate::models::prompts::{evidence_instructions, EXPLANATION_INSTRUCTIONS, POINTS_INSTRUCTIONS};
use crate::models::{AttachmentRef, EvidenceOptions, ExplanationResponse, NextStep};
use crate::utils::{truncate_text, with_deadline};

/// 最多返回的论点数
pub const MAX_POINTS: usize = 3;

pub const POINT_PLACEHOLDER: &str =
    "**Your own point**: I couldn't find points in the notes, so try writing one in your own words.";
pub const WEAK_PLACEHOLDER: &str = "No general evidence was found in the notes for this point.";
pub const STRONG_PLACEHOLDER: &str =
    "No detailed evidence was found in the notes for this point. Try another point or add facts you know.";
pub const FEEDBACK_PLACEHOLDER: &str =
    "⚠️ I couldn't give feedback this time. Try writing a bit more, or rephrase your explanation.";

const WEAK_MARKER: &str = "🔸";
const STRONG_MARKER: &str = "🔹";

/// 判定解释合格的关键短语（小写）
const PASS_PHRASES: [&str; 2] = ["great job", "strong explanation"];

/// PEEL 生成服务
///
/// 职责：
/// - 选择阶段模板、拼装输入并调用生成器
/// - 解析输出为结构化结果
/// - 不持有会话状态，不关心阶段顺序
pub struct PeelService {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl PeelService {
    pub fn new(generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            generator,
            timeout: config.request_timeout(),
        }
    }

    /// 根据作文题目生成 2-3 个论点
    ///
    /// 题目为空时直接返回校验错误，不调用上游
    pub async fn generate_points(
        &self,
        question: &str,
        attachments: &[AttachmentRef],
    ) -> AppResult<Vec<String>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }

        info!("✍️ 生成论点: {}", truncate_text(question, 80));

        let request = GenerationRequest::new(POINTS_INSTRUCTIONS, question).with_attachments(attachments);
        let raw = with_deadline("generate-points", self.timeout, self.generator.generate(request)).await?;

        let points = parse_points(&raw);
        info!("✓ 得到 {} 个论点", points.len());
        Ok(points)
    }

    /// 为选定论点生成一弱一强两条论据
    pub async fn generate_evidence(
        &self,
        point: &str,
        question: &str,
        attachments: &[AttachmentRef],
    ) -> AppResult<EvidenceOptions> {
        let (point, question) = (point.trim(), question.trim());
        if point.is_empty() {
            return Err(ValidationError::EmptyPoint.into());
        }
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }

        info!("🔎 生成论据: {}", truncate_text(point, 80));

        let input = format!("Essay question: {}\nSelected PEEL point: {}", question, point);
        let request = GenerationRequest::new(evidence_instructions(question, point), input)
            .with_attachments(attachments);
        let raw = with_deadline("generate-evidence", self.timeout, self.generator.generate(request)).await?;

        let options = parse_evidence(&raw);
        debug!(
            "论据解析结果: weak={} / strong={}",
            truncate_text(&options.weak, 60),
            truncate_text(&options.strong, 60)
        );
        Ok(options)
    }

    /// 点评学生的解释并决定下一步
    pub async fn evaluate_explanation(
        &self,
        explanation: &str,
        point: &str,
        evidence: &str,
        attachments: &[AttachmentRef],
    ) -> AppResult<ExplanationResponse> {
        let explanation = explanation.trim();
        if explanation.is_empty() {
            return Err(ValidationError::EmptyExplanation.into());
        }
        if point.trim().is_empty() {
            return Err(ValidationError::EmptyPoint.into());
        }
        if evidence.trim().is_empty() {
            return Err(ValidationError::EmptyEvidence.into());
        }

        info!("🧐 点评解释: {}", truncate_text(explanation, 80));

        let input = format!(
            "Here is my PEEL paragraph so far:\n\n**Point**: {}\n**Evidence**: {}\n**Explanation**: {}\n\n\
             Please evaluate the explanation. Is it strong and logical? How can I improve it?",
            point.trim(),
            evidence.trim(),
            explanation
        );
        let request = GenerationRequest::new(EXPLANATION_INSTRUCTIONS, input).with_attachments(attachments);
        let raw = with_deadline("generate-explanation", self.timeout, self.generator.generate(request)).await?;

        let feedback = raw.trim();
        if feedback.is_empty() {
            warn!("⚠️ 点评输出为空，返回占位反馈");
            return Ok(ExplanationResponse {
                feedback: FEEDBACK_PLACEHOLDER.to_string(),
                next_step: NextStep::Explanation,
            });
        }

        let next_step = classify_feedback(feedback);
        info!("✓ 点评完成，下一步: {:?}", next_step);
        Ok(ExplanationResponse {
            feedback: feedback.to_string(),
            next_step,
        })
    }
}

/// 根据反馈文字决定下一步
///
/// 不区分大小写地查找固定短语；措辞变化会导致误判为需要重写
pub fn classify_feedback(feedback: &str) -> NextStep {
    let lower = feedback.to_lowercase();
    if PASS_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        NextStep::Link
    } else {
        NextStep::Explanation
    }
}

fn bullet_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "- " / "• " / "* " / "1." / "2)" / "1️⃣"
    RE.get_or_init(|| {
        Regex::new(r"^(?:[-•]|\*\s|\d+[.)]|\d\x{FE0F}?\x{20E3})\s*").expect("valid bullet regex")
    })
}

/// 从模型输出中提取论点
///
/// 只保留以加粗短语开头的行；没有时退回前几行非空文本；全空时给出占位论点
pub fn parse_points(raw: &str) -> Vec<String> {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| bullet_prefix().replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    let bolded: Vec<String> = lines
        .iter()
        .filter(|line| line.starts_with("**"))
        .take(MAX_POINTS)
        .cloned()
        .collect();
    if !bolded.is_empty() {
        return bolded;
    }

    if !lines.is_empty() {
        warn!("⚠️ 论点输出没有加粗短语，按行截取");
        return lines.into_iter().take(MAX_POINTS).collect();
    }

    warn!("⚠️ 论点输出为空，返回占位论点");
    vec![POINT_PLACEHOLDER.to_string()]
}

/// 截取标记之后第一个冒号以后的文本
fn after_label(section: &str) -> &str {
    let body = match section.find(':') {
        Some(colon) => &section[colon + 1..],
        None => section,
    };
    body.trim_start_matches(|c: char| c == '*' || c.is_whitespace()).trim_end()
}

/// 从模型输出中拆出弱/强论据
///
/// `🔸` 到 `🔹` 之间为弱论据，`🔹` 之后为强论据
pub fn parse_evidence(raw: &str) -> EvidenceOptions {
    let raw = raw.trim();

    if let (Some(weak_start), Some(strong_start)) = (raw.find(WEAK_MARKER), raw.find(STRONG_MARKER)) {
        if weak_start < strong_start {
            let weak = after_label(&raw[weak_start + WEAK_MARKER.len()..strong_start]);
            let strong = after_label(&raw[strong_start + STRONG_MARKER.len()..]);
            return EvidenceOptions {
                weak: non_empty_or(weak, WEAK_PLACEHOLDER),
                strong: non_empty_or(strong, STRONG_PLACEHOLDER),
            };
        }
    }

    if raw.is_empty() {
        warn!("⚠️ 论据输出为空，返回占位论据");
    } else {
        warn!("⚠️ 论据输出缺少标记，整段作为强论据");
    }
    EvidenceOptions {
        weak: WEAK_PLACEHOLDER.to_string(),
        strong: non_empty_or(raw, STRONG_PLACEHOLDER),
    }
}

fn non_empty_or(text: &str, placeholder: &str) -> String {
    if text.trim().is_empty() {
        placeholder.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::infrastructure::TextStream;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 返回固定文本并记录调用的生成器
    struct ScriptedGenerator {
        reply: String,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            Ok(self.reply.clone())
        }

        async fn generate_stream(&self, _request: GenerationRequest) -> AppResult<TextStream> {
            unreachable!("PEEL 阶段不使用流式生成")
        }
    }

    fn create_test_service(generator: Arc<ScriptedGenerator>) -> PeelService {
        PeelService::new(generator, &Config::default())
    }

    #[tokio::test]
    async fn test_empty_question_never_calls_upstream() {
        let generator = ScriptedGenerator::new("**A**: b");
        let service = create_test_service(generator.clone());

        let blank = service.generate_points("", &[]).await;
        let spaces = service.generate_points("   \n", &[]).await;

        assert!(matches!(blank, Err(AppError::Validation(ValidationError::EmptyQuestion))));
        assert!(matches!(spaces, Err(AppError::Validation(ValidationError::EmptyQuestion))));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_points_pass_attachments_through() {
        let generator = ScriptedGenerator::new(
            "Here are some points:\n- **Competing Ideologies**: the USA and USSR wanted different worlds.\n\
             - **Post-war Fear**: both sides feared attack.",
        );
        let service = create_test_service(generator.clone());
        let refs = vec![AttachmentRef::new("file-abc")];

        let points = service.generate_points("Who started the Cold War?", &refs).await.unwrap();

        assert_eq!(points.len(), 2);
        assert!(points[0].starts_with("**Competing Ideologies**"));
        let request = generator.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.attachments, refs);
        assert_eq!(request.input, "Who started the Cold War?");
    }

    #[test]
    fn test_parse_points_strips_markers_and_caps() {
        let raw = "1. **One**: a\n2) **Two**: b\n* **Three**: c\n**Four**: d\n• not bold";
        assert_eq!(
            parse_points(raw),
            vec!["**One**: a", "**Two**: b", "**Three**: c"]
        );
        assert_eq!(parse_points("1️⃣ **Emoji**: numbered"), vec!["**Emoji**: numbered"]);
    }

    #[test]
    fn test_parse_points_placeholders() {
        assert_eq!(parse_points("plain idea one\n\nplain idea two"), vec!["plain idea one", "plain idea two"]);
        assert_eq!(parse_points("  \n "), vec![POINT_PLACEHOLDER.to_string()]);
    }

    #[test]
    fn test_parse_evidence_markers() {
        let raw = "🔸 **Weak Evidence (Option A):** The USSR took land in Eastern Europe.\n\n\
                   🔹 **Strong Evidence (Option B):** By 1948 Soviet-backed communists controlled Poland, \
                   Hungary and Czechoslovakia.";
        let options = parse_evidence(raw);
        assert_eq!(options.weak, "The USSR took land in Eastern Europe.");
        assert!(options.strong.starts_with("By 1948 Soviet-backed"));
    }

    #[test]
    fn test_parse_evidence_fallbacks() {
        let unmarked = parse_evidence("Just one paragraph of facts.");
        assert_eq!(unmarked.weak, WEAK_PLACEHOLDER);
        assert_eq!(unmarked.strong, "Just one paragraph of facts.");

        let empty = parse_evidence("");
        assert_eq!(empty.weak, WEAK_PLACEHOLDER);
        assert_eq!(empty.strong, STRONG_PLACEHOLDER);
    }

    #[test]
    fn test_classify_feedback_phrases() {
        assert_eq!(classify_feedback("**Great job!** Clear logic."), NextStep::Link);
        assert_eq!(classify_feedback("That is a STRONG EXPLANATION."), NextStep::Link);
        assert_eq!(classify_feedback("### 🔍 What Needs More Work"), NextStep::Explanation);
        // 措辞不同就会判为重写
        assert_eq!(classify_feedback("Excellent work!"), NextStep::Explanation);
    }

    #[tokio::test]
    async fn test_evaluate_explanation_branches() {
        let good = create_test_service(ScriptedGenerator::new("Great job! You showed the impact."));
        let weak = create_test_service(ScriptedGenerator::new("### 🔍 What Needs More Work\n- no link"));
        let empty = create_test_service(ScriptedGenerator::new("   "));

        let pass = good.evaluate_explanation("It scared the USA.", "p", "e", &[]).await.unwrap();
        let retry = weak.evaluate_explanation("It was bad.", "p", "e", &[]).await.unwrap();
        let placeholder = empty.evaluate_explanation("It was bad.", "p", "e", &[]).await.unwrap();

        assert_eq!(pass.next_step, NextStep::Link);
        assert_eq!(retry.next_step, NextStep::Explanation);
        assert_eq!(placeholder.feedback, FEEDBACK_PLACEHOLDER);
        assert_eq!(placeholder.next_step, NextStep::Explanation);
    }

    #[tokio::test]
    async fn test_evidence_requires_point() {
        let generator = ScriptedGenerator::new("🔸 A: x 🔹 B: y");
        let service = create_test_service(generator.clone());

        let result = service.generate_evidence(" ", "Who started the Cold War?", &[]).await;

        assert!(matches!(result, Err(AppError::Validation(ValidationError::EmptyPoint))));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
