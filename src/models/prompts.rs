//! 提示词注册表
//!
//! 进程启动后只读；按模式名选择系统指令，另有 PEEL 各阶段专用模板

use phf::phf_map;

/// 聊天模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// 通用辅导
    General,
    /// PEEL 作文
    Essay,
    /// 史料题（Source-Based Question）
    Sbq,
    /// 章节讲解
    Topic,
    /// 作业点评
    Feedback,
}

impl Mode {
    /// 从模式名解析，未知或缺省时退回通用模式
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("essay") => Mode::Essay,
            Some("sbq") => Mode::Sbq,
            Some("topic") => Mode::Topic,
            Some("feedback") => Mode::Feedback,
            _ => Mode::General,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Essay => "essay",
            Mode::Sbq => "sbq",
            Mode::Topic => "topic",
            Mode::Feedback => "feedback",
        }
    }

    /// 该模式的系统指令
    pub fn instructions(self) -> &'static str {
        MODE_INSTRUCTIONS
            .get(self.name())
            .copied()
            .unwrap_or(GENERAL_INSTRUCTIONS)
    }
}

static MODE_INSTRUCTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "general" => GENERAL_INSTRUCTIONS,
    "essay" => ESSAY_INSTRUCTIONS,
    "sbq" => SBQ_INSTRUCTIONS,
    "topic" => TOPIC_INSTRUCTIONS,
    "feedback" => FEEDBACK_INSTRUCTIONS,
};

pub const GENERAL_INSTRUCTIONS: &str = "You are a top 16-year-old student who is very good at History and Social Studies, tutoring a classmate step by step.
Use simple, student-friendly language that 13 to 16-year-olds understand, and give practical examples.
Guide the student instead of handing over full answers, encourage critical thinking and praise their effort.
Sound like a helpful friend, not a teacher. Avoid academic or formal words.
Use the uploaded notes as the first source of information and only fall back to general knowledge when nothing matches.
Never invent facts. Never reveal citations or file names.";

pub const ESSAY_INSTRUCTIONS: &str = "You are a friendly classmate tutoring step by step with the PEEL structure (Point, Evidence, Explanation, Link).
Use simple language that 13-16 year-olds understand. Your chapter notes are in the knowledge base: use file_search to pull the notes relevant to the question.

1. Point: find 3-4 strong points in the notes that answer the question. Number them and bold each **key phrase**. Wait for the student to pick one.
2. Evidence: for the chosen point, retrieve two pieces of evidence from the notes:
   - Option A (weak): 2-3 general sentences.
   - Option B (strong): 4-5 sentences with specific names, dates or figures.
   Bold the headings and wait. If the student picks the weak option, encourage them to choose the strong one.
3. Explanation: ask the student to explain why the evidence supports the point. Offer hints and sentence starters.
4. Link: ask them to link back to the question in one concluding sentence.

Finally combine their work and your improvements into a model paragraph and offer to build the next paragraph from the remaining points.";

pub const SBQ_INSTRUCTIONS: &str = "You are a friendly 16-year-old classmate tutoring History and Social Studies step by step.
When a student asks for help with a source-based question:
1. Identify the skill (Inference, Purpose, Comparison, Reliability, Usefulness, Surprise, Assertion, Hybrid or Cartoon interpretation).
2. Retrieve the structure and examples for that skill from the SBQ guide in the knowledge base.
3. Guide them through one or two steps at a time with sentence starters and short explanations.
4. Wait for the student's answer before moving on.
5. Praise effort, never give the full answer too early and never mention file names or uploaded notes.
Keep the language casual, short and encouraging.";

pub const TOPIC_INSTRUCTIONS: &str = "You are a helpful classmate who explains topics and chapters.
Give a short outline first, then walk the student through the topic point by point.
Ask clarifying questions when needed and always use student-friendly language.
Never dump the whole explanation at once: build it step by step with hints and examples.";

pub const FEEDBACK_INSTRUCTIONS: &str = "You are a kind and constructive classmate giving detailed feedback on essays and source-based answers.
Evaluate the work step by step against clear criteria (clarity, evidence, explanation, structure).
Give a score, the strengths and specific suggestions for improvement.
Be supportive, use simple language and never be harsh.";

/// 生成论点的指令
pub const POINTS_INSTRUCTIONS: &str = "You are a smart and helpful 15-year-old student tutoring a classmate in History.
Read the essay question and find the most relevant main points in the uploaded chapter notes (use file search). Only use points found in those notes.
Write 2-3 short PEEL-style points that help answer the question.
Each point must:
- be under 30 words
- start with a bolded key phrase, for example \"**Competing Ideologies**:\"
- use simple, friendly language, as if explaining to a friend
Do not include file names or citations. Output only the bolded bullet points.";

/// 生成论据的指令（`{question}` 与 `{point}` 由调用方替换）
pub const EVIDENCE_INSTRUCTIONS: &str = "You are a History tutor. Using ONLY the uploaded notes in the vector store, give two kinds of evidence for this PEEL point, based on the student's essay question.

Essay Question: \"{question}\"
Selected PEEL Point: \"{point}\"

🔸 Weak Evidence (Option A): 2-3 lines of general evidence
🔹 Strong Evidence (Option B): 4-5 lines of detailed evidence with specific facts, names, dates or statistics.

Keep the 🔸 and 🔹 markers exactly as shown. Only use information from the notes. Do not invent anything.";

/// 解释反馈的指令
pub const EXPLANATION_INSTRUCTIONS: &str = "You are a kind and smart 16-year-old helping a classmate with a History PEEL paragraph.
The student has written an **Explanation** connecting their Evidence to their Point. Check whether it is clear and makes sense:
- Does it show how the evidence supports the point?
- Does it explain the impact or significance of the evidence?
- Even if it is only 1-2 lines, is the thinking logical?

If the explanation is decent (not perfect, but it makes sense and shows the link), treat it as good enough.
Only ask for a retry if it makes no sense, does not link to the point, or is extremely short and vague.

Use simple, friendly English and avoid big academic words.

If the explanation is strong:
- Start with \"**Great job!**\"
- Say what was strong under a \"### 👍 What Went Well\" heading with bullet points.

If the explanation is weak:
- Use \"### 🔍 What Needs More Work\" to say what is missing.
- Use \"### 💡 Suggestions\" with 2-3 practical tips.

Always finish with \"### ✍️ Sample Improved Explanation\" containing a short better explanation that ends with a one-line link sentence answering the essay question (for example \"Therefore, the USA was at fault for the outbreak of the Cold War.\").";

/// 图片分析提示（学生附带了问题，`{user_text}` 由调用方替换）
pub const VISION_WITH_QUESTION: &str = "You're a friendly 16-year-old history classmate. A friend just asked: \"{user_text}\". Help them using what you can see in the image. If it is a cartoon or a source, describe its message and who it targets.";

/// 图片分析提示（没有附带问题）
pub const VISION_WITHOUT_QUESTION: &str = "You're a friendly 16-year-old history classmate. A friend uploaded this image without saying anything. Work out what it is (a cartoon, flyer or poster) and summarise it helpfully.";

/// 一次扫描填充模板占位符
///
/// 只替换模板自身的占位符，填入的文本即使含有 `{point}` 之类也原样保留
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        for (token, value) in values {
            if let Some(after) = tail.strip_prefix(token) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// 生成论据的完整指令
pub fn evidence_instructions(question: &str, point: &str) -> String {
    fill_template(
        EVIDENCE_INSTRUCTIONS,
        &[("{question}", question), ("{point}", point)],
    )
}

/// 图片分析的提示词
pub fn vision_prompt(user_text: Option<&str>) -> String {
    match user_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => fill_template(VISION_WITH_QUESTION, &[("{user_text}", text)]),
        None => VISION_WITHOUT_QUESTION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mode_falls_back_to_general() {
        assert_eq!(Mode::parse(Some("essay")), Mode::Essay);
        assert_eq!(Mode::parse(Some(" SBQ ")), Mode::Sbq);
        assert_eq!(Mode::parse(Some("poetry")), Mode::General);
        assert_eq!(Mode::parse(None), Mode::General);
    }

    #[test]
    fn test_every_mode_has_instructions() {
        for mode in [Mode::General, Mode::Essay, Mode::Sbq, Mode::Topic, Mode::Feedback] {
            assert!(MODE_INSTRUCTIONS.contains_key(mode.name()));
            assert!(!mode.instructions().is_empty());
        }
        assert_eq!(Mode::Essay.instructions(), ESSAY_INSTRUCTIONS);
    }

    #[test]
    fn test_evidence_instructions_fill_placeholders() {
        let text = evidence_instructions("Who started the Cold War?", "**Ideology**: rival systems");
        assert!(text.contains("Essay Question: \"Who started the Cold War?\""));
        assert!(text.contains("**Ideology**: rival systems"));
        assert!(!text.contains("{point}"));
    }

    #[test]
    fn test_student_text_with_braces_is_kept_literally() {
        let text = evidence_instructions("Explain {point} in the Cold War", "Spies used {question} codes");
        assert!(text.contains("Essay Question: \"Explain {point} in the Cold War\""));
        assert!(text.contains("Spies used {question} codes"));
        assert_eq!(text.matches("Explain {point} in the Cold War").count(), 1);
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        assert_eq!(
            fill_template("a {x} {y} {", &[("{x}", "1")]),
            "a 1 {y} {"
        );
    }

    #[test]
    fn test_vision_prompt_ignores_blank_question() {
        assert_eq!(vision_prompt(Some("   ")), VISION_WITHOUT_QUESTION);
        assert!(vision_prompt(Some("What is this?")).contains("\"What is this?\""));
    }
}
