//! 把会话快照渲染成终端文本
//!
//! 纯函数：同一个快照总是得到同样的输出

use crate::models::{EvidenceChoice, Stage};
use crate::workflow::session::{Action, Session, Speaker};

/// 渲染对话记录和当前阶段可用的操作
pub fn render(session: &Session, busy: bool) -> String {
    let mut lines: Vec<String> = session
        .transcript()
        .iter()
        .map(|message| {
            let who = match message.speaker {
                Speaker::User => "YOU",
                Speaker::Assistant => "TUTOR",
            };
            format!("{}: {}", who, message.text)
        })
        .collect();

    lines.push("-".repeat(60));

    if busy {
        lines.push("⏳ Tutor is thinking...".to_string());
        return lines.join("\n");
    }

    if !session.attachments().is_empty() {
        lines.push(format!("📎 {} document(s) attached", session.attachments().len()));
    }

    lines.extend(controls(session));
    lines.join("\n")
}

fn controls(session: &Session) -> Vec<String> {
    match session.stage() {
        Stage::Init => vec!["[enter] Help me write a PEEL paragraph".to_string()],
        Stage::Question => vec!["Type your essay question.".to_string()],
        Stage::Point => {
            let mut lines = vec!["Pick a point:".to_string()];
            lines.extend(
                session
                    .points()
                    .iter()
                    .enumerate()
                    .map(|(i, point)| format!("  [{}] {}", i + 1, point)),
            );
            lines
        }
        Stage::Evidence => {
            let mut lines = vec![
                format!("[a] {}", EvidenceChoice::Weak.label()),
                format!("[b] {}", EvidenceChoice::Strong.label()),
            ];
            if session.allows(Action::ConfirmWeakEvidence) {
                lines.push("[keep] Keep Option A anyway".to_string());
            }
            lines
        }
        Stage::Explanation => vec![format!(
            "Explain how your evidence supports: {}",
            session.selected_point().unwrap_or_default()
        )],
        Stage::Done => vec![
            "✅ Paragraph complete.".to_string(),
            "[another] Write another paragraph   [restart] Start over".to_string(),
        ],
    }
}
