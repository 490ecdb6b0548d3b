use std::fmt;

use serde::{Deserialize, Serialize};

/// 写作流程阶段
///
/// 只能沿固定的边前进，例外是"重写解释"、"再写一段"和"重新开始"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// 尚未开始
    #[default]
    Init,
    /// 输入作文题目
    Question,
    /// 选择论点
    Point,
    /// 选择论据
    Evidence,
    /// 撰写解释
    Explanation,
    /// 段落完成
    Done,
}

impl Stage {
    /// 全部阶段，按流程顺序
    pub const ALL: [Stage; 6] = [
        Stage::Init,
        Stage::Question,
        Stage::Point,
        Stage::Evidence,
        Stage::Explanation,
        Stage::Done,
    ];

    /// 获取阶段名称
    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Question => "question",
            Stage::Point => "point",
            Stage::Evidence => "evidence",
            Stage::Explanation => "explanation",
            Stage::Done => "done",
        }
    }

    /// 判断 self -> next 是否为合法的边
    pub fn can_move_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Init, Stage::Question)
                | (Stage::Question, Stage::Point)
                | (Stage::Point, Stage::Evidence)
                | (Stage::Evidence, Stage::Explanation)
                | (Stage::Explanation, Stage::Explanation)
                | (Stage::Explanation, Stage::Done)
                | (Stage::Done, Stage::Point)
                | (_, Stage::Init)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 论据选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceChoice {
    /// Option A，泛泛而谈
    Weak,
    /// Option B，有具体史实
    Strong,
}

impl EvidenceChoice {
    /// 界面上显示的标签
    pub fn label(self) -> &'static str {
        match self {
            EvidenceChoice::Weak => "Option A (Weak)",
            EvidenceChoice::Strong => "Option B (Strong)",
        }
    }
}

/// 解释反馈之后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextStep {
    /// 需要重写解释
    Explanation,
    /// 解释合格，进入 Link（客户端视为完成）
    Link,
}
