//! 练习题：数据模型与按科目缓存

mod cache;

pub use cache::{CacheStats, PracticeQuestionCache};

use serde::{Deserialize, Serialize};

use crate::tutor::Complexity;

/// 练习题难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl From<Complexity> for Difficulty {
    fn from(c: Complexity) -> Self {
        match c {
            Complexity::Basic => Difficulty::Easy,
            Complexity::Intermediate => Difficulty::Medium,
            Complexity::Advanced | Complexity::Expert => Difficulty::Hard,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}

/// 单道练习题（创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQuestion {
    pub id: String,
    pub subject: String,
    pub topic: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: String,
    pub difficulty: Difficulty,
    pub metadata: Option<serde_json::Value>,
}

impl PracticeQuestion {
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.correct_option_index).map(String::as_str)
    }

    /// 渲染为可直接放进回复的文本（不含答案）
    pub fn render(&self, number: usize) -> String {
        let mut out = format!("{number}. {}", self.question);
        for (i, option) in self.options.iter().enumerate() {
            let label = (b'A' + (i % 26) as u8) as char;
            out.push_str(&format!("\n   {label}) {option}"));
        }
        out
    }
}
