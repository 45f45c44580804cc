//! 分档讲解模板
//!
//! 以 (科目, 概念, 难度档位) 为键；档位由 learning_style.preferred_depth 推出。

use serde::{Deserialize, Serialize};

/// 讲解难度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Basic,
    Intermediate,
    Advanced,
    Expert,
}

impl Complexity {
    /// ≥0.7 expert，≥0.5 advanced，≥0.3 intermediate，其余 basic
    pub fn from_depth(depth: f32) -> Self {
        if depth >= 0.7 {
            Complexity::Expert
        } else if depth >= 0.5 {
            Complexity::Advanced
        } else if depth >= 0.3 {
            Complexity::Intermediate
        } else {
            Complexity::Basic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Basic => "basic",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
            Complexity::Expert => "expert",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 有专门措辞的科目；其它科目走通用模板
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubjectFamily {
    Math,
    Science,
    Language,
    History,
    General,
}

impl SubjectFamily {
    fn of(subject: &str) -> Self {
        let s = subject.to_lowercase();
        if ["math", "algebra", "geometry", "calculus", "statistics", "arithmetic"]
            .iter()
            .any(|k| s.contains(k))
        {
            SubjectFamily::Math
        } else if ["science", "physics", "chemistry", "biology"]
            .iter()
            .any(|k| s.contains(k))
        {
            SubjectFamily::Science
        } else if ["english", "language", "literature", "writing", "grammar", "spanish", "french"]
            .iter()
            .any(|k| s.contains(k))
        {
            SubjectFamily::Language
        } else if ["history", "geography", "civics", "social"]
            .iter()
            .any(|k| s.contains(k))
        {
            SubjectFamily::History
        } else {
            SubjectFamily::General
        }
    }

    /// 该科目族在讲解中建议的切入方式
    fn angle(&self) -> &'static str {
        match self {
            SubjectFamily::Math => "work through a small numeric example",
            SubjectFamily::Science => "connect it to an experiment you could observe",
            SubjectFamily::Language => "look at it inside a real sentence",
            SubjectFamily::History => "place it on a timeline with its causes and effects",
            SubjectFamily::General => "relate it to an everyday situation",
        }
    }
}

/// 按 (科目, 概念, 档位) 生成讲解正文
pub fn explanation_template(subject: &str, concept: &str, complexity: Complexity) -> String {
    let angle = SubjectFamily::of(subject).angle();
    match complexity {
        Complexity::Basic => format!(
            "Let's start simple. {concept} is one of the building blocks of {subject}. \
             Think of it in plain words first, then we'll {angle}."
        ),
        Complexity::Intermediate => format!(
            "{concept} in {subject} builds on ideas you already know. \
             Let's define it clearly, {angle}, and then look at where people usually slip up."
        ),
        Complexity::Advanced => format!(
            "Here's a deeper look at {concept} in {subject}. \
             We'll cover the formal definition, {angle}, and see how it connects to related topics."
        ),
        Complexity::Expert => format!(
            "Let's treat {concept} rigorously. Beyond the standard {subject} definition, \
             consider its edge cases and underlying assumptions, {angle}, and ask how you would prove or test it."
        ),
    }
}
