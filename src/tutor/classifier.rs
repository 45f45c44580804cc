//! 请求分类
//!
//! 按固定顺序尝试每种 RequestType 的短语模式，第一个命中者胜出；都不命中时为 QuickQuestion。
//! 纯函数，不调用生成协作方，同一输入永远得到同一结果。

use std::sync::OnceLock;

use regex::Regex;

use crate::session::RequestType;

/// (类型, 短语模式)；顺序即优先级
const PATTERNS: &[(RequestType, &[&str])] = &[
    (
        RequestType::ConceptExplanation,
        &[
            r"\bexplain\b",
            r"\bwhat (is|are|does)\b",
            r"\bwhat'?s\b",
            r"\bdefine\b",
            r"\bdefinition of\b",
            r"\bmeaning of\b",
            r"\bhow does .+ work\b",
            r"\bi don'?t understand\b",
            r"\bwhy (is|are|does|do)\b",
        ],
    ),
    (
        RequestType::ProblemSolving,
        &[
            r"\bsolve\b",
            r"\bhow (do|can|would) i\b",
            r"\bcalculate\b",
            r"\bstep[- ]by[- ]step\b",
            r"\bwork out\b",
            r"\bfind the (value|answer|solution)\b",
            r"\bthis problem\b",
            r"\bequation\b",
        ],
    ),
    (
        RequestType::PracticeQuestions,
        &[
            r"\bpractice\b",
            r"\bquiz me\b",
            r"\btest me\b",
            r"\bexercises?\b",
            r"\b(give|show) me (some |a few )?(more )?questions\b",
            r"\bsample questions?\b",
        ],
    ),
    (
        RequestType::StudyPlanning,
        &[
            r"\bstudy plan\b",
            r"\bschedule\b",
            r"\btimetable\b",
            r"\bplan (my|out)\b",
            r"\borgani[sz]e my (study|studies|time)\b",
            r"\bhow (long|much time) should i (study|spend)\b",
        ],
    ),
    (
        RequestType::Motivation,
        &[
            r"\bmotivat",
            r"\bgive up\b",
            r"\bfrustrat",
            r"\bcan'?t do (this|it)\b",
            r"\bstressed\b",
            r"\bbored\b",
            r"\btired of\b",
            r"\bhopeless\b",
            r"\bencourage",
        ],
    ),
    (
        RequestType::ExamPreparation,
        &[
            r"\bexams?\b",
            r"\btest prep\b",
            r"\brevis(e|ion)\b",
            r"\bfinals?\b",
            r"\bmidterms?\b",
            r"\bprepare for (the|my) test\b",
        ],
    ),
    (
        RequestType::SubjectOverview,
        &[
            r"\boverview\b",
            r"\bsummary of\b",
            r"\bsummari[sz]e\b",
            r"\bintroduction to\b",
            r"\bwhat topics\b",
            r"\bsyllabus\b",
            r"\bbig picture\b",
        ],
    ),
    (
        RequestType::LessonHelp,
        &[r"\blessons?\b", r"\bthis chapter\b", r"\bthis unit\b", r"\bthis section\b"],
    ),
    (
        RequestType::QuizHelp,
        &[
            r"\bquiz\b",
            r"\bquestion \d+\b",
            r"\bthis question\b",
            r"\bwhich option\b",
            r"\bmultiple choice\b",
        ],
    ),
];

static COMPILED: OnceLock<Vec<(RequestType, Vec<Regex>)>> = OnceLock::new();

fn compiled() -> &'static [(RequestType, Vec<Regex>)] {
    COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .map(|(rt, patterns)| {
                let regexes = patterns
                    .iter()
                    .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            tracing::error!("Invalid classifier pattern '{}': {}", p, e);
                            None
                        }
                    })
                    .collect();
                (*rt, regexes)
            })
            .collect()
    })
}

/// 请求分类器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestClassifier;

impl RequestClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 对自由文本分类；永不失败
    pub fn classify(&self, text: &str) -> RequestType {
        let text = text.trim();
        if text.is_empty() {
            return RequestType::QuickQuestion;
        }
        compiled()
            .iter()
            .find(|(_, regexes)| regexes.iter().any(|re| re.is_match(text)))
            .map(|(rt, _)| *rt)
            .unwrap_or(RequestType::QuickQuestion)
    }

    /// 调用方显式给出的类型优先
    pub fn resolve(&self, explicit: Option<RequestType>, text: &str) -> RequestType {
        explicit.unwrap_or_else(|| self.classify(text))
    }
}

/// 从原文中提取概念/主题，提取不到时返回 None
///
/// 例如 "explain photosynthesis" -> "photosynthesis"，"what is a prime number?" -> "a prime number"
pub fn extract_topic(text: &str) -> Option<String> {
    static TOPIC_RE: OnceLock<Regex> = OnceLock::new();
    let re = TOPIC_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:explain|define|what is|what are|what's|meaning of|about|on|with|understand|solve|practice)\s+(.+)",
        )
        .expect("topic pattern is valid")
    });
    let caps = re.captures(text.trim())?;
    let topic = caps
        .get(1)?
        .as_str()
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .trim();
    if topic.is_empty() {
        None
    } else {
        Some(topic.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_each_type() {
        let c = RequestClassifier::new();
        assert_eq!(c.classify("Can you explain photosynthesis?"), RequestType::ConceptExplanation);
        assert_eq!(c.classify("How do I solve 2x + 3 = 7"), RequestType::ProblemSolving);
        assert_eq!(c.classify("quiz me on fractions"), RequestType::PracticeQuestions);
        assert_eq!(c.classify("help me make a study plan"), RequestType::StudyPlanning);
        assert_eq!(c.classify("I want to give up"), RequestType::Motivation);
        assert_eq!(c.classify("my exam is next week"), RequestType::ExamPreparation);
        assert_eq!(c.classify("give me an overview of chemistry"), RequestType::SubjectOverview);
        assert_eq!(c.classify("I'm stuck on this lesson"), RequestType::LessonHelp);
        assert_eq!(c.classify("help with the quiz"), RequestType::QuizHelp);
        assert_eq!(c.classify("hello there"), RequestType::QuickQuestion);
    }

    #[test]
    fn test_order_decides_overlaps() {
        let c = RequestClassifier::new();
        // "quiz me" 属于练习题，优先于测验帮助
        assert_eq!(c.classify("Quiz me please"), RequestType::PracticeQuestions);
        // 动机类排在考试准备之前
        assert_eq!(c.classify("I'm stressed about my exam"), RequestType::Motivation);
    }

    #[test]
    fn test_empty_input_falls_through() {
        let c = RequestClassifier::new();
        assert_eq!(c.classify("   "), RequestType::QuickQuestion);
    }

    #[test]
    fn test_deterministic() {
        let c = RequestClassifier::new();
        let inputs = ["explain gravity", "random words", "practice algebra", "schedule my week"];
        for input in inputs {
            let first = c.classify(input);
            for _ in 0..20 {
                assert_eq!(c.classify(input), first);
            }
        }
    }

    #[test]
    fn test_explicit_type_wins() {
        let c = RequestClassifier::new();
        assert_eq!(
            c.resolve(Some(RequestType::Motivation), "explain gravity"),
            RequestType::Motivation
        );
        assert_eq!(c.resolve(None, "explain gravity"), RequestType::ConceptExplanation);
    }

    #[test]
    fn test_extract_topic() {
        assert_eq!(extract_topic("explain photosynthesis").as_deref(), Some("photosynthesis"));
        assert_eq!(extract_topic("What is a prime number?").as_deref(), Some("a prime number"));
        assert_eq!(extract_topic("hello"), None);
    }
}
