//! 辅导会话数据模型
//!
//! TutoringSession 只能追加消息或设置 end_time；TutoringMessage 创建后不可变。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话 ID
pub type SessionId = String;

/// 消息 ID
pub type MessageId = String;

/// 导师性格（决定欢迎语、告别语与回复后缀）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TutorPersonality {
    #[default]
    Encouraging,
    Analytical,
    Patient,
    Challenging,
    Creative,
    Adaptable,
}

impl TutorPersonality {
    pub const ALL: [TutorPersonality; 6] = [
        TutorPersonality::Encouraging,
        TutorPersonality::Analytical,
        TutorPersonality::Patient,
        TutorPersonality::Challenging,
        TutorPersonality::Creative,
        TutorPersonality::Adaptable,
    ];
}

impl std::fmt::Display for TutorPersonality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TutorPersonality::Encouraging => write!(f, "encouraging"),
            TutorPersonality::Analytical => write!(f, "analytical"),
            TutorPersonality::Patient => write!(f, "patient"),
            TutorPersonality::Challenging => write!(f, "challenging"),
            TutorPersonality::Creative => write!(f, "creative"),
            TutorPersonality::Adaptable => write!(f, "adaptable"),
        }
    }
}

impl std::str::FromStr for TutorPersonality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "encouraging" => Ok(Self::Encouraging),
            "analytical" => Ok(Self::Analytical),
            "patient" => Ok(Self::Patient),
            "challenging" => Ok(Self::Challenging),
            "creative" => Ok(Self::Creative),
            "adaptable" => Ok(Self::Adaptable),
            other => Err(format!("unknown personality '{other}'")),
        }
    }
}

/// 学习风格偏好权重（均为 0.0 - 1.0）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStyle {
    /// 讲解深度偏好，决定讲解模板的难度档位
    pub preferred_depth: f32,
    #[serde(default = "half")]
    pub prefers_examples: f32,
    #[serde(default = "half")]
    pub prefers_visuals: f32,
}

fn half() -> f32 {
    0.5
}

impl Default for LearningStyle {
    fn default() -> Self {
        Self {
            preferred_depth: 0.5,
            prefers_examples: 0.5,
            prefers_visuals: 0.5,
        }
    }
}

impl LearningStyle {
    pub fn with_depth(depth: f32) -> Self {
        Self {
            preferred_depth: depth.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

/// 学习者单轮意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    ConceptExplanation,
    ProblemSolving,
    PracticeQuestions,
    StudyPlanning,
    Motivation,
    ExamPreparation,
    SubjectOverview,
    LessonHelp,
    QuizHelp,
    QuickQuestion,
}

impl RequestType {
    pub const ALL: [RequestType; 10] = [
        RequestType::ConceptExplanation,
        RequestType::ProblemSolving,
        RequestType::PracticeQuestions,
        RequestType::StudyPlanning,
        RequestType::Motivation,
        RequestType::ExamPreparation,
        RequestType::SubjectOverview,
        RequestType::LessonHelp,
        RequestType::QuizHelp,
        RequestType::QuickQuestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ConceptExplanation => "conceptExplanation",
            RequestType::ProblemSolving => "problemSolving",
            RequestType::PracticeQuestions => "practiceQuestions",
            RequestType::StudyPlanning => "studyPlanning",
            RequestType::Motivation => "motivation",
            RequestType::ExamPreparation => "examPreparation",
            RequestType::SubjectOverview => "subjectOverview",
            RequestType::LessonHelp => "lessonHelp",
            RequestType::QuizHelp => "quizHelp",
            RequestType::QuickQuestion => "quickQuestion",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条消息（一轮）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutoringMessage {
    pub id: MessageId,
    pub is_from_tutor: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub request_type: Option<RequestType>,
    pub metadata: Option<serde_json::Value>,
}

impl TutoringMessage {
    fn new(is_from_tutor: bool, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            is_from_tutor,
            content: content.into(),
            timestamp: Utc::now(),
            request_type: None,
            metadata: None,
        }
    }

    pub fn learner(content: impl Into<String>) -> Self {
        Self::new(false, content)
    }

    pub fn tutor(content: impl Into<String>) -> Self {
        Self::new(true, content)
    }

    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// metadata 中 responseType 字段（welcome / farewell / offline_placeholder / error ...）
    pub fn response_type(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("responseType"))
            .and_then(|v| v.as_str())
    }
}

/// 一次辅导会话
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutoringSession {
    pub id: SessionId,
    pub user_id: String,
    pub subject: String,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    messages: Vec<TutoringMessage>,
    pub personality: TutorPersonality,
    pub language: String,
    pub learning_style: LearningStyle,
    /// 离线时已排队 end_session，等待回放；此后不再接受消息
    #[serde(default)]
    pub pending_end: bool,
}

impl TutoringSession {
    pub fn new(
        user_id: impl Into<String>,
        subject: impl Into<String>,
        personality: TutorPersonality,
        language: impl Into<String>,
        learning_style: LearningStyle,
    ) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            subject: subject.into(),
            lesson_id: None,
            quiz_id: None,
            start_time: Utc::now(),
            end_time: None,
            messages: Vec::new(),
            personality,
            language: language.into(),
            learning_style,
            pending_end: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// 可接受新消息：Active 且未排队结束
    pub fn accepts_messages(&self) -> bool {
        self.is_active() && !self.pending_end
    }

    pub fn messages(&self) -> &[TutoringMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&TutoringMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// 追加一条消息（只追加，不修改已有消息）
    pub fn push_message(&mut self, message: TutoringMessage) {
        self.messages.push(message);
    }

    /// 标记结束；end_time 不早于 start_time
    pub fn end(&mut self, at: DateTime<Utc>) {
        self.end_time = Some(at.max(self.start_time));
        self.pending_end = false;
    }

    pub fn learner_message_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_from_tutor).count()
    }

    /// 已进行的整分钟数（结束后按 end_time 计算）
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        let until = self.end_time.unwrap_or(now);
        (until - self.start_time).num_minutes().max(0)
    }
}
