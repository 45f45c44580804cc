//! 回复生成协作方抽象
//!
//! 引擎把它当作不透明、可能很慢、可能失败的函数：generate(request_type, context) -> text。

use async_trait::async_trait;
use serde::Serialize;

use crate::session::{RequestType, TutorPersonality, TutoringSession};
use crate::tutor::Complexity;

/// 生成请求上下文
#[derive(Debug, Clone, Serialize)]
pub struct GenerationContext {
    pub session_id: String,
    pub subject: String,
    /// 学习者本轮原文
    pub message: String,
    /// 从原文中提取出的概念/主题（提取不到时为科目名）
    pub topic: String,
    pub complexity: Complexity,
    pub personality: TutorPersonality,
    pub language: String,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
}

impl GenerationContext {
    pub fn from_session(session: &TutoringSession, message: &str, topic: &str) -> Self {
        Self {
            session_id: session.id.clone(),
            subject: session.subject.clone(),
            message: message.to_string(),
            topic: topic.to_string(),
            complexity: Complexity::from_depth(session.learning_style.preferred_depth),
            personality: session.personality,
            language: session.language.clone(),
            lesson_id: session.lesson_id.clone(),
            quiz_id: session.quiz_id.clone(),
        }
    }
}

/// 回复生成接口；Err 中为失败原因
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        request_type: RequestType,
        context: &GenerationContext,
    ) -> Result<String, String>;
}
