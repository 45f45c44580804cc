//! Mock 回复生成（无需模型）
//!
//! 按请求类型返回固定文案，便于本地跑通整个会话流程。

use async_trait::async_trait;

use crate::llm::{GenerationContext, ResponseGenerator};
use crate::session::RequestType;

#[derive(Debug, Default)]
pub struct MockResponseGenerator;

#[async_trait]
impl ResponseGenerator for MockResponseGenerator {
    async fn generate(
        &self,
        request_type: RequestType,
        ctx: &GenerationContext,
    ) -> Result<String, String> {
        let subject = &ctx.subject;
        let topic = &ctx.topic;
        let text = match request_type {
            RequestType::ConceptExplanation => format!(
                "A good way to remember {topic} is to connect it to something you already know in {subject}."
            ),
            RequestType::ProblemSolving => format!(
                "Let's solve this step by step:\n1. Identify what the problem is asking.\n\
                 2. List what you know about {topic}.\n3. Choose a method and apply it.\n\
                 4. Check your answer against the original question."
            ),
            RequestType::PracticeQuestions => {
                format!("Work through these {subject} questions, then check the explanations.")
            }
            RequestType::StudyPlanning => format!(
                "For {subject}, short daily sessions beat long cramming. \
                 Aim for focused one-hour blocks and review {topic} at the end of each week."
            ),
            RequestType::Motivation => format!(
                "Every expert in {subject} once struggled with exactly this. \
                 Progress is built one small step at a time."
            ),
            RequestType::ExamPreparation => format!(
                "For your {subject} exam: review key definitions, practice past questions under time \
                 pressure, and focus extra time on {topic}."
            ),
            RequestType::SubjectOverview => format!(
                "{subject} is built from a few core ideas. We'll start with the foundations and work \
                 towards {topic}."
            ),
            RequestType::LessonHelp => match &ctx.lesson_id {
                Some(lesson) => format!(
                    "Let's look at lesson {lesson} together. Which part of {topic} is unclear?"
                ),
                None => format!("Tell me which lesson you're on and which part of {topic} is unclear."),
            },
            RequestType::QuizHelp => match &ctx.quiz_id {
                Some(quiz) => format!(
                    "For quiz {quiz}, I'll give you hints rather than answers. What have you tried so far?"
                ),
                None => "Share the quiz question and what you've tried so far, and I'll give you a hint."
                    .to_string(),
            },
            RequestType::QuickQuestion => {
                format!("Good question about {subject}! Here's the short answer about {topic}.")
            }
        };
        Ok(text)
    }
}
