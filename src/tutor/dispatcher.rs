//! 回复分发
//!
//! RequestType -> Handler 路由表。Handler 负责正文（模板 + 生成协作方 + 练习题缓存），
//! 分发器统一追加性格后缀、做翻译，并把生成失败/超时兜底为固定致歉回复。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::classifier::extract_topic;
use super::explanations::{explanation_template, Complexity};
use super::personality::with_personality;
use super::translation::Translator;
use crate::config::TutorSection;
use crate::core::{Result, TutorError};
use crate::llm::{GenerationContext, ResponseGenerator};
use crate::practice::{Difficulty, PracticeQuestionCache};
use crate::session::{RequestType, TutoringMessage, TutoringSession};

/// 生成失败时的固定回复（仍算一轮有效的导师回复）
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

/// Handler 的输入
pub struct HandlerContext<'a> {
    pub session: &'a TutoringSession,
    pub message: &'a TutoringMessage,
    pub request_type: RequestType,
    pub generation: GenerationContext,
}

/// Handler 的输出：正文 + 回复类型 + 附加元数据
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub body: String,
    pub response_type: &'static str,
    pub extra: Option<serde_json::Value>,
}

impl HandlerOutput {
    fn text(body: String, response_type: &'static str) -> Self {
        Self {
            body,
            response_type,
            extra: None,
        }
    }
}

#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput>;
}

async fn generate(
    generator: &dyn ResponseGenerator,
    request_type: RequestType,
    ctx: &GenerationContext,
) -> Result<String> {
    generator
        .generate(request_type, ctx)
        .await
        .map_err(TutorError::Generation)
}

/// 概念讲解：分档模板 + 生成补充
pub struct ConceptExplanationHandler {
    generator: Arc<dyn ResponseGenerator>,
}

#[async_trait]
impl ResponseHandler for ConceptExplanationHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput> {
        let g = &ctx.generation;
        let template = explanation_template(&g.subject, &g.topic, g.complexity);
        let generated = generate(self.generator.as_ref(), ctx.request_type, g).await?;
        Ok(HandlerOutput::text(
            format!("{template}\n\n{generated}"),
            "explanation",
        ))
    }
}

/// 练习题：从缓存取题，生成协作方给出引导语
pub struct PracticeQuestionsHandler {
    generator: Arc<dyn ResponseGenerator>,
    cache: Arc<PracticeQuestionCache>,
    count: usize,
    default_grade_level: u8,
}

#[async_trait]
impl ResponseHandler for PracticeQuestionsHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput> {
        let g = &ctx.generation;
        let grade_level = ctx
            .message
            .metadata
            .as_ref()
            .and_then(|m| m.get("gradeLevel"))
            .and_then(|v| v.as_u64())
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(self.default_grade_level);

        let questions = self
            .cache
            .generate_practice_questions(
                &g.subject,
                &g.topic,
                Difficulty::from(g.complexity),
                self.count,
                grade_level,
            )
            .await
            .map_err(|e| TutorError::Generation(e.to_string()))?;

        let intro = generate(self.generator.as_ref(), ctx.request_type, g).await?;
        let rendered: Vec<String> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| q.render(i + 1))
            .collect();

        Ok(HandlerOutput {
            body: format!("{intro}\n\n{}", rendered.join("\n\n")),
            response_type: "practice_questions",
            extra: Some(json!({ "questions": questions })),
        })
    }
}

/// 其余类型：直接使用生成协作方的文本
pub struct GeneratedHandler {
    generator: Arc<dyn ResponseGenerator>,
    response_type: &'static str,
}

#[async_trait]
impl ResponseHandler for GeneratedHandler {
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput> {
        let body = generate(self.generator.as_ref(), ctx.request_type, &ctx.generation).await?;
        Ok(HandlerOutput::text(body, self.response_type))
    }
}

/// 回复分发器
pub struct ResponseDispatcher {
    handlers: HashMap<RequestType, Arc<dyn ResponseHandler>>,
    translator: Arc<dyn Translator>,
    generation_timeout: Duration,
}

impl ResponseDispatcher {
    pub fn new(
        generator: Arc<dyn ResponseGenerator>,
        cache: Arc<PracticeQuestionCache>,
        translator: Arc<dyn Translator>,
        cfg: &TutorSection,
    ) -> Self {
        let mut handlers: HashMap<RequestType, Arc<dyn ResponseHandler>> = HashMap::new();
        handlers.insert(
            RequestType::ConceptExplanation,
            Arc::new(ConceptExplanationHandler {
                generator: Arc::clone(&generator),
            }),
        );
        handlers.insert(
            RequestType::PracticeQuestions,
            Arc::new(PracticeQuestionsHandler {
                generator: Arc::clone(&generator),
                cache,
                count: cfg.practice_questions_per_reply.max(1),
                default_grade_level: cfg.default_grade_level,
            }),
        );
        let generated = [
            (RequestType::ProblemSolving, "problem_solving"),
            (RequestType::StudyPlanning, "study_planning"),
            (RequestType::Motivation, "motivation"),
            (RequestType::ExamPreparation, "exam_preparation"),
            (RequestType::SubjectOverview, "subject_overview"),
            (RequestType::LessonHelp, "lesson_help"),
            (RequestType::QuizHelp, "quiz_help"),
            (RequestType::QuickQuestion, "quick_answer"),
        ];
        for (rt, response_type) in generated {
            handlers.insert(
                rt,
                Arc::new(GeneratedHandler {
                    generator: Arc::clone(&generator),
                    response_type,
                }),
            );
        }

        Self {
            handlers,
            translator,
            generation_timeout: Duration::from_secs(cfg.generation_timeout_secs.max(1)),
        }
    }

    /// 替换某个类型的 Handler
    pub fn with_handler(mut self, request_type: RequestType, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handlers.insert(request_type, handler);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// 为学习者消息生成导师回复；永不失败，生成失败时返回致歉回复
    pub async fn dispatch(
        &self,
        session: &TutoringSession,
        message: &TutoringMessage,
        request_type: RequestType,
    ) -> TutoringMessage {
        let topic = message
            .metadata
            .as_ref()
            .and_then(|m| m.get("topic"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| extract_topic(&message.content))
            .unwrap_or_else(|| session.subject.clone());

        let generation = GenerationContext::from_session(session, &message.content, &topic);
        let complexity = generation.complexity;
        let ctx = HandlerContext {
            session,
            message,
            request_type,
            generation,
        };

        let outcome = match self.handlers.get(&request_type) {
            Some(handler) => {
                match tokio::time::timeout(self.generation_timeout, handler.handle(&ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(TutorError::Generation(format!(
                        "generation timed out after {}s",
                        self.generation_timeout.as_secs()
                    ))),
                }
            }
            None => Err(TutorError::Generation(format!(
                "no handler registered for {request_type}"
            ))),
        };

        match outcome {
            Ok(output) => {
                let text = with_personality(&output.body, session.personality);
                let text = self.translator.translate(&text, &session.language).await;
                let mut metadata = json!({
                    "responseType": output.response_type,
                    "complexity": complexity,
                    "topic": topic,
                });
                if let (Some(obj), Some(serde_json::Value::Object(extra))) =
                    (metadata.as_object_mut(), output.extra)
                {
                    obj.extend(extra);
                }
                tracing::debug!(
                    "Dispatched {} reply for session {} ({})",
                    request_type,
                    session.id,
                    output.response_type
                );
                TutoringMessage::tutor(text)
                    .with_request_type(request_type)
                    .with_metadata(metadata)
            }
            Err(e) => {
                tracing::warn!(
                    "Reply generation failed for session {}, sending apology: {}",
                    session.id,
                    e
                );
                TutoringMessage::tutor(APOLOGY_MESSAGE)
                    .with_request_type(request_type)
                    .with_metadata(json!({ "responseType": "error", "error": e.to_string() }))
            }
        }
    }

    /// 对任意文本做语言适配（欢迎语/告别语复用）
    pub async fn localize(&self, text: &str, language: &str) -> String {
        self.translator.translate(text, language).await
    }
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("handlers", &self.handlers.len())
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

/// 便于测试/调用方从会话推出档位
pub fn complexity_of(session: &TutoringSession) -> Complexity {
    Complexity::from_depth(session.learning_style.preferred_depth)
}
