//! 会话生命周期管理：开始 / 结束 / 发消息 / 查询活跃会话
//!
//! 状态机只有 Active -> Ended 一条边。每个会话的一整轮（追加 → 分发 → 追加回复 → 持久化 → 发布）
//! 都在该会话的 Mutex 内完成；不同会话并行。
//! 离线时操作进入离线队列，回放通过 `OperationApplier` 回到这里。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::store::{SessionHandle, SessionStore};
use super::types::{LearningStyle, RequestType, TutorPersonality, TutoringMessage, TutoringSession};
use crate::connectivity::Connectivity;
use crate::core::{EventBus, Result, TutorError};
use crate::offline::{DrainReport, OfflineOperation, OfflineQueue, OperationApplier, OperationKind};
use crate::persistence::{self, Persistence, SESSIONS_COLLECTION};
use crate::tutor::{farewell_message, welcome_message, RequestClassifier, ResponseDispatcher};

/// 离线时返回给调用方的占位回复
pub const OFFLINE_PLACEHOLDER: &str = "You are offline, message queued.";

/// 开始会话的请求
#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    pub user_id: String,
    pub subject: String,
    pub personality: TutorPersonality,
    /// 未指定时使用配置中的默认语言
    pub language: Option<String>,
    pub learning_style: LearningStyle,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
}

impl StartSessionRequest {
    pub fn new(user_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            subject: subject.into(),
            personality: TutorPersonality::default(),
            language: None,
            learning_style: LearningStyle::default(),
            lesson_id: None,
            quiz_id: None,
        }
    }

    pub fn with_personality(mut self, personality: TutorPersonality) -> Self {
        self.personality = personality;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_learning_style(mut self, style: LearningStyle) -> Self {
        self.learning_style = style;
        self
    }

    pub fn with_lesson(mut self, lesson_id: impl Into<String>) -> Self {
        self.lesson_id = Some(lesson_id.into());
        self
    }

    pub fn with_quiz(mut self, quiz_id: impl Into<String>) -> Self {
        self.quiz_id = Some(quiz_id.into());
        self
    }
}

/// end_session 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEndOutcome {
    /// 已结束，附带告别消息
    Ended(TutoringMessage),
    /// 离线：结束操作已排队（操作 ID），联网后回放
    Deferred(String),
}

impl SessionEndOutcome {
    pub fn is_deferred(&self) -> bool {
        matches!(self, SessionEndOutcome::Deferred(_))
    }
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<ResponseDispatcher>,
    classifier: RequestClassifier,
    queue: Arc<OfflineQueue>,
    connectivity: Arc<dyn Connectivity>,
    persistence: Arc<dyn Persistence>,
    events: EventBus,
    default_language: String,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<ResponseDispatcher>,
        queue: Arc<OfflineQueue>,
        connectivity: Arc<dyn Connectivity>,
        persistence: Arc<dyn Persistence>,
        events: EventBus,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            classifier: RequestClassifier::new(),
            queue,
            connectivity,
            persistence,
            events,
            default_language: default_language.into(),
        }
    }

    pub async fn start_session(&self, request: StartSessionRequest) -> Result<TutoringSession> {
        if request.user_id.trim().is_empty() {
            return Err(TutorError::validation("user id must not be empty"));
        }
        if request.subject.trim().is_empty() {
            return Err(TutorError::validation("subject must not be empty"));
        }

        let language = request
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.default_language.clone());
        let mut session = TutoringSession::new(
            request.user_id,
            request.subject.trim(),
            request.personality,
            language,
            request.learning_style,
        );
        session.lesson_id = request.lesson_id;
        session.quiz_id = request.quiz_id;

        let text = welcome_message(
            &session.subject,
            session.personality,
            session.lesson_id.is_some(),
            session.quiz_id.is_some(),
        );
        let text = self.dispatcher.localize(&text, &session.language).await;
        let welcome = TutoringMessage::tutor(text).with_metadata(json!({ "responseType": "welcome" }));
        session.push_message(welcome.clone());

        self.persist(&session).await?;
        self.store.insert(session.clone()).await?;
        self.events.publish_message(&session.id, &welcome);

        tracing::info!(
            "Started session {} for {} ({}, {})",
            session.id,
            session.user_id,
            session.subject,
            session.personality
        );
        Ok(session)
    }

    /// 发送学习者消息并返回导师回复；离线时返回占位回复
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
        request_type: Option<RequestType>,
        metadata: Option<serde_json::Value>,
    ) -> Result<TutoringMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(TutorError::validation("message must not be empty"));
        }

        let handle = self.live_handle(session_id).await?;
        let mut session = handle.lock().await;
        if !session.accepts_messages() {
            return Err(TutorError::invalid_state(session_id));
        }

        let request_type = self.classifier.resolve(request_type, content);
        let mut learner = TutoringMessage::learner(content).with_request_type(request_type);
        learner.metadata = metadata;

        if !self.connectivity.is_online() {
            let operation = OfflineOperation::send_message(session_id, &learner);
            let operation_id = operation.id.clone();
            // 先入队：队列满时会话保持不变
            self.queue.enqueue(operation).await?;

            let placeholder = TutoringMessage::tutor(OFFLINE_PLACEHOLDER)
                .with_request_type(request_type)
                .with_metadata(json!({
                    "responseType": "offline_placeholder",
                    "queuedOperationId": operation_id,
                }));
            let mut updated = session.clone();
            updated.push_message(learner.clone());
            updated.push_message(placeholder.clone());
            if let Err(e) = self.persist(&updated).await {
                self.withdraw(&operation_id).await;
                return Err(e);
            }
            *session = updated;
            self.events.publish_message(session_id, &learner);
            self.events.publish_message(session_id, &placeholder);

            tracing::info!(
                "Session {} offline, queued message {} as {}",
                session_id,
                learner.id,
                operation_id
            );
            return Ok(placeholder);
        }

        let mut updated = session.clone();
        updated.push_message(learner.clone());
        let reply = self.dispatcher.dispatch(&updated, &learner, request_type).await;
        updated.push_message(reply.clone());
        self.persist(&updated).await?;
        *session = updated;
        self.events.publish_message(session_id, &learner);
        self.events.publish_message(session_id, &reply);

        tracing::debug!("Session {} handled {} turn", session_id, request_type);
        Ok(reply)
    }

    /// 结束会话。离线，或该会话仍有回放不掉的排队操作时，结束排到队尾并返回 Deferred
    pub async fn end_session(&self, session_id: &str) -> Result<SessionEndOutcome> {
        if self.connectivity.is_online() && self.queue.has_pending_for(session_id).await {
            // 回放在会话锁外进行
            self.drain_offline_queue().await;
        }

        let handle = self.live_handle(session_id).await?;
        let mut session = handle.lock().await;
        if !session.accepts_messages() {
            return Err(TutorError::invalid_state(session_id));
        }

        let online = self.connectivity.is_online();
        if !online || self.queue.has_pending_for(session_id).await {
            let operation = OfflineOperation::end_session(session_id);
            let operation_id = operation.id.clone();
            self.queue.enqueue(operation).await?;

            let mut updated = session.clone();
            updated.pending_end = true;
            if let Err(e) = self.persist(&updated).await {
                self.withdraw(&operation_id).await;
                return Err(e);
            }
            *session = updated;

            if online {
                tracing::info!(
                    "Session {} still has queued operations, end deferred as {}",
                    session_id,
                    operation_id
                );
            } else {
                tracing::info!("Session {} offline, end deferred as {}", session_id, operation_id);
            }
            return Ok(SessionEndOutcome::Deferred(operation_id));
        }

        let farewell = self.finish(&mut session).await?;
        Ok(SessionEndOutcome::Ended(farewell))
    }

    /// 用户最近开始的、仍可对话的会话
    pub async fn get_active_session(&self, user_id: &str) -> Option<TutoringSession> {
        for handle in self.store.user_sessions(user_id).await {
            let session = handle.lock().await;
            if session.accepts_messages() {
                return Some(session.clone());
            }
        }
        None
    }

    /// 活跃会话的快照
    pub async fn get_session(&self, session_id: &str) -> Option<TutoringSession> {
        let handle = self.store.get(session_id).await?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// 用户的全部会话（含已归档），按开始时间排序
    pub async fn session_history(&self, user_id: &str) -> Result<Vec<TutoringSession>> {
        let mut sessions: Vec<TutoringSession> =
            persistence::load_all(self.persistence.as_ref(), SESSIONS_COLLECTION)
                .await?
                .into_iter()
                .filter(|s: &TutoringSession| s.user_id == user_id)
                .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    /// 启动时把持久化中未结束的会话放回活跃集合
    pub async fn restore_active_sessions(&self) -> Result<usize> {
        let stored: Vec<TutoringSession> =
            persistence::load_all(self.persistence.as_ref(), SESSIONS_COLLECTION).await?;
        let mut restored = 0;
        for session in stored.into_iter().filter(TutoringSession::is_active) {
            let id = session.id.clone();
            match self.store.insert(session).await {
                Ok(_) => restored += 1,
                Err(e) => tracing::warn!("Skipping session {} on restore: {}", id, e),
            }
        }
        if restored > 0 {
            tracing::info!("Restored {} active sessions", restored);
        }
        Ok(restored)
    }

    /// 立即回放离线队列
    pub async fn drain_offline_queue(&self) -> DrainReport {
        self.queue.drain(self).await
    }

    /// 丢弃一个排队操作。丢弃的是结束操作时，会话恢复为可对话
    pub async fn discard_offline_operation(&self, operation_id: &str) -> Result<OfflineOperation> {
        let removed = self.queue.discard(operation_id).await?;
        if !matches!(removed.kind, OperationKind::EndSession) {
            return Ok(removed);
        }

        if let Some(handle) = self.store.get(&removed.session_id).await {
            let mut session = handle.lock().await;
            if session.is_active() && session.pending_end {
                let mut reopened = session.clone();
                reopened.pending_end = false;
                self.persist(&reopened).await?;
                *session = reopened;
                tracing::info!(
                    "Session {} reopened after discarding queued end {}",
                    removed.session_id,
                    operation_id
                );
            }
        }
        Ok(removed)
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// 撤回刚入队的操作（会话持久化失败时）
    async fn withdraw(&self, operation_id: &str) {
        if let Err(e) = self.queue.discard(operation_id).await {
            tracing::warn!("Failed to withdraw queued operation {}: {}", operation_id, e);
        }
    }

    /// 活跃会话句柄；会话已结束归档时报 InvalidState，从未存在时报 NotFound
    async fn live_handle(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.store.get(session_id).await {
            return Ok(handle);
        }
        let archived: Option<TutoringSession> =
            persistence::load(self.persistence.as_ref(), SESSIONS_COLLECTION, session_id).await?;
        match archived {
            Some(_) => Err(TutorError::invalid_state(session_id)),
            None => Err(TutorError::not_found(format!("session {session_id}"))),
        }
    }

    /// 设置 end_time、追加告别语、持久化并移出活跃集合
    async fn finish(&self, session: &mut TutoringSession) -> Result<TutoringMessage> {
        let now = Utc::now();
        let message_count = session.messages().len();
        let elapsed = session.elapsed_minutes(now);

        let text = farewell_message(&session.subject, session.personality, elapsed, message_count);
        let text = self.dispatcher.localize(&text, &session.language).await;
        let farewell = TutoringMessage::tutor(text).with_metadata(json!({
            "responseType": "farewell",
            "durationMinutes": elapsed,
            "messageCount": message_count,
        }));

        let mut ended = session.clone();
        ended.end(now);
        ended.push_message(farewell.clone());
        self.persist(&ended).await?;
        *session = ended;
        self.store.remove(&session.id).await;
        self.events.publish_message(&session.id, &farewell);

        tracing::info!(
            "Ended session {} after {} minutes and {} messages",
            session.id,
            elapsed,
            message_count
        );
        Ok(farewell)
    }

    /// 回放发送：学习者消息已存在，只生成并追加回复
    async fn replay_send(&self, session_id: &str, message_id: &str, request_type: Option<RequestType>) -> Result<()> {
        let handle = self.live_handle(session_id).await?;
        let mut session = handle.lock().await;
        if !session.is_active() {
            return Err(TutorError::invalid_state(session_id));
        }

        let learner = session
            .message(message_id)
            .cloned()
            .ok_or_else(|| TutorError::not_found(format!("message {message_id} in {session_id}")))?;

        let already_replied = session
            .messages()
            .iter()
            .any(|m| m.is_from_tutor && reply_to(m) == Some(message_id));
        if already_replied {
            tracing::debug!("Message {} already answered, skipping replay", message_id);
            return Ok(());
        }

        let request_type = request_type
            .or(learner.request_type)
            .unwrap_or_else(|| self.classifier.classify(&learner.content));
        let mut reply = self.dispatcher.dispatch(&session, &learner, request_type).await;
        if let Some(serde_json::Value::Object(meta)) = reply.metadata.as_mut() {
            meta.insert("replyTo".to_string(), json!(message_id));
        }

        session.push_message(reply.clone());
        self.persist(&session).await?;
        self.events.publish_message(session_id, &reply);
        tracing::info!("Replayed message {} for session {}", message_id, session_id);
        Ok(())
    }

    async fn replay_end(&self, session_id: &str) -> Result<()> {
        let handle = self.live_handle(session_id).await?;
        let mut session = handle.lock().await;
        if !session.is_active() {
            return Err(TutorError::invalid_state(session_id));
        }
        self.finish(&mut session).await.map(|_| ())
    }

    async fn persist(&self, session: &TutoringSession) -> Result<()> {
        persistence::save(self.persistence.as_ref(), SESSIONS_COLLECTION, &session.id, session).await
    }
}

fn reply_to(message: &TutoringMessage) -> Option<&str> {
    message
        .metadata
        .as_ref()
        .and_then(|m| m.get("replyTo"))
        .and_then(|v| v.as_str())
}

#[async_trait]
impl OperationApplier for SessionManager {
    async fn apply(&self, operation: &OfflineOperation) -> Result<()> {
        match &operation.kind {
            OperationKind::SendMessage {
                message_id,
                request_type,
                ..
            } => self.replay_send(&operation.session_id, message_id, *request_type).await,
            OperationKind::EndSession => self.replay_end(&operation.session_id).await,
        }
    }
}
