//! 会话存储抽象层
//!
//! 只保存「活跃」会话；每个会话包在独立的 Mutex 里，同一会话的多步操作由持锁方串行执行，
//! 不同会话互不阻塞。历史会话只能通过持久化协作方查询。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::types::{SessionId, TutoringSession};
use crate::core::{Result, TutorError};

/// 单个活跃会话的句柄（持锁即拥有该会话的本轮操作权）
pub type SessionHandle = Arc<Mutex<TutoringSession>>;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 放入新的活跃会话；ID 重复时报错
    async fn insert(&self, session: TutoringSession) -> Result<SessionHandle>;

    async fn get(&self, session_id: &str) -> Option<SessionHandle>;

    /// 移出活跃集合（会话结束后调用）
    async fn remove(&self, session_id: &str) -> Option<SessionHandle>;

    /// 用户的活跃会话，按开始时间从新到旧
    async fn user_sessions(&self, user_id: &str) -> Vec<SessionHandle>;

    async fn active_count(&self) -> usize;
}

struct Entry {
    handle: SessionHandle,
    user_id: String,
    start_time: DateTime<Utc>,
}

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    /// session_id -> 会话
    sessions: RwLock<HashMap<SessionId, Entry>>,
    /// user_id -> session_id 列表（插入顺序）
    user_sessions: RwLock<HashMap<String, Vec<SessionId>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: TutoringSession) -> Result<SessionHandle> {
        if !session.is_active() {
            return Err(TutorError::invalid_state(format!(
                "session {} has already ended",
                session.id
            )));
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(TutorError::validation(format!(
                "session {} already exists",
                session.id
            )));
        }

        let session_id = session.id.clone();
        let user_id = session.user_id.clone();
        let start_time = session.start_time;
        let handle = Arc::new(Mutex::new(session));

        sessions.insert(
            session_id.clone(),
            Entry {
                handle: Arc::clone(&handle),
                user_id: user_id.clone(),
                start_time,
            },
        );
        drop(sessions);

        self.user_sessions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(session_id);

        Ok(handle)
    }

    async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|e| Arc::clone(&e.handle))
    }

    async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        let entry = self.sessions.write().await.remove(session_id)?;

        let mut user_sessions = self.user_sessions.write().await;
        if let Some(ids) = user_sessions.get_mut(&entry.user_id) {
            ids.retain(|id| id != session_id);
            if ids.is_empty() {
                user_sessions.remove(&entry.user_id);
            }
        }

        Some(entry.handle)
    }

    async fn user_sessions(&self, user_id: &str) -> Vec<SessionHandle> {
        let ids = match self.user_sessions.read().await.get(user_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        let sessions = self.sessions.read().await;
        let mut entries: Vec<&Entry> = ids.iter().filter_map(|id| sessions.get(id)).collect();
        // 同一时刻开始的按插入顺序，后插入者视为更新
        entries.reverse();
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        entries.into_iter().map(|e| Arc::clone(&e.handle)).collect()
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LearningStyle, TutorPersonality};

    fn session(user: &str) -> TutoringSession {
        TutoringSession::new(
            user,
            "math",
            TutorPersonality::Encouraging,
            "en",
            LearningStyle::default(),
        )
    }

    #[tokio::test]
    async fn test_insert_get_remove() {
        let store = MemorySessionStore::new();
        let s = session("u1");
        let id = s.id.clone();

        store.insert(s).await.unwrap();
        assert_eq!(store.active_count().await, 1);
        assert!(store.get(&id).await.is_some());

        assert!(store.remove(&id).await.is_some());
        assert!(store.get(&id).await.is_none());
        assert!(store.user_sessions("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemorySessionStore::new();
        let s = session("u1");
        store.insert(s.clone()).await.unwrap();
        let err = store.insert(s).await.unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_ended_session_cannot_be_inserted() {
        let store = MemorySessionStore::new();
        let mut s = session("u1");
        s.end(Utc::now());
        assert!(matches!(
            store.insert(s).await.unwrap_err(),
            TutorError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_user_sessions_newest_first() {
        let store = MemorySessionStore::new();
        let mut older = session("u1");
        older.start_time = Utc::now() - chrono::Duration::hours(1);
        let older_id = older.id.clone();
        let newer = session("u1");
        let newer_id = newer.id.clone();

        store.insert(newer).await.unwrap();
        store.insert(older).await.unwrap();
        store.insert(session("u2")).await.unwrap();

        let handles = store.user_sessions("u1").await;
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].lock().await.id, newer_id);
        assert_eq!(handles[1].lock().await.id, older_id);
    }
}
