//! 离线操作队列
//!
//! 设备级单一 FIFO：断网时追加，联网后按入队顺序逐个回放。
//! 每次变更后整队列作为一个文档写入持久化，重启后 `restore()` 原样恢复。
//! 回放失败即停：失败的操作与其后所有操作都留在队列中。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{OfflineSection, OverflowPolicy};
use crate::core::{Result, TutorError};
use crate::persistence::{self, Persistence, OFFLINE_QUEUE_COLLECTION};
use crate::session::{MessageId, RequestType, SessionId, TutoringMessage};

/// 队列文档在集合中的 key
const QUEUE_KEY: &str = "pending";

/// 操作类型与负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    /// 回放时只生成回复；学习者消息已在离线时追加
    #[serde(rename_all = "camelCase")]
    SendMessage {
        message_id: MessageId,
        content: String,
        request_type: Option<RequestType>,
        metadata: Option<serde_json::Value>,
    },
    EndSession,
}

/// 排队中的操作（入队后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineOperation {
    pub id: String,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub enqueued_at: DateTime<Utc>,
}

impl OfflineOperation {
    fn new(session_id: &str, kind: OperationKind) -> Self {
        Self {
            id: format!("op_{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            kind,
            enqueued_at: Utc::now(),
        }
    }

    /// 为已乐观追加的学习者消息创建发送操作
    pub fn send_message(session_id: &str, learner: &TutoringMessage) -> Self {
        Self::new(
            session_id,
            OperationKind::SendMessage {
                message_id: learner.id.clone(),
                content: learner.content.clone(),
                request_type: learner.request_type,
                metadata: learner.metadata.clone(),
            },
        )
    }

    pub fn end_session(session_id: &str) -> Self {
        Self::new(session_id, OperationKind::EndSession)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            OperationKind::SendMessage { .. } => "send_message",
            OperationKind::EndSession => "end_session",
        }
    }
}

/// 回放入口（由会话管理器实现）
#[async_trait]
pub trait OperationApplier: Send + Sync {
    async fn apply(&self, operation: &OfflineOperation) -> Result<()>;
}

/// 回放停止处的失败信息
#[derive(Debug, Clone, PartialEq)]
pub struct DrainFailure {
    pub operation_id: String,
    pub error: TutorError,
}

/// 一次 drain 的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub applied: usize,
    pub remaining: usize,
    pub failure: Option<DrainFailure>,
}

impl DrainFailure {
    /// 操作本身无法回放（会话或消息已不存在、状态不对），重试也不会成功，只能丢弃
    pub fn needs_discard(&self) -> bool {
        self.error.is_caller_error()
    }
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.remaining == 0
    }
}

pub struct OfflineQueue {
    ops: Mutex<VecDeque<OfflineOperation>>,
    /// 串行化 drain
    drain_lock: Mutex<()>,
    max_len: usize,
    policy: OverflowPolicy,
    persistence: Arc<dyn Persistence>,
}

impl OfflineQueue {
    pub fn new(cfg: &OfflineSection, persistence: Arc<dyn Persistence>) -> Self {
        Self {
            ops: Mutex::new(VecDeque::new()),
            drain_lock: Mutex::new(()),
            max_len: cfg.max_queue_len.max(1),
            policy: cfg.overflow_policy,
            persistence,
        }
    }

    /// 从持久化恢复；返回恢复的操作数
    pub async fn restore(&self) -> Result<usize> {
        let stored: Option<Vec<OfflineOperation>> =
            persistence::load(self.persistence.as_ref(), OFFLINE_QUEUE_COLLECTION, QUEUE_KEY)
                .await?;
        let stored = stored.unwrap_or_default();
        let count = stored.len();
        *self.ops.lock().await = stored.into();
        if count > 0 {
            tracing::info!("Restored {} queued offline operations", count);
        }
        Ok(count)
    }

    /// 追加到队尾；持久化失败时回滚本次变更
    pub async fn enqueue(&self, operation: OfflineOperation) -> Result<()> {
        let mut ops = self.ops.lock().await;

        let mut evicted = None;
        if ops.len() >= self.max_len {
            match self.policy {
                OverflowPolicy::RejectNew => {
                    tracing::warn!(
                        "Offline queue full ({}), rejecting {} for session {}",
                        self.max_len,
                        operation.kind_name(),
                        operation.session_id
                    );
                    return Err(TutorError::QueueFull(self.max_len));
                }
                OverflowPolicy::DropOldest => {
                    // 结束操作不淘汰：会话已标记 pending_end，丢掉它会话就再也结束不了
                    let Some(index) = ops
                        .iter()
                        .position(|op| matches!(op.kind, OperationKind::SendMessage { .. }))
                    else {
                        tracing::warn!(
                            "Offline queue full ({}) of end operations, rejecting {}",
                            self.max_len,
                            operation.kind_name()
                        );
                        return Err(TutorError::QueueFull(self.max_len));
                    };
                    if let Some(old) = ops.remove(index) {
                        tracing::warn!(
                            "Offline queue full ({}), dropping oldest message {} for session {}",
                            self.max_len,
                            old.id,
                            old.session_id
                        );
                        evicted = Some((index, old));
                    }
                }
            }
        }

        tracing::debug!(
            "Queued {} {} for session {}",
            operation.kind_name(),
            operation.id,
            operation.session_id
        );
        ops.push_back(operation);

        if let Err(e) = self.persist(&ops).await {
            ops.pop_back();
            if let Some((index, old)) = evicted {
                ops.insert(index, old);
            }
            return Err(e);
        }
        Ok(())
    }

    /// 从队首按序回放，成功一个移除一个；遇到失败即停
    pub async fn drain(&self, applier: &dyn OperationApplier) -> DrainReport {
        let _guard = self.drain_lock.lock().await;
        let mut report = DrainReport::default();

        loop {
            // 回放期间不持有队列锁，离线路径仍可入队
            let Some(head) = self.ops.lock().await.front().cloned() else {
                break;
            };

            match applier.apply(&head).await {
                Ok(()) => {
                    let mut ops = self.ops.lock().await;
                    if ops.front().map(|op| op.id == head.id).unwrap_or(false) {
                        ops.pop_front();
                    }
                    if let Err(e) = self.persist(&ops).await {
                        tracing::warn!("Failed to persist offline queue after replay: {}", e);
                    }
                    report.applied += 1;
                }
                Err(e) => {
                    // 回放期间被撤回或丢弃的队首不算失败
                    let still_head = self
                        .ops
                        .lock()
                        .await
                        .front()
                        .map(|op| op.id == head.id)
                        .unwrap_or(false);
                    if !still_head {
                        tracing::debug!("Operation {} left the queue during replay", head.id);
                        continue;
                    }
                    tracing::warn!(
                        "Replay of {} {} for session {} failed, halting drain: {}",
                        head.kind_name(),
                        head.id,
                        head.session_id,
                        e
                    );
                    report.failure = Some(DrainFailure {
                        operation_id: head.id,
                        error: e,
                    });
                    break;
                }
            }
        }

        report.remaining = self.ops.lock().await.len();
        if report.applied > 0 || report.failure.is_some() {
            tracing::info!(
                "Offline drain finished: {} applied, {} remaining",
                report.applied,
                report.remaining
            );
        }
        report
    }

    /// 显式丢弃某个操作（用于跳过无法回放的队首）
    pub async fn discard(&self, operation_id: &str) -> Result<OfflineOperation> {
        let mut ops = self.ops.lock().await;
        let index = ops
            .iter()
            .position(|op| op.id == operation_id)
            .ok_or_else(|| TutorError::not_found(format!("offline operation {operation_id}")))?;
        let removed = ops
            .remove(index)
            .ok_or_else(|| TutorError::not_found(format!("offline operation {operation_id}")))?;

        if let Err(e) = self.persist(&ops).await {
            ops.insert(index, removed);
            return Err(e);
        }
        tracing::info!("Discarded offline operation {}", operation_id);
        Ok(removed)
    }

    pub async fn pending(&self) -> Vec<OfflineOperation> {
        self.ops.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.ops.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ops.lock().await.is_empty()
    }

    /// 该会话是否还有未回放的操作
    pub async fn has_pending_for(&self, session_id: &str) -> bool {
        self.ops
            .lock()
            .await
            .iter()
            .any(|op| op.session_id == session_id)
    }

    async fn persist(&self, ops: &VecDeque<OfflineOperation>) -> Result<()> {
        persistence::save(
            self.persistence.as_ref(),
            OFFLINE_QUEUE_COLLECTION,
            QUEUE_KEY,
            ops,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use std::sync::Mutex as StdMutex;

    /// 记录回放顺序，按 id 注入失败
    #[derive(Default)]
    struct ScriptedApplier {
        fail_ids: Vec<String>,
        applied: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl OperationApplier for ScriptedApplier {
        async fn apply(&self, operation: &OfflineOperation) -> Result<()> {
            if self.fail_ids.contains(&operation.id) {
                return Err(TutorError::invalid_state(operation.session_id.clone()));
            }
            self.applied.lock().unwrap().push(operation.id.clone());
            Ok(())
        }
    }

    fn queue(max: usize, policy: OverflowPolicy) -> (OfflineQueue, Arc<InMemoryPersistence>) {
        let store = Arc::new(InMemoryPersistence::new());
        let cfg = OfflineSection {
            max_queue_len: max,
            overflow_policy: policy,
        };
        (OfflineQueue::new(&cfg, store.clone()), store)
    }

    fn send(session: &str, text: &str) -> OfflineOperation {
        OfflineOperation::send_message(session, &TutoringMessage::learner(text))
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order() {
        let (q, _) = queue(10, OverflowPolicy::RejectNew);
        let ops = vec![send("s1", "a"), send("s2", "b"), OfflineOperation::end_session("s1")];
        for op in &ops {
            q.enqueue(op.clone()).await.unwrap();
        }

        let applier = ScriptedApplier::default();
        let report = q.drain(&applier).await;

        assert_eq!(report.applied, 3);
        assert!(report.is_complete());
        let expected: Vec<_> = ops.iter().map(|o| o.id.clone()).collect();
        assert_eq!(*applier.applied.lock().unwrap(), expected);
        assert!(q.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_halts_on_first_failure() {
        let (q, _) = queue(10, OverflowPolicy::RejectNew);
        let first = send("s1", "one");
        let second = send("s1", "two");
        let third = send("s1", "three");
        for op in [&first, &second, &third] {
            q.enqueue(op.clone()).await.unwrap();
        }

        let applier = ScriptedApplier {
            fail_ids: vec![second.id.clone()],
            ..Default::default()
        };
        let report = q.drain(&applier).await;

        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 2);
        assert_eq!(report.failure.as_ref().unwrap().operation_id, second.id);
        assert!(report.failure.as_ref().unwrap().needs_discard());
        let left: Vec<_> = q.pending().await.into_iter().map(|o| o.id).collect();
        assert_eq!(left, vec![second.id.clone(), third.id.clone()]);

        // 丢弃坏掉的队首后可以继续
        q.discard(&second.id).await.unwrap();
        let report = q.drain(&applier).await;
        assert_eq!(report.applied, 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_reject_new_when_full() {
        let (q, _) = queue(2, OverflowPolicy::RejectNew);
        q.enqueue(send("s", "1")).await.unwrap();
        q.enqueue(send("s", "2")).await.unwrap();
        let err = q.enqueue(send("s", "3")).await.unwrap_err();
        assert_eq!(err, TutorError::QueueFull(2));
        assert_eq!(q.len().await, 2);
    }

    #[tokio::test]
    async fn test_drop_oldest_when_full() {
        let (q, _) = queue(2, OverflowPolicy::DropOldest);
        let a = send("s", "1");
        let b = send("s", "2");
        let c = send("s", "3");
        for op in [&a, &b, &c] {
            q.enqueue(op.clone()).await.unwrap();
        }
        let left: Vec<_> = q.pending().await.into_iter().map(|o| o.id).collect();
        assert_eq!(left, vec![b.id, c.id]);
    }

    #[tokio::test]
    async fn test_drop_oldest_never_evicts_end_operations() {
        let (q, _) = queue(2, OverflowPolicy::DropOldest);
        let end = OfflineOperation::end_session("s1");
        let a = send("s2", "1");
        let b = send("s2", "2");
        for op in [&end, &a, &b] {
            q.enqueue(op.clone()).await.unwrap();
        }
        let left: Vec<_> = q.pending().await.into_iter().map(|o| o.id).collect();
        assert_eq!(left, vec![end.id.clone(), b.id.clone()]);

        // 队列里只剩结束操作时拒绝新操作
        let (q, _) = queue(1, OverflowPolicy::DropOldest);
        q.enqueue(OfflineOperation::end_session("s1")).await.unwrap();
        let err = q.enqueue(send("s2", "late")).await.unwrap_err();
        assert_eq!(err, TutorError::QueueFull(1));
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn test_has_pending_for_session() {
        let (q, _) = queue(10, OverflowPolicy::RejectNew);
        let op = send("s1", "hi");
        q.enqueue(op.clone()).await.unwrap();
        assert!(q.has_pending_for("s1").await);
        assert!(!q.has_pending_for("s2").await);

        q.discard(&op.id).await.unwrap();
        assert!(!q.has_pending_for("s1").await);
    }

    #[tokio::test]
    async fn test_restore_keeps_order() {
        let (q, store) = queue(10, OverflowPolicy::RejectNew);
        let a = send("s", "1");
        let b = OfflineOperation::end_session("s");
        q.enqueue(a.clone()).await.unwrap();
        q.enqueue(b.clone()).await.unwrap();

        let restored = OfflineQueue::new(&OfflineSection::default(), store);
        assert_eq!(restored.restore().await.unwrap(), 2);
        assert_eq!(restored.pending().await, vec![a, b]);
    }

    #[tokio::test]
    async fn test_discard_unknown_is_not_found() {
        let (q, _) = queue(10, OverflowPolicy::RejectNew);
        let err = q.discard("op_missing").await.unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
    }

    #[test]
    fn test_operation_serialization_shape() {
        let op = send("s1", "hello");
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["kind"], "send_message");
        assert_eq!(v["sessionId"], "s1");
        assert_eq!(v["content"], "hello");
        assert!(v["messageId"].as_str().unwrap().starts_with("msg_"));
    }
}
