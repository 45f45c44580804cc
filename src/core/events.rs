//! 事件总线：消息发布流与学习计划变更流
//!
//! 两条 broadcast 通道，订阅即拿到 Receiver，丢弃 Receiver 即退订；未订阅期间的事件不补发。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::planner::StudyPlan;
use crate::session::{SessionId, TutoringMessage};

/// 每条追加到会话的消息（学习者或导师）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub session_id: SessionId,
    pub message: TutoringMessage,
}

/// 学习计划创建/更新
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudyPlanEvent {
    Created { plan: StudyPlan },
    Updated { plan: StudyPlan },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    messages: broadcast::Sender<MessageEvent>,
    plans: broadcast::Sender<StudyPlanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (messages, _) = broadcast::channel(capacity);
        let (plans, _) = broadcast::channel(capacity);
        Self { messages, plans }
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MessageEvent> {
        self.messages.subscribe()
    }

    pub fn subscribe_plans(&self) -> broadcast::Receiver<StudyPlanEvent> {
        self.plans.subscribe()
    }

    /// 发布消息事件；没有订阅者时直接丢弃
    pub fn publish_message(&self, session_id: &str, message: &TutoringMessage) {
        let _ = self.messages.send(MessageEvent {
            session_id: session_id.to_string(),
            message: message.clone(),
        });
    }

    pub fn publish_plan(&self, event: StudyPlanEvent) {
        let _ = self.plans.send(event);
    }

    pub fn message_subscriber_count(&self) -> usize {
        self.messages.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe_messages();
        let mut b = bus.subscribe_messages();

        bus.publish_message("s1", &TutoringMessage::learner("hi"));

        assert_eq!(a.recv().await.unwrap().message.content, "hi");
        assert_eq!(b.recv().await.unwrap().session_id, "s1");
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new(8);
        let rx = bus.subscribe_messages();
        assert_eq!(bus.message_subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.message_subscriber_count(), 0);
        // 无订阅者时发布不报错
        bus.publish_message("s1", &TutoringMessage::tutor("nobody listening"));
    }
}
