//! 辅导会话：数据模型、活跃会话存储与生命周期管理

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{SessionEndOutcome, SessionManager, StartSessionRequest, OFFLINE_PLACEHOLDER};
pub use store::{MemorySessionStore, SessionHandle, SessionStore};
pub use types::{
    LearningStyle, MessageId, RequestType, SessionId, TutorPersonality, TutoringMessage,
    TutoringSession,
};
