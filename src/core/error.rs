//! 引擎错误类型
//!
//! Validation / NotFound / InvalidState 直接返回给调用方；Generation 在分发器内部被吞掉并替换为致歉回复；
//! 离线延迟不是错误，见 `SessionEndOutcome::Deferred` 与离线占位回复。

use thiserror::Error;

/// 引擎对外暴露的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TutorError {
    /// 输入非法（空科目、结束日期早于开始日期等）
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 对已结束（或即将结束）的会话操作；展示给用户时即 "no active session"
    #[error("no active session: {0}")]
    InvalidState(String),

    /// 回复生成协作方失败或超时（仅在分发器内部流转）
    #[error("Generation failure: {0}")]
    Generation(String),

    /// 离线队列已满且溢出策略为拒绝
    #[error("Offline queue full ({0} pending operations)")]
    QueueFull(usize),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl TutorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// 是否为调用方输入/状态类错误（重放时遇到这类错误说明操作本身已失效）
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            TutorError::Validation(_) | TutorError::NotFound(_) | TutorError::InvalidState(_)
        )
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(e: serde_json::Error) -> Self {
        TutorError::Persistence(format!("serialization failed: {e}"))
    }
}

impl From<std::io::Error> for TutorError {
    fn from(e: std::io::Error) -> Self {
        TutorError::Persistence(e.to_string())
    }
}

impl From<config::ConfigError> for TutorError {
    fn from(e: config::ConfigError) -> Self {
        TutorError::Config(e.to_string())
    }
}

pub type Result<T, E = TutorError> = std::result::Result<T, E>;
