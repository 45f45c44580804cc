//! 核心层：错误类型、事件总线与引擎组装

pub mod builder;
pub mod error;
pub mod events;

pub use builder::{RestoreSummary, TutorEngine, TutorEngineBuilder};
pub use error::{Result, TutorError};
pub use events::{EventBus, MessageEvent, StudyPlanEvent};
