//! Tutor - 辅导会话与离线同步引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **connectivity**: 在线/离线状态协作方
//! - **core**: 错误类型、事件总线、引擎构建器
//! - **llm**: 回复生成协作方抽象与 Mock 实现
//! - **offline**: 离线操作队列与同步后台任务
//! - **persistence**: 持久化协作方（内存 / JSON 文件）
//! - **planner**: 学习计划排程
//! - **practice**: 练习题模型与按科目缓存
//! - **session**: 会话模型、活跃会话存储、生命周期管理
//! - **tutor**: 请求分类、回复分发、讲解模板、性格文案与翻译

pub mod config;
pub mod connectivity;
pub mod core;
pub mod llm;
pub mod observability;
pub mod offline;
pub mod persistence;
pub mod planner;
pub mod practice;
pub mod session;
pub mod tutor;

pub use crate::core::{EventBus, Result, TutorEngine, TutorEngineBuilder, TutorError};
