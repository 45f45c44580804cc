//! 学习计划：按科目小时数在日期区间内排程

mod scheduler;
mod types;

pub use scheduler::{schedule_sessions, ScheduleLimits, StudyPlanRequest, StudyPlanScheduler};
pub use types::{StudyPlan, StudySession};
