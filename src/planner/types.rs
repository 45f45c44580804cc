//! 学习计划数据模型

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// 计划中的一个学习块（与辅导会话无关）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub id: String,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub subject: String,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
}

/// 学习计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    /// 含当天
    pub end_date: NaiveDate,
    pub title: String,
    pub description: String,
    pub sessions: Vec<StudySession>,
    /// 科目 -> 请求的小时数
    pub subject_distribution: BTreeMap<String, u32>,
    pub is_active: bool,
}

impl StudyPlan {
    /// 实际排入计划的小时数（每个学习块 1 小时）
    pub fn scheduled_hours(&self) -> BTreeMap<String, u32> {
        let mut hours = BTreeMap::new();
        for s in &self.sessions {
            *hours.entry(s.subject.clone()).or_insert(0) += 1;
        }
        hours
    }

    /// 请求了但没排进去的小时数（只列出非零项）
    pub fn unscheduled_hours(&self) -> BTreeMap<String, u32> {
        let scheduled = self.scheduled_hours();
        self.subject_distribution
            .iter()
            .filter_map(|(subject, requested)| {
                let got = scheduled.get(subject).copied().unwrap_or(0);
                let missing = requested.saturating_sub(got);
                (missing > 0).then(|| (subject.clone(), missing))
            })
            .collect()
    }

    pub fn is_fully_scheduled(&self) -> bool {
        self.unscheduled_hours().is_empty()
    }

    pub fn completion_ratio(&self) -> f32 {
        if self.sessions.is_empty() {
            return 0.0;
        }
        let done = self.sessions.iter().filter(|s| s.is_completed).count();
        done as f32 / self.sessions.len() as f32
    }

    pub fn session(&self, session_id: &str) -> Option<&StudySession> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub(crate) fn session_mut(&mut self, session_id: &str) -> Option<&mut StudySession> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}
