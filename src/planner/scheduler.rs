//! 学习计划排程
//!
//! 每天 ceil(总小时 / 天数) 个 1 小时学习块，从 first_session_hour 起顺排到 23:00 为止；
//! 每个块按剩余小时数加权随机抽取科目（等价于展开后打乱，但不展开）。
//! 天数不够时剩余小时不排，通过 unscheduled_hours() 暴露。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use super::types::{StudyPlan, StudySession};
use crate::config::PlannerSection;
use crate::core::{EventBus, Result, StudyPlanEvent, TutorError};
use crate::persistence::{self, Persistence, PLANS_COLLECTION};

/// 最晚的第一块开始时间（保证至少能排一块且不跨午夜）
const LATEST_FIRST_HOUR: u32 = 22;

/// 创建计划的请求
#[derive(Debug, Clone)]
pub struct StudyPlanRequest {
    pub user_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub subject_distribution: BTreeMap<String, u32>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl StudyPlanRequest {
    pub fn new(
        user_id: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        subject_distribution: BTreeMap<String, u32>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            start_date,
            end_date,
            subject_distribution,
            title: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// 排程参数
#[derive(Debug, Clone, Copy)]
pub struct ScheduleLimits {
    pub first_session_hour: u32,
    /// 可选的每日上限；None 时只受当天剩余时间限制
    pub max_sessions_per_day: Option<u32>,
}

impl From<&PlannerSection> for ScheduleLimits {
    fn from(cfg: &PlannerSection) -> Self {
        let first = if cfg.first_session_hour > LATEST_FIRST_HOUR {
            tracing::warn!(
                "planner.first_session_hour {} is too late, using {}",
                cfg.first_session_hour,
                LATEST_FIRST_HOUR
            );
            LATEST_FIRST_HOUR
        } else {
            cfg.first_session_hour
        };
        Self {
            first_session_hour: first,
            max_sessions_per_day: cfg.max_sessions_per_day.map(|cap| cap.max(1)),
        }
    }
}

impl ScheduleLimits {
    /// 当天能排的最多块数：最后一块在 23:00 前结束，配置了上限时再取较小者
    fn daily_cap(&self) -> u32 {
        let by_clock = 23 - self.first_session_hour;
        self.max_sessions_per_day
            .map_or(by_clock, |cap| cap.min(by_clock))
            .max(1)
    }
}

/// 按分布生成学习块（纯计算，随机源由调用方注入）
pub fn schedule_sessions(
    start_date: NaiveDate,
    end_date: NaiveDate,
    distribution: &BTreeMap<String, u32>,
    limits: ScheduleLimits,
    rng: &mut StdRng,
) -> Result<Vec<StudySession>> {
    if end_date < start_date {
        return Err(TutorError::validation(format!(
            "end date {end_date} is before start date {start_date}"
        )));
    }
    if distribution.keys().any(|s| s.trim().is_empty()) {
        return Err(TutorError::validation("subject names must not be empty"));
    }
    let total_hours: u64 = distribution.values().map(|h| u64::from(*h)).sum();
    if total_hours == 0 {
        return Err(TutorError::validation(
            "subject distribution must request at least one hour",
        ));
    }

    let total_days = (end_date - start_date).num_days() as u64 + 1;
    let needed = total_hours.div_ceil(total_days);
    let sessions_per_day = needed.min(u64::from(limits.daily_cap())) as u32;

    let mut remaining: Vec<(&str, u64)> = distribution
        .iter()
        .filter(|(_, hours)| **hours > 0)
        .map(|(subject, hours)| (subject.as_str(), u64::from(*hours)))
        .collect();
    let mut remaining_total = total_hours;

    let mut sessions = Vec::new();
    let mut day = start_date;
    'days: while day <= end_date {
        for index in 0..sessions_per_day {
            let Some(subject) = draw_subject(&mut remaining, &mut remaining_total, rng) else {
                break 'days;
            };
            let hour = limits.first_session_hour + index;
            let (Some(start_time), Some(end_time)) = (
                NaiveTime::from_hms_opt(hour, 0, 0),
                NaiveTime::from_hms_opt(hour + 1, 0, 0),
            ) else {
                break;
            };
            sessions.push(StudySession {
                id: format!("study_{}", uuid::Uuid::new_v4()),
                scheduled_date: day,
                start_time,
                end_time,
                subject: subject.to_string(),
                lesson_id: None,
                quiz_id: None,
                title: format!("{} Study Session", capitalize(subject)),
                description: format!("Focused one-hour study block for {subject}."),
                is_completed: false,
            });
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    if remaining_total > 0 {
        tracing::info!(
            "{} requested hours did not fit between {} and {}",
            remaining_total,
            start_date,
            end_date
        );
    }

    Ok(sessions)
}

/// 按剩余小时数加权抽取一个科目并扣减一小时
fn draw_subject<'a>(
    remaining: &mut [(&'a str, u64)],
    remaining_total: &mut u64,
    rng: &mut StdRng,
) -> Option<&'a str> {
    if *remaining_total == 0 {
        return None;
    }
    let mut pick = rng.gen_range(0..*remaining_total);
    for (subject, left) in remaining.iter_mut() {
        if pick < *left {
            *left -= 1;
            *remaining_total -= 1;
            return Some(*subject);
        }
        pick -= *left;
    }
    None
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 学习计划服务：创建、完成状态切换、查询；变更会持久化并发布事件
pub struct StudyPlanScheduler {
    plans: RwLock<HashMap<String, StudyPlan>>,
    rng: Mutex<StdRng>,
    limits: ScheduleLimits,
    persistence: Arc<dyn Persistence>,
    events: EventBus,
}

impl StudyPlanScheduler {
    pub fn new(
        cfg: &PlannerSection,
        rng: StdRng,
        persistence: Arc<dyn Persistence>,
        events: EventBus,
    ) -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
            rng: Mutex::new(rng),
            limits: ScheduleLimits::from(cfg),
            persistence,
            events,
        }
    }

    /// 从持久化恢复全部计划，返回恢复的数量
    pub async fn restore(&self) -> Result<usize> {
        let stored: Vec<StudyPlan> =
            persistence::load_all(self.persistence.as_ref(), PLANS_COLLECTION).await?;
        let mut plans = self.plans.write().await;
        let count = stored.len();
        for plan in stored {
            plans.insert(plan.id.clone(), plan);
        }
        if count > 0 {
            tracing::info!("Restored {} study plans", count);
        }
        Ok(count)
    }

    pub async fn create_study_plan(&self, request: StudyPlanRequest) -> Result<StudyPlan> {
        if request.user_id.trim().is_empty() {
            return Err(TutorError::validation("user id must not be empty"));
        }

        let sessions = {
            let mut rng = self.rng.lock().await;
            schedule_sessions(
                request.start_date,
                request.end_date,
                &request.subject_distribution,
                self.limits,
                &mut rng,
            )?
        };

        let subjects: Vec<&str> = request
            .subject_distribution
            .keys()
            .map(String::as_str)
            .collect();
        let plan = StudyPlan {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            user_id: request.user_id.clone(),
            created_at: Utc::now(),
            start_date: request.start_date,
            end_date: request.end_date,
            title: request.title.clone().unwrap_or_else(|| {
                format!("Study Plan {} - {}", request.start_date, request.end_date)
            }),
            description: request.description.clone().unwrap_or_else(|| {
                format!("Study plan covering {}", subjects.join(", "))
            }),
            sessions,
            subject_distribution: request.subject_distribution,
            is_active: true,
        };

        persistence::save(self.persistence.as_ref(), PLANS_COLLECTION, &plan.id, &plan).await?;
        self.plans
            .write()
            .await
            .insert(plan.id.clone(), plan.clone());

        tracing::info!(
            "Created study plan {} for {} with {} sessions",
            plan.id,
            plan.user_id,
            plan.sessions.len()
        );
        self.events
            .publish_plan(StudyPlanEvent::Created { plan: plan.clone() });
        Ok(plan)
    }

    /// 切换单个学习块的完成状态
    pub async fn update_session_completion(
        &self,
        plan_id: &str,
        session_id: &str,
        is_completed: bool,
    ) -> Result<StudyPlan> {
        self.update_plan(plan_id, |plan| {
            let session = plan.session_mut(session_id).ok_or_else(|| {
                TutorError::not_found(format!("study session {session_id} in plan {plan_id}"))
            })?;
            session.is_completed = is_completed;
            Ok(())
        })
        .await
    }

    pub async fn set_plan_active(&self, plan_id: &str, is_active: bool) -> Result<StudyPlan> {
        self.update_plan(plan_id, |plan| {
            plan.is_active = is_active;
            Ok(())
        })
        .await
    }

    async fn update_plan<F>(&self, plan_id: &str, f: F) -> Result<StudyPlan>
    where
        F: FnOnce(&mut StudyPlan) -> Result<()>,
    {
        let mut plans = self.plans.write().await;
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| TutorError::not_found(format!("study plan {plan_id}")))?;

        let mut updated = plan.clone();
        f(&mut updated)?;
        persistence::save(self.persistence.as_ref(), PLANS_COLLECTION, plan_id, &updated).await?;
        *plan = updated.clone();
        drop(plans);

        self.events
            .publish_plan(StudyPlanEvent::Updated { plan: updated.clone() });
        Ok(updated)
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<StudyPlan> {
        self.plans.read().await.get(plan_id).cloned()
    }

    /// 用户的计划，按创建时间从新到旧
    pub async fn plans_for_user(&self, user_id: &str) -> Vec<StudyPlan> {
        let mut plans: Vec<StudyPlan> = self
            .plans
            .read()
            .await
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryPersistence;
    use chrono::Duration;
    use rand::SeedableRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn distribution(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(s, h)| (s.to_string(), *h)).collect()
    }

    fn limits() -> ScheduleLimits {
        ScheduleLimits::from(&PlannerSection::default())
    }

    fn scheduler() -> (StudyPlanScheduler, Arc<InMemoryPersistence>, EventBus) {
        let store = Arc::new(InMemoryPersistence::new());
        let events = EventBus::new(16);
        let s = StudyPlanScheduler::new(
            &PlannerSection::default(),
            StdRng::seed_from_u64(9),
            store.clone(),
            events.clone(),
        );
        (s, store, events)
    }

    #[test]
    fn test_three_day_distribution() {
        let mut rng = StdRng::seed_from_u64(1);
        let dist = distribution(&[("math", 4), ("english", 2)]);
        let start = date(2024, 3, 1);
        let end = date(2024, 3, 3);

        let sessions = schedule_sessions(start, end, &dist, limits(), &mut rng).unwrap();

        // ceil(6 / 3) = 2 per day
        assert!(sessions.len() <= 2 * 3);
        assert_eq!(sessions.len(), 6);
        assert!(sessions
            .iter()
            .all(|s| s.scheduled_date >= start && s.scheduled_date <= end));
        let math = sessions.iter().filter(|s| s.subject == "math").count();
        let english = sessions.iter().filter(|s| s.subject == "english").count();
        assert!(math <= 4);
        assert!(english <= 2);
    }

    #[test]
    fn test_sessions_stack_from_four_pm() {
        let mut rng = StdRng::seed_from_u64(2);
        let dist = distribution(&[("math", 3)]);
        let day = date(2024, 5, 10);
        let sessions = schedule_sessions(day, day, &dist, limits(), &mut rng).unwrap();

        let starts: Vec<_> = sessions.iter().map(|s| s.start_time).collect();
        assert_eq!(
            starts,
            vec![
                NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            ]
        );
        assert!(sessions
            .iter()
            .all(|s| s.end_time - s.start_time == Duration::hours(1)));
        assert_eq!(sessions[0].title, "Math Study Session");
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = schedule_sessions(
            date(2024, 3, 5),
            date(2024, 3, 1),
            &distribution(&[("math", 1)]),
            limits(),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, TutorError::Validation(_)));
    }

    #[test]
    fn test_short_range_drops_tail_and_reports_it() {
        let mut rng = StdRng::seed_from_u64(4);
        let dist = distribution(&[("math", 10), ("art", 10)]);
        let day = date(2024, 1, 1);
        let sessions = schedule_sessions(day, day, &dist, limits(), &mut rng).unwrap();
        assert_eq!(sessions.len() as u32, limits().daily_cap());
        assert!(sessions.len() < 20);
    }

    #[test]
    fn test_one_day_fills_until_eleven_pm() {
        let mut rng = StdRng::seed_from_u64(5);
        let day = date(2024, 6, 1);
        let sessions =
            schedule_sessions(day, day, &distribution(&[("math", 7)]), limits(), &mut rng).unwrap();

        assert_eq!(sessions.len(), 7);
        assert_eq!(
            sessions.last().map(|s| s.end_time),
            NaiveTime::from_hms_opt(23, 0, 0)
        );
    }

    #[test]
    fn test_configured_daily_cap_applies() {
        let mut rng = StdRng::seed_from_u64(5);
        let day = date(2024, 6, 1);
        let capped = ScheduleLimits {
            first_session_hour: 16,
            max_sessions_per_day: Some(3),
        };
        let sessions =
            schedule_sessions(day, day, &distribution(&[("math", 7)]), capped, &mut rng).unwrap();
        assert_eq!(sessions.len(), 3);
    }

    #[test]
    fn test_huge_hour_counts_do_not_overflow() {
        let mut rng = StdRng::seed_from_u64(6);
        let day = date(2024, 6, 1);
        let dist = distribution(&[("math", u32::MAX), ("art", 1)]);
        let sessions = schedule_sessions(day, day, &dist, limits(), &mut rng).unwrap();
        assert_eq!(sessions.len() as u32, limits().daily_cap());
    }

    #[test]
    fn test_range_ending_on_last_date() {
        let mut rng = StdRng::seed_from_u64(8);
        let sessions = schedule_sessions(
            NaiveDate::MAX,
            NaiveDate::MAX,
            &distribution(&[("math", 2)]),
            limits(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let dist = distribution(&[("math", 3), ("english", 3), ("science", 2)]);
        let start = date(2024, 2, 1);
        let end = date(2024, 2, 4);
        let a = schedule_sessions(start, end, &dist, limits(), &mut StdRng::seed_from_u64(7)).unwrap();
        let b = schedule_sessions(start, end, &dist, limits(), &mut StdRng::seed_from_u64(7)).unwrap();
        let subjects_a: Vec<_> = a.iter().map(|s| (s.scheduled_date, s.subject.clone())).collect();
        let subjects_b: Vec<_> = b.iter().map(|s| (s.scheduled_date, s.subject.clone())).collect();
        assert_eq!(subjects_a, subjects_b);
    }

    #[tokio::test]
    async fn test_create_plan_persists_and_publishes() {
        let (scheduler, store, events) = scheduler();
        let mut rx = events.subscribe_plans();

        let plan = scheduler
            .create_study_plan(StudyPlanRequest::new(
                "u1",
                date(2024, 3, 1),
                date(2024, 3, 3),
                distribution(&[("math", 4), ("english", 2)]),
            ))
            .await
            .unwrap();

        assert!(plan.is_active);
        assert!(plan.is_fully_scheduled());
        assert_eq!(plan.scheduled_hours(), distribution(&[("math", 4), ("english", 2)]));
        assert_eq!(store.len(PLANS_COLLECTION).await, 1);
        assert!(matches!(rx.recv().await.unwrap(), StudyPlanEvent::Created { .. }));
    }

    #[tokio::test]
    async fn test_unscheduled_hours_exposed_on_plan() {
        let (scheduler, _, _) = scheduler();
        let day = date(2024, 3, 1);
        let plan = scheduler
            .create_study_plan(StudyPlanRequest::new(
                "u1",
                day,
                day,
                distribution(&[("math", 20)]),
            ))
            .await
            .unwrap();
        let missing = plan.unscheduled_hours();
        assert_eq!(missing.get("math").copied(), Some(20 - plan.sessions.len() as u32));
        assert!(!plan.is_fully_scheduled());
    }

    #[tokio::test]
    async fn test_update_session_completion() {
        let (scheduler, _, events) = scheduler();
        let plan = scheduler
            .create_study_plan(StudyPlanRequest::new(
                "u1",
                date(2024, 3, 1),
                date(2024, 3, 2),
                distribution(&[("math", 2)]),
            ))
            .await
            .unwrap();
        let mut rx = events.subscribe_plans();
        let session_id = plan.sessions[0].id.clone();

        let updated = scheduler
            .update_session_completion(&plan.id, &session_id, true)
            .await
            .unwrap();
        assert!(updated.session(&session_id).unwrap().is_completed);
        assert!((updated.completion_ratio() - 0.5).abs() < f32::EPSILON);
        assert!(matches!(rx.recv().await.unwrap(), StudyPlanEvent::Updated { .. }));

        let err = scheduler
            .update_session_completion(&plan.id, "missing", true)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
        let err = scheduler
            .update_session_completion("missing", &session_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_from_persistence() {
        let (scheduler, store, _) = scheduler();
        let plan = scheduler
            .create_study_plan(StudyPlanRequest::new(
                "u1",
                date(2024, 3, 1),
                date(2024, 3, 2),
                distribution(&[("math", 2)]),
            ))
            .await
            .unwrap();

        let fresh = StudyPlanScheduler::new(
            &PlannerSection::default(),
            StdRng::seed_from_u64(1),
            store,
            EventBus::new(4),
        );
        assert_eq!(fresh.restore().await.unwrap(), 1);
        assert_eq!(fresh.get_plan(&plan.id).await, Some(plan));
        assert_eq!(fresh.plans_for_user("u1").await.len(), 1);
    }
}
