//! 练习题缓存
//!
//! 按科目缓存已生成的题目，按 (topic, difficulty) 过滤；存量足够时随机抽样（不放回），
//! 否则按模板生成新题并追加。每个科目有容量上限：命中的题目移到队尾，超限时从队首淘汰（近似 LRU）。

use std::collections::{HashMap, HashSet, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Mutex;

use super::{Difficulty, PracticeQuestion};
use crate::core::{Result, TutorError};

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 完全由缓存满足的请求数
    pub hits: u64,
    /// 需要生成新题的请求数
    pub misses: u64,
    /// 累计生成的题目数
    pub generated: u64,
    pub evicted: u64,
}

struct Inner {
    /// 科目（小写） -> 题目，队首最久未用
    subjects: HashMap<String, VecDeque<PracticeQuestion>>,
    rng: StdRng,
    stats: CacheStats,
}

pub struct PracticeQuestionCache {
    inner: Mutex<Inner>,
    max_per_subject: usize,
}

impl PracticeQuestionCache {
    pub fn new(rng: StdRng, max_per_subject: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subjects: HashMap::new(),
                rng,
                stats: CacheStats::default(),
            }),
            max_per_subject: max_per_subject.max(1),
        }
    }

    /// 获取 count 道练习题：缓存足够则抽样，否则生成 count 道新题并入缓存
    pub async fn generate_practice_questions(
        &self,
        subject: &str,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
        grade_level: u8,
    ) -> Result<Vec<PracticeQuestion>> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(TutorError::validation("subject must not be empty"));
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let topic = if topic.trim().is_empty() { subject } else { topic.trim() };
        let key = subject.to_lowercase();

        let mut guard = self.inner.lock().await;
        let Inner { subjects, rng, stats } = &mut *guard;
        let pool = subjects.entry(key).or_default();

        let mut matching: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, q)| q.difficulty == difficulty && q.topic.eq_ignore_ascii_case(topic))
            .map(|(i, _)| i)
            .collect();

        if matching.len() >= count {
            matching.shuffle(rng);
            matching.truncate(count);
            let picked: Vec<PracticeQuestion> = matching.iter().map(|&i| pool[i].clone()).collect();

            // 命中的题目移到队尾
            let picked_ids: HashSet<String> = picked.iter().map(|q| q.id.clone()).collect();
            let (used, rest): (VecDeque<_>, VecDeque<_>) =
                pool.drain(..).partition(|q| picked_ids.contains(&q.id));
            pool.extend(rest);
            pool.extend(used);

            stats.hits += 1;
            tracing::debug!(
                "Practice cache hit: subject={}, topic={}, difficulty={}, count={}",
                subject,
                topic,
                difficulty,
                count
            );
            return Ok(picked);
        }

        stats.misses += 1;
        let mut fresh = Vec::with_capacity(count);
        for _ in 0..count {
            stats.generated += 1;
            let number = stats.generated;
            fresh.push(synthesize_question(
                rng,
                subject,
                topic,
                difficulty,
                grade_level,
                number,
            ));
        }
        pool.extend(fresh.iter().cloned());

        while pool.len() > self.max_per_subject {
            pool.pop_front();
            stats.evicted += 1;
        }

        tracing::debug!(
            "Generated {} practice questions: subject={}, topic={}, difficulty={}",
            count,
            subject,
            topic,
            difficulty
        );
        Ok(fresh)
    }

    /// 科目下缓存的题目数
    pub async fn cached_count(&self, subject: &str) -> usize {
        self.inner
            .lock()
            .await
            .subjects
            .get(&subject.trim().to_lowercase())
            .map(|p| p.len())
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.stats
    }
}

/// 模板出题：正确选项位置随机
fn synthesize_question(
    rng: &mut StdRng,
    subject: &str,
    topic: &str,
    difficulty: Difficulty,
    grade_level: u8,
    number: u64,
) -> PracticeQuestion {
    let correct = format!("It follows the core rule of {topic} as used in {subject}");
    let mut options = vec![
        format!("It is a common misconception about {topic}"),
        format!("It only applies outside of {subject}"),
        format!("It contradicts the definition of {topic}"),
    ];
    let correct_option_index = rng.gen_range(0..=options.len());
    options.insert(correct_option_index, correct);

    PracticeQuestion {
        id: format!("pq_{}", uuid::Uuid::new_v4()),
        subject: subject.to_string(),
        topic: topic.to_string(),
        question: format!(
            "[{subject}, grade {grade_level}, {difficulty}] Question {number}: Which statement about {topic} is correct?"
        ),
        options,
        correct_option_index,
        explanation: format!(
            "The correct option states the core rule of {topic}. The other options describe misconceptions that often come up in {subject}."
        ),
        difficulty,
        metadata: Some(serde_json::json!({ "gradeLevel": grade_level, "source": "template" })),
    }
}
