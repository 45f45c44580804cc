//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TUTOR__*` 覆盖（双下划线表示嵌套，如 `TUTOR__OFFLINE__MAX_QUEUE_LEN=100`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub tutor: TutorSection,
    #[serde(default)]
    pub offline: OfflineSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub planner: PlannerSection,
    #[serde(default)]
    pub events: EventsSection,
}

/// [app] 段：应用名、数据目录、随机种子
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// JSON 持久化目录，未设置时用 ./data
    pub data_dir: Option<PathBuf>,
    /// 固定随机种子（测试/复现用）；未设置时使用系统熵，保留学习计划与抽题的多样性
    pub random_seed: Option<u64>,
}

impl AppSection {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data"))
    }
}

/// [tutor] 段：回复生成超时、默认语言、练习题数量
#[derive(Debug, Clone, Deserialize)]
pub struct TutorSection {
    /// 单次回复生成超时（秒），超时按生成失败处理
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// 练习题类回复中附带的题目数
    #[serde(default = "default_practice_questions_per_reply")]
    pub practice_questions_per_reply: usize,
    #[serde(default = "default_grade_level")]
    pub default_grade_level: u8,
}

impl Default for TutorSection {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout_secs(),
            default_language: default_language(),
            practice_questions_per_reply: default_practice_questions_per_reply(),
            default_grade_level: default_grade_level(),
        }
    }
}

fn default_generation_timeout_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

fn default_practice_questions_per_reply() -> usize {
    3
}

fn default_grade_level() -> u8 {
    8
}

/// 离线队列溢出策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 拒绝新操作（QueueFull）
    #[default]
    RejectNew,
    /// 丢弃队首最旧的操作
    DropOldest,
}

/// [offline] 段：离线队列上限与溢出策略
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineSection {
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for OfflineSection {
    fn default() -> Self {
        Self {
            max_queue_len: default_max_queue_len(),
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

fn default_max_queue_len() -> usize {
    500
}

/// [cache] 段：练习题缓存容量（按科目）
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_max_questions_per_subject")]
    pub max_questions_per_subject: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_questions_per_subject: default_max_questions_per_subject(),
        }
    }
}

fn default_max_questions_per_subject() -> usize {
    200
}

/// [planner] 段：第一块的开始时间与可选的每日块数上限
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    /// 每天最多安排的 1 小时学习块；不设置时排到 23:00 为止
    #[serde(default)]
    pub max_sessions_per_day: Option<u32>,
    #[serde(default = "default_first_session_hour")]
    pub first_session_hour: u32,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_sessions_per_day: None,
            first_session_hour: default_first_session_hour(),
        }
    }
}

fn default_first_session_hour() -> u32 {
    16
}

/// [events] 段：广播通道容量
#[derive(Debug, Clone, Deserialize)]
pub struct EventsSection {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

/// 从 config 目录加载配置，环境变量 TUTOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TUTOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TUTOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
