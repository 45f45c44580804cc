//! 引擎构建器：统一组装协作方、配置与各组件
//!
//! 未显式提供的协作方使用默认实现：内存持久化、始终在线、Mock 生成、占位翻译、内存会话存储。

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::connectivity::{Connectivity, ManualConnectivity};
use crate::core::{EventBus, Result};
use crate::llm::{MockResponseGenerator, ResponseGenerator};
use crate::offline::{OfflineQueue, SyncWorker};
use crate::persistence::{InMemoryPersistence, JsonFilePersistence, Persistence};
use crate::planner::StudyPlanScheduler;
use crate::practice::PracticeQuestionCache;
use crate::session::{MemorySessionStore, SessionManager, SessionStore};
use crate::tutor::{PlaceholderTranslator, ResponseDispatcher, Translator};

/// 引擎构建器
pub struct TutorEngineBuilder {
    config: AppConfig,
    persistence: Option<Arc<dyn Persistence>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    translator: Option<Arc<dyn Translator>>,
    session_store: Option<Arc<dyn SessionStore>>,
    seed: Option<u64>,
}

impl TutorEngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        let seed = config.app.random_seed;
        Self {
            config,
            persistence: None,
            connectivity: None,
            generator: None,
            translator: None,
            session_store: None,
            seed,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// 使用配置中的数据目录做 JSON 文件持久化
    pub fn with_file_persistence(self) -> Self {
        let dir = self.config.app.data_dir();
        tracing::info!("Using JSON file persistence under {}", dir.display());
        self.with_persistence(Arc::new(JsonFilePersistence::new(dir)))
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ResponseGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// 固定随机种子（覆盖配置中的 app.random_seed）
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> TutorEngine {
        let config = self.config;
        let persistence: Arc<dyn Persistence> = match self.persistence {
            Some(p) => p,
            None => Arc::new(InMemoryPersistence::new()),
        };
        let connectivity: Arc<dyn Connectivity> = match self.connectivity {
            Some(c) => c,
            None => Arc::new(ManualConnectivity::default()),
        };
        let generator: Arc<dyn ResponseGenerator> = match self.generator {
            Some(g) => g,
            None => Arc::new(MockResponseGenerator),
        };
        let translator: Arc<dyn Translator> = match self.translator {
            Some(t) => t,
            None => Arc::new(PlaceholderTranslator),
        };
        let store: Arc<dyn SessionStore> = match self.session_store {
            Some(s) => s,
            None => Arc::new(MemorySessionStore::new()),
        };

        // 缓存与排程各自持有独立的随机源，均由同一种子派生
        let mut root = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cache_rng = StdRng::seed_from_u64(root.next_u64());
        let planner_rng = StdRng::seed_from_u64(root.next_u64());

        let events = EventBus::new(config.events.channel_capacity);
        let practice = Arc::new(PracticeQuestionCache::new(
            cache_rng,
            config.cache.max_questions_per_subject,
        ));
        let dispatcher = Arc::new(ResponseDispatcher::new(
            generator,
            Arc::clone(&practice),
            translator,
            &config.tutor,
        ));
        let queue = Arc::new(OfflineQueue::new(&config.offline, Arc::clone(&persistence)));
        let sessions = Arc::new(SessionManager::new(
            store,
            dispatcher,
            Arc::clone(&queue),
            Arc::clone(&connectivity),
            Arc::clone(&persistence),
            events.clone(),
            config.tutor.default_language.clone(),
        ));
        let planner = Arc::new(StudyPlanScheduler::new(
            &config.planner,
            planner_rng,
            Arc::clone(&persistence),
            events.clone(),
        ));

        TutorEngine {
            config,
            events,
            sessions,
            planner,
            practice,
            queue,
            connectivity,
        }
    }
}

/// 启动恢复的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub sessions: usize,
    pub plans: usize,
    pub queued_operations: usize,
}

/// 组装完成的引擎；各组件可独立使用，也可整体共享
pub struct TutorEngine {
    pub config: AppConfig,
    pub events: EventBus,
    pub sessions: Arc<SessionManager>,
    pub planner: Arc<StudyPlanScheduler>,
    pub practice: Arc<PracticeQuestionCache>,
    pub queue: Arc<OfflineQueue>,
    pub connectivity: Arc<dyn Connectivity>,
}

impl TutorEngine {
    pub fn builder(config: AppConfig) -> TutorEngineBuilder {
        TutorEngineBuilder::new(config)
    }

    /// 从持久化恢复活跃会话、学习计划与离线队列
    pub async fn restore(&self) -> Result<RestoreSummary> {
        let sessions = self.sessions.restore_active_sessions().await?;
        let plans = self.planner.restore().await?;
        let queued_operations = self.queue.restore().await?;
        Ok(RestoreSummary {
            sessions,
            plans,
            queued_operations,
        })
    }

    /// 启动同步后台任务
    pub fn spawn_sync_worker(&self, token: CancellationToken) -> JoinHandle<()> {
        SyncWorker::new(
            Arc::clone(&self.connectivity),
            Arc::clone(&self.queue),
            self.sessions.clone(),
        )
        .spawn(token)
    }
}
