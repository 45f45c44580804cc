//! 离线同步集成测试：断网排队、联网回放、重启恢复

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::time::{sleep, Duration};
    use tokio_util::sync::CancellationToken;

    use tutor::config::AppConfig;
    use tutor::connectivity::ManualConnectivity;
    use tutor::core::StudyPlanEvent;
    use tutor::llm::{GenerationContext, MockResponseGenerator, ResponseGenerator};
    use tutor::offline::OfflineQueue;
    use tutor::planner::StudyPlanRequest;
    use tutor::session::{
        RequestType, SessionEndOutcome, StartSessionRequest, TutoringMessage, OFFLINE_PLACEHOLDER,
    };
    use tutor::tutor::APOLOGY_MESSAGE;
    use tutor::TutorEngine;

    /// 可切换成失败的生成协作方
    struct FlakyGenerator {
        failing: AtomicBool,
    }

    #[async_trait]
    impl ResponseGenerator for FlakyGenerator {
        async fn generate(
            &self,
            request_type: RequestType,
            ctx: &GenerationContext,
        ) -> Result<String, String> {
            if self.failing.load(Ordering::SeqCst) {
                return Err("backend unavailable".to_string());
            }
            MockResponseGenerator.generate(request_type, ctx).await
        }
    }

    async fn wait_until_drained(queue: &OfflineQueue) {
        for _ in 0..200 {
            if queue.is_empty().await {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("offline queue was not drained");
    }

    fn reply_to(message: &TutoringMessage) -> Option<&str> {
        message
            .metadata
            .as_ref()
            .and_then(|m| m.get("replyTo"))
            .and_then(|v| v.as_str())
    }

    #[tokio::test]
    async fn test_offline_round_trip_through_sync_worker() {
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let engine = TutorEngine::builder(AppConfig::default())
            .with_seed(42)
            .with_connectivity(connectivity.clone())
            .build();
        let token = CancellationToken::new();
        let worker = engine.spawn_sync_worker(token.clone());

        let session = engine
            .sessions
            .start_session(StartSessionRequest::new("learner", "math"))
            .await
            .unwrap();

        connectivity.set_online(false);
        for text in ["Explain fractions", "How do I solve 2x + 3 = 7?"] {
            let reply = engine
                .sessions
                .send_message(&session.id, text, None, None)
                .await
                .unwrap();
            assert_eq!(reply.content, OFFLINE_PLACEHOLDER);
        }
        let outcome = engine.sessions.end_session(&session.id).await.unwrap();
        assert!(matches!(outcome, SessionEndOutcome::Deferred(_)));
        assert_eq!(engine.queue.len().await, 3);

        connectivity.set_online(true);
        wait_until_drained(&engine.queue).await;

        let history = engine.sessions.session_history("learner").await.unwrap();
        assert_eq!(history.len(), 1);
        let stored = &history[0];
        assert!(!stored.is_active());

        let messages = stored.messages();
        // 欢迎语 + 2×(学习者 + 占位) + 2 条真实回复 + 告别语
        assert_eq!(messages.len(), 8);
        let learner_ids: Vec<&str> = messages
            .iter()
            .filter(|m| !m.is_from_tutor)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(learner_ids.len(), 2);
        assert_eq!(reply_to(&messages[5]), Some(learner_ids[0]));
        assert_eq!(reply_to(&messages[6]), Some(learner_ids[1]));
        assert_eq!(messages[5].request_type, Some(RequestType::ConceptExplanation));
        assert_eq!(messages[6].request_type, Some(RequestType::ProblemSolving));
        assert_eq!(messages[7].response_type(), Some("farewell"));

        token.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_generation_failure_during_replay_still_drains() {
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let generator = Arc::new(FlakyGenerator {
            failing: AtomicBool::new(true),
        });
        let engine = TutorEngine::builder(AppConfig::default())
            .with_seed(1)
            .with_connectivity(connectivity.clone())
            .with_generator(generator)
            .build();

        let session = engine
            .sessions
            .start_session(StartSessionRequest::new("learner", "science"))
            .await
            .unwrap();
        connectivity.set_online(false);
        engine
            .sessions
            .send_message(&session.id, "why is the sky blue?", None, None)
            .await
            .unwrap();
        connectivity.set_online(true);

        let report = engine.sessions.drain_offline_queue().await;
        assert!(report.is_complete());

        let snapshot = engine.sessions.get_session(&session.id).await.unwrap();
        let last = snapshot.messages().last().unwrap();
        assert_eq!(last.content, APOLOGY_MESSAGE);
        assert_eq!(last.response_type(), Some("error"));
    }

    #[tokio::test]
    async fn test_queue_and_sessions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.app.data_dir = Some(dir.path().to_path_buf());

        let session_id = {
            let connectivity = Arc::new(ManualConnectivity::new(true));
            let engine = TutorEngine::builder(config.clone())
                .with_file_persistence()
                .with_connectivity(connectivity.clone())
                .build();
            let session = engine
                .sessions
                .start_session(StartSessionRequest::new("learner", "english"))
                .await
                .unwrap();
            connectivity.set_online(false);
            engine
                .sessions
                .send_message(&session.id, "Define metaphor", None, None)
                .await
                .unwrap();
            session.id
        };

        let engine = TutorEngine::builder(config)
            .with_file_persistence()
            .with_connectivity(Arc::new(ManualConnectivity::new(true)))
            .build();
        let summary = engine.restore().await.unwrap();
        assert_eq!(summary.sessions, 1);
        assert_eq!(summary.queued_operations, 1);

        let report = engine.sessions.drain_offline_queue().await;
        assert_eq!(report.applied, 1);

        let snapshot = engine.sessions.get_session(&session_id).await.unwrap();
        let learners: Vec<_> = snapshot
            .messages()
            .iter()
            .filter(|m| m.content == "Define metaphor")
            .collect();
        assert_eq!(learners.len(), 1);
        assert_eq!(
            reply_to(snapshot.messages().last().unwrap()),
            Some(learners[0].id.as_str())
        );
    }

    #[tokio::test]
    async fn test_sessions_run_in_parallel() {
        let engine = Arc::new(TutorEngine::builder(AppConfig::default()).with_seed(3).build());

        let mut handles = Vec::new();
        for subject in ["math", "english", "science", "history"] {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let session = engine
                    .sessions
                    .start_session(StartSessionRequest::new(format!("user_{subject}"), subject))
                    .await
                    .unwrap();
                for i in 0..5 {
                    engine
                        .sessions
                        .send_message(&session.id, &format!("question {i} about {subject}"), None, None)
                        .await
                        .unwrap();
                }
                session.id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let snapshot = engine.sessions.get_session(&id).await.unwrap();
            assert_eq!(snapshot.messages().len(), 11);
        }
    }

    #[tokio::test]
    async fn test_study_plan_published_and_bounded() {
        let engine = TutorEngine::builder(AppConfig::default()).with_seed(11).build();
        let mut plans = engine.events.subscribe_plans();

        let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 9, 4).unwrap();
        let distribution: BTreeMap<String, u32> =
            [("math".to_string(), 4), ("english".to_string(), 2)].into();

        let plan = engine
            .planner
            .create_study_plan(StudyPlanRequest::new("learner", start, end, distribution))
            .await
            .unwrap();

        assert!(plan.sessions.len() <= 2 * 3);
        assert!(plan.sessions.iter().all(|s| plan.contains_date(s.scheduled_date)));
        let scheduled = plan.scheduled_hours();
        assert!(scheduled.get("math").copied().unwrap_or(0) <= 4);
        assert!(scheduled.get("english").copied().unwrap_or(0) <= 2);

        match plans.recv().await.unwrap() {
            StudyPlanEvent::Created { plan: published } => assert_eq!(published.id, plan.id),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
