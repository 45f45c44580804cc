//! Tutor - 辅导会话与离线同步引擎
//!
//! 入口：初始化日志、加载配置、组装引擎，运行逐行读取的控制台循环。

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Days, NaiveDate, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use tutor::config::load_config;
use tutor::connectivity::ManualConnectivity;
use tutor::planner::StudyPlanRequest;
use tutor::practice::Difficulty;
use tutor::session::{SessionEndOutcome, StartSessionRequest};
use tutor::TutorEngine;

const HELP: &str = "Commands: /start <subject>, /end, /offline, /online, /queue, /discard <op>, \
/plan <days> <subject=hours,...>, /practice <topic> <n>, /quit. Anything else is sent as a message.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tutor::observability::init();

    let config = load_config(None).context("Failed to load config")?;
    let user_id = std::env::var("TUTOR_USER").unwrap_or_else(|_| "local_user".to_string());

    let connectivity = Arc::new(ManualConnectivity::new(true));
    let engine = TutorEngine::builder(config)
        .with_file_persistence()
        .with_connectivity(connectivity.clone())
        .build();
    let summary = engine.restore().await.context("Failed to restore state")?;
    tracing::info!(
        "Restored {} sessions, {} plans, {} queued operations",
        summary.sessions,
        summary.plans,
        summary.queued_operations
    );

    let token = CancellationToken::new();
    let worker = engine.spawn_sync_worker(token.clone());

    let mut current = engine
        .sessions
        .get_active_session(&user_id)
        .await
        .map(|s| s.id);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = handle_line(&engine, &connectivity, &user_id, &mut current, line).await {
            println!("error: {e:#}");
        }
    }

    token.cancel();
    worker.await.context("Sync worker panicked")?;
    Ok(())
}

async fn handle_line(
    engine: &TutorEngine,
    connectivity: &ManualConnectivity,
    user_id: &str,
    current: &mut Option<String>,
    line: &str,
) -> anyhow::Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "/start" => {
            let session = engine
                .sessions
                .start_session(StartSessionRequest::new(user_id, rest))
                .await?;
            if let Some(welcome) = session.messages().last() {
                println!("tutor> {}", welcome.content);
            }
            *current = Some(session.id);
        }
        "/end" => {
            let id = current.take().context("No active session, use /start <subject>")?;
            match engine.sessions.end_session(&id).await? {
                SessionEndOutcome::Ended(farewell) => println!("tutor> {}", farewell.content),
                SessionEndOutcome::Deferred(op) => println!("(offline) end queued as {op}"),
            }
        }
        "/offline" => connectivity.set_online(false),
        "/online" => connectivity.set_online(true),
        "/queue" => {
            let pending = engine.queue.pending().await;
            println!("{} queued operation(s)", pending.len());
            for op in pending {
                println!("  {} {} {}", op.id, op.kind_name(), op.session_id);
            }
        }
        "/discard" => {
            let op = engine.sessions.discard_offline_operation(rest).await?;
            println!("discarded {} {}", op.kind_name(), op.id);
        }
        "/plan" => {
            let (days, distribution) = parse_plan_args(rest)?;
            let (start, end) = plan_range(Utc::now().date_naive(), days)?;
            let plan = engine
                .planner
                .create_study_plan(StudyPlanRequest::new(user_id, start, end, distribution))
                .await?;
            println!("{} ({} sessions)", plan.title, plan.sessions.len());
            for s in &plan.sessions {
                println!(
                    "  {} {}-{} {}",
                    s.scheduled_date, s.start_time, s.end_time, s.title
                );
            }
            for (subject, hours) in plan.unscheduled_hours() {
                println!("  unscheduled: {subject} {hours}h");
            }
        }
        "/practice" => {
            let id = current.as_deref().context("No active session, use /start <subject>")?;
            let session = engine
                .sessions
                .get_session(id)
                .await
                .context("Session is no longer active")?;
            let (topic, count) = rest.rsplit_once(' ').unwrap_or((rest, "3"));
            let count: usize = count.parse().context("Count must be a number")?;
            let questions = engine
                .practice
                .generate_practice_questions(
                    &session.subject,
                    topic,
                    Difficulty::Medium,
                    count,
                    engine.config.tutor.default_grade_level,
                )
                .await?;
            for (i, q) in questions.iter().enumerate() {
                println!("{}\n", q.render(i + 1));
            }
        }
        _ if command.starts_with('/') => println!("{HELP}"),
        _ => {
            let id = current.as_deref().context("No active session, use /start <subject>")?;
            let reply = engine.sessions.send_message(id, line, None, None).await?;
            println!("tutor> {}", reply.content);
        }
    }
    Ok(())
}

/// "3 math=4,english=2" -> (3, {math: 4, english: 2})
fn parse_plan_args(args: &str) -> anyhow::Result<(u64, BTreeMap<String, u32>)> {
    let (days, pairs) = args
        .split_once(' ')
        .context("Usage: /plan <days> <subject=hours,...>")?;
    let days: u64 = days.parse().context("Days must be a number")?;
    if days < 1 {
        bail!("Days must be at least 1");
    }

    let mut distribution = BTreeMap::new();
    for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (subject, hours) = pair
            .split_once('=')
            .with_context(|| format!("Expected subject=hours, got '{pair}'"))?;
        let hours: u32 = hours
            .trim()
            .parse()
            .with_context(|| format!("Invalid hours for '{subject}'"))?;
        *distribution.entry(subject.trim().to_string()).or_insert(0) += hours;
    }
    Ok((days, distribution))
}

/// 从 start 起连续 days 天（含首尾）
fn plan_range(start: NaiveDate, days: u64) -> anyhow::Result<(NaiveDate, NaiveDate)> {
    let Some(end) = start.checked_add_days(Days::new(days.saturating_sub(1))) else {
        bail!("{days} days from {start} is past the last supported date");
    };
    Ok((start, end))
}
