//! End-to-end cycle scenarios.
//!
//! Each test seeds a fresh in-memory store, runs one or more cycles through
//! the orchestrator with mock strategies, and inspects the outcome plus
//! what was persisted.

use chrono::{Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tradecycle::analysis::AnalysisError;
use tradecycle::config::{AlertsConfig, RetentionConfig};
use tradecycle::engine::analysis_loop::LoopConfig;
use tradecycle::engine::lock::{LockAttempt, LockInfo, RunLock};
use tradecycle::engine::{CycleOutcome, CycleReport, Orchestrator, OrchestratorConfig};
use tradecycle::storage::{LogSink, NotificationSink, SqliteStore};
use tradecycle::strategy::StrategyVariant;
use tradecycle::types::*;

use crate::mock_strategy::{CountingPacer, MockFactory, ScriptedAnalyzer};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn live(spot: bool, futures: bool) -> OperationalSettings {
    OperationalSettings {
        trading_enabled: true,
        ai_enabled: true,
        emergency_stop: false,
        spot_trading_enabled: spot,
        futures_trading_enabled: futures,
        ..OperationalSettings::default()
    }
}

async fn seeded_store(
    settings: Option<OperationalSettings>,
    instruments: &[(&str, TradingType)],
) -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().await.unwrap();
    if let Some(settings) = settings {
        store.save_settings(&settings).await.unwrap();
    }
    for (symbol, trading_type) in instruments {
        store
            .add_instrument(&TradableInstrument::new(*symbol, *trading_type, true))
            .await
            .unwrap();
    }
    Arc::new(store)
}

fn temp_lock_file() -> PathBuf {
    std::env::temp_dir()
        .join(format!("tradecycle-it-{}", uuid::Uuid::new_v4()))
        .join("cycle.lock")
}

fn config(lock_file: PathBuf) -> OrchestratorConfig {
    OrchestratorConfig {
        require_ai: true,
        try_enhanced: true,
        analysis: LoopConfig {
            max_pairs: 10,
            slow_after: Duration::from_secs(30),
        },
        alerts: AlertsConfig::default(),
        retention: RetentionConfig::default(),
        lock_file,
        lock_stale_after: Duration::from_secs(3600),
    }
}

struct Harness {
    store: Arc<SqliteStore>,
    orchestrator: Orchestrator<SqliteStore>,
    pacer: CountingPacer,
    lock_file: PathBuf,
}

fn harness(store: Arc<SqliteStore>, factory: MockFactory) -> Harness {
    harness_with(store, factory, |_| {})
}

fn harness_with(
    store: Arc<SqliteStore>,
    factory: MockFactory,
    tweak: impl FnOnce(&mut OrchestratorConfig),
) -> Harness {
    let lock_file = temp_lock_file();
    let mut cfg = config(lock_file.clone());
    tweak(&mut cfg);
    let pacer = CountingPacer::default();
    let orchestrator = Orchestrator::new(
        store.clone(),
        Box::new(factory),
        Box::new(pacer.clone()),
        cfg,
    );
    Harness {
        store,
        orchestrator,
        pacer,
        lock_file,
    }
}

/// The next cycle could take the run lock.
fn assert_lock_released(path: &Path) {
    match RunLock::acquire(path, "next-cycle").unwrap() {
        LockAttempt::Acquired(_) => {}
        LockAttempt::Held(holder) => panic!("run lock still held by {holder:?}"),
    }
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped(reason) => panic!("cycle unexpectedly skipped: {reason}"),
    }
}

async fn priorities(store: &SqliteStore) -> Vec<Priority> {
    store
        .notifications()
        .await
        .unwrap()
        .into_iter()
        .map(|(_, n)| n.priority)
        .collect()
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_emergency_stop_skips_everything() {
    let settings = OperationalSettings {
        emergency_stop: true,
        ..live(true, true)
    };
    let store = seeded_store(Some(settings), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let factory = MockFactory::new(analyzer.clone());
    let builds = factory.enhanced_builds.clone();
    let runs = factory.runs.clone();
    let h = harness(store, factory);

    let outcome = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::EmergencyStop));
    assert_eq!(outcome.exit_code(), 0);
    assert!(analyzer.calls().is_empty());
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!h.lock_file.exists());

    let logs = h.store.log_entries().await.unwrap();
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Warning && e.category == "SCHEDULER"));
}

#[tokio::test]
async fn test_trading_disabled_skips() {
    let settings = OperationalSettings {
        trading_enabled: false,
        ..live(true, true)
    };
    let store = seeded_store(Some(settings), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let outcome = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::TradingDisabled));
    assert_eq!(outcome.exit_code(), 0);
    assert!(analyzer.calls().is_empty());
    assert_eq!(h.pacer.pauses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ai_disabled_skips_when_required() {
    let settings = OperationalSettings {
        ai_enabled: false,
        ..live(true, false)
    };
    let store = seeded_store(Some(settings), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let outcome = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::AiDisabled));
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_ai_disabled_runs_strategy_only_when_not_required() {
    let settings = OperationalSettings {
        ai_enabled: false,
        ..live(true, false)
    };
    let store = seeded_store(Some(settings), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let factory = MockFactory::new(analyzer.clone());
    let runs = factory.runs.clone();
    let h = harness_with(store, factory, |cfg| cfg.require_ai = false);

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert!(report.analysis.is_none());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_missing_settings_is_fatal() {
    let store = seeded_store(None, &[]).await;
    let h = harness(store, MockFactory::new(ScriptedAnalyzer::new()));

    let err = h.orchestrator.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::Configuration(_)));
    assert_eq!(err.exit_code(), 1);
}

// ---------------------------------------------------------------------------
// Analysis loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cap_analyzes_first_ten_in_order() {
    let symbols: Vec<String> = (0..14).map(|i| format!("PAIR{i:02}USDT")).collect();
    let seed: Vec<(&str, TradingType)> = symbols
        .iter()
        .map(|s| (s.as_str(), TradingType::Spot))
        .collect();
    let store = seeded_store(Some(live(true, false)), &seed).await;
    let analyzer = ScriptedAnalyzer::new();
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(analyzer.calls(), symbols[..10].to_vec());

    let analysis = report.analysis.unwrap();
    assert_eq!(analysis.eligible, 14);
    assert_eq!(analysis.analyzed, 10);
    assert!(analysis.cap_reached);
    assert_eq!(h.pacer.pauses.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_spot_never_analyzed_when_spot_disabled() {
    let store = seeded_store(
        Some(live(false, true)),
        &[
            ("BTCUSDT", TradingType::Spot),
            ("ETHUSDT", TradingType::Futures),
            ("SOLUSDT", TradingType::Both),
        ],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    let h = harness(store, MockFactory::new(analyzer.clone()));

    completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(analyzer.calls(), vec!["ETHUSDT", "SOLUSDT"]);
}

#[tokio::test]
async fn test_notification_priority_by_confidence() {
    let store = seeded_store(
        Some(live(true, false)),
        &[
            ("AAAUSDT", TradingType::Spot),
            ("BBBUSDT", TradingType::Spot),
            ("CCCUSDT", TradingType::Spot),
        ],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    analyzer.answer("AAAUSDT", Signal::Buy, 0.85);
    analyzer.answer("BBBUSDT", Signal::StrongSell, 0.95);
    analyzer.answer("CCCUSDT", Signal::Hold, 0.5);
    let h = harness(store, MockFactory::new(analyzer));

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(report.analysis.unwrap().alerts.created, 2);

    let notifications = h.store.notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].1.priority, Priority::Normal);
    assert!(notifications[0].1.title.contains("AAAUSDT"));
    assert_eq!(notifications[1].1.priority, Priority::High);
    assert!(notifications[1].1.title.contains("BBBUSDT"));
    assert!(notifications
        .iter()
        .all(|(_, n)| n.kind == NotificationKind::Signal && n.category == NotificationCategory::Ai));
}

#[tokio::test]
async fn test_timeout_skips_item_and_continues() {
    let store = seeded_store(
        Some(live(true, false)),
        &[
            ("SLOWUSDT", TradingType::Spot),
            ("FLATUSDT", TradingType::Spot),
            ("BTCUSDT", TradingType::Spot),
        ],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    analyzer.fail("SLOWUSDT", AnalysisError::timeout("klines request timed out"));
    analyzer.fail("FLATUSDT", AnalysisError::division_by_zero("zero volume"));
    analyzer.answer("BTCUSDT", Signal::Buy, 0.6);
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(analyzer.calls(), vec!["SLOWUSDT", "FLATUSDT", "BTCUSDT"]);

    let analysis = report.analysis.unwrap();
    assert_eq!(analysis.skipped, 2);
    assert_eq!(analysis.analyzed, 1);
    assert_eq!(h.pacer.pauses.load(Ordering::SeqCst), 3);

    let skips = h
        .store
        .log_entries()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.message == "Analysis skipped")
        .count();
    assert_eq!(skips, 2);
}

#[tokio::test]
async fn test_other_errors_logged_and_loop_continues() {
    let store = seeded_store(
        Some(live(true, false)),
        &[("BADUSDT", TradingType::Spot), ("BTCUSDT", TradingType::Spot)],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    analyzer.fail("BADUSDT", AnalysisError::other("unexpected payload"));
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(analyzer.calls().len(), 2);
    assert_eq!(report.analysis.unwrap().failed, 1);

    let logs = h.store.log_entries().await.unwrap();
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Error && e.context["symbol"] == "BADUSDT"));
}

// ---------------------------------------------------------------------------
// Strategy selection and execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_enhanced_failure_degrades_once() {
    let store = seeded_store(
        Some(live(true, false)),
        &[("BTCUSDT", TradingType::Spot), ("ETHUSDT", TradingType::Spot)],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    analyzer.answer("BTCUSDT", Signal::Buy, 0.88);
    let factory = MockFactory::new(analyzer.clone()).failing_enhanced("signal service offline");
    let enhanced_builds = factory.enhanced_builds.clone();
    let basic_builds = factory.basic_builds.clone();
    let h = harness(store, factory);

    let report = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(report.variant, StrategyVariant::Basic);
    assert!(report.degraded);
    assert_eq!(report.analyzer, "basic");
    assert_eq!(enhanced_builds.load(Ordering::SeqCst), 1);
    assert_eq!(basic_builds.load(Ordering::SeqCst), 1);

    let degradations = h
        .store
        .log_entries()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.message.contains("degrading to basic"))
        .count();
    assert_eq!(degradations, 1);

    // The basic path synthesizes strength and keeps the instrument's market.
    let notifications = h.store.notifications().await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].1.data["strength"], "MODERATE");
    assert_eq!(notifications[0].1.data["trading_type"], "SPOT");
}

#[tokio::test]
async fn test_no_strategy_is_fatal() {
    let store = seeded_store(Some(live(true, false)), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let factory = MockFactory::new(analyzer.clone())
        .failing_enhanced("offline")
        .failing_basic("no credentials");
    let h = harness(store, factory);

    let err = h.orchestrator.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::StrategyUnavailable(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(analyzer.calls().is_empty());
    assert_lock_released(&h.lock_file);
}

#[tokio::test]
async fn test_strategy_run_failure_is_fatal_and_urgent() {
    let store = seeded_store(Some(live(true, false)), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let factory = MockFactory::new(analyzer.clone()).failing_run("exchange returned 503");
    let runs = factory.runs.clone();
    let h = harness(store, factory);

    let err = h.orchestrator.run_cycle().await.unwrap_err();
    assert!(matches!(err, CycleError::StrategyRun { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(analyzer.calls().is_empty());
    assert_eq!(priorities(&h.store).await, vec![Priority::Urgent]);
}

// ---------------------------------------------------------------------------
// Overlap guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_held_lock_skips_cycle() {
    let store = seeded_store(Some(live(true, false)), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let factory = MockFactory::new(analyzer.clone());
    let runs = factory.runs.clone();
    let h = harness(store, factory);

    let other = match RunLock::acquire(&h.lock_file, "other-cycle").unwrap() {
        LockAttempt::Acquired(lock) => lock,
        LockAttempt::Held(holder) => panic!("lock unexpectedly held by {holder:?}"),
    };

    let outcome = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::CycleInProgress));
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(analyzer.calls().is_empty());

    let logs = h.store.log_entries().await.unwrap();
    let skip = logs
        .iter()
        .find(|e| e.message == "Cycle skipped: another cycle is still running")
        .unwrap();
    assert_eq!(skip.context["holder_cycle_id"], "other-cycle");
    assert_eq!(skip.context["overdue"], false);

    drop(other);
    completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_leftover_lock_file_from_crashed_run_does_not_block() {
    let store = seeded_store(Some(live(true, false)), &[("BTCUSDT", TradingType::Spot)]).await;
    let analyzer = ScriptedAnalyzer::new();
    let h = harness(store, MockFactory::new(analyzer.clone()));

    // A crashed run leaves its details behind but no OS lock.
    let holder = LockInfo {
        pid: 4242,
        acquired_at: Utc::now() - ChronoDuration::hours(3),
        cycle_id: "crashed-cycle".into(),
    };
    std::fs::create_dir_all(h.lock_file.parent().unwrap()).unwrap();
    std::fs::write(&h.lock_file, serde_json::to_string(&holder).unwrap()).unwrap();

    completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(analyzer.calls(), vec!["BTCUSDT"]);
    assert_lock_released(&h.lock_file);
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_retention_is_idempotent() {
    let store = seeded_store(Some(live(true, false)), &[]).await;
    let now = Utc::now();

    store
        .put_cache("ticker:BTCUSDT", "{}", now - ChronoDuration::minutes(5))
        .await
        .unwrap();
    store
        .put_cache("ticker:ETHUSDT", "{}", now + ChronoDuration::minutes(5))
        .await
        .unwrap();

    let old_read = Notification {
        kind: NotificationKind::Signal,
        category: NotificationCategory::Ai,
        title: "old".into(),
        message: "old".into(),
        priority: Priority::Normal,
        data: serde_json::json!({}),
        created_at: now - ChronoDuration::days(10),
        read_at: None,
    };
    let id = store.create(&old_read).await.unwrap();
    store
        .mark_notification_read(id, now - ChronoDuration::days(9))
        .await
        .unwrap();
    let unread = Notification {
        title: "unread".into(),
        ..old_read.clone()
    };
    store.create(&unread).await.unwrap();

    for (level, age_days) in [(LogLevel::Info, 45), (LogLevel::Error, 45), (LogLevel::Critical, 120)] {
        store
            .append(&LogEntry {
                level,
                category: "SEED".into(),
                message: "seeded".into(),
                context: serde_json::json!({}),
                created_at: now - ChronoDuration::days(age_days),
            })
            .await
            .unwrap();
    }

    let h = harness(store, MockFactory::new(ScriptedAnalyzer::new()));

    let first = completed(h.orchestrator.run_cycle().await.unwrap());
    // Expired cache, read notification, 45-day info log, 120-day critical log.
    assert_eq!(first.retention.total_deleted(), 4);
    assert_eq!(first.retention.failures(), 0);

    let second = completed(h.orchestrator.run_cycle().await.unwrap());
    assert_eq!(second.retention.total_deleted(), 0);
    assert_eq!(second.retention.failures(), 0);

    assert_eq!(h.store.cache_keys().await.unwrap(), vec!["ticker:ETHUSDT"]);
    let remaining = h.store.notifications().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].1.title, "unread");
    let seeded: Vec<LogLevel> = h
        .store
        .log_entries()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.category == "SEED")
        .map(|e| e.level)
        .collect();
    assert_eq!(seeded, vec![LogLevel::Error]);
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_to_end_cycle() {
    let store = seeded_store(
        Some(live(true, false)),
        &[
            ("BTCUSDT", TradingType::Both),
            ("ETHUSDT", TradingType::Spot),
            ("XYZUSDT", TradingType::Futures),
        ],
    )
    .await;
    let analyzer = ScriptedAnalyzer::new();
    analyzer.answer("BTCUSDT", Signal::StrongBuy, 0.92);
    analyzer.answer("ETHUSDT", Signal::Hold, 0.4);
    let h = harness(store, MockFactory::new(analyzer.clone()));

    let outcome = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(outcome.exit_code(), 0);
    let report = completed(outcome);

    assert_eq!(report.variant, StrategyVariant::Enhanced);
    assert!(!report.degraded);
    assert_eq!(analyzer.calls(), vec!["BTCUSDT", "ETHUSDT"]);

    let analysis = report.analysis.clone().unwrap();
    assert_eq!(analysis.eligible, 2);
    assert_eq!(analysis.analyzed, 2);
    assert!(!analysis.cap_reached);

    let notifications = h.store.notifications().await.unwrap();
    assert_eq!(notifications.len(), 1);
    let (_, alert) = &notifications[0];
    assert_eq!(alert.priority, Priority::High);
    assert_eq!(alert.data["symbol"], "BTCUSDT");
    assert_eq!(alert.data["trading_type"], "BOTH");

    // Every persisted line carries this cycle's id.
    let logs = h.store.log_entries().await.unwrap();
    assert!(!logs.is_empty());
    assert!(logs.iter().all(|e| e.context["cycle_id"] == report.cycle_id.as_str()));
    assert!(report.to_string().contains("analyzed 2/2"));
    assert_lock_released(&h.lock_file);
}
