//! Engine tests through the public API.
//!
//! These tests drive the countdown with a manual clock:
//! - Full sessions from start to completion
//! - Restart behaviour with a file-backed store
//! - Subscriber ordering across a pause/resume cycle
//! - Randomized command sequences that must keep the state consistent
//! - Sessions of any allowed length finishing exactly on time

use std::sync::Arc;

use proptest::prelude::*;
use tokio::sync::mpsc;

use meditimer::daemon::persist;
use meditimer::{
    JsonFileStore, ManualClock, MemoryStore, StateStore, TimerConfig, TimerEngine, TimerError,
    TimerEvent, TimerPhase, TimerState,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_engine(
    store: Arc<dyn StateStore>,
) -> (
    TimerEngine,
    Arc<ManualClock>,
    mpsc::UnboundedReceiver<TimerEvent>,
) {
    let clock = Arc::new(ManualClock::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = TimerEngine::new(TimerConfig::default(), clock.clone(), store, tx);
    (engine, clock, rx)
}

/// Lets the tick task observe clock changes.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Advances one second at a time so every tick is observed in order.
async fn advance_by_seconds(clock: &ManualClock, secs: u64) {
    for _ in 0..secs {
        clock.advance_secs(1);
        settle().await;
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn one_minute_session_runs_to_completion() {
    let (engine, clock, mut events) = create_engine(Arc::new(MemoryStore::new()));
    engine.set_duration(1).unwrap();
    let mut sub = engine.subscribe();

    engine.start().unwrap();
    advance_by_seconds(&clock, 60).await;

    let state = engine.current_state();
    assert_eq!(state.phase, TimerPhase::Completed);
    assert_eq!(state.remaining_seconds, 0);
    assert!(!engine.is_ticking());

    let remaining: Vec<u32> = sub.drain().iter().map(|s| s.remaining_seconds).collect();
    let expected: Vec<u32> = std::iter::once(60)
        .chain(std::iter::once(60))
        .chain((0..60).rev())
        .collect();
    assert_eq!(remaining, expected);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.last(),
        Some(&TimerEvent::Completed { total_seconds: 60 })
    );
}

#[tokio::test]
async fn completed_timer_needs_reset_before_start() {
    let (engine, clock, _events) = create_engine(Arc::new(MemoryStore::new()));
    engine.set_duration(1).unwrap();
    engine.start().unwrap();
    clock.advance_secs(60);
    settle().await;

    assert!(matches!(
        engine.start(),
        Err(TimerError::InvalidArgument(_))
    ));

    let state = engine.reset().unwrap();
    assert_eq!(state, TimerState::idle(60));
    engine.start().unwrap();
    assert_eq!(engine.current_state().phase, TimerPhase::Running);
}

#[tokio::test]
async fn pause_and_resume_keep_snapshot_order() {
    let (engine, clock, _events) = create_engine(Arc::new(MemoryStore::new()));
    let mut sub = engine.subscribe();

    engine.start().unwrap();
    advance_by_seconds(&clock, 3).await;
    engine.pause().unwrap();
    // Time passing while paused changes nothing.
    advance_by_seconds(&clock, 10).await;
    engine.resume().unwrap();
    advance_by_seconds(&clock, 2).await;

    let seen: Vec<(TimerPhase, u32)> = sub
        .drain()
        .iter()
        .map(|s| (s.phase, s.remaining_seconds))
        .collect();
    assert_eq!(
        seen,
        vec![
            (TimerPhase::Idle, 900),
            (TimerPhase::Running, 900),
            (TimerPhase::Running, 899),
            (TimerPhase::Running, 898),
            (TimerPhase::Running, 897),
            (TimerPhase::Paused, 897),
            (TimerPhase::Running, 897),
            (TimerPhase::Running, 896),
            (TimerPhase::Running, 895),
        ]
    );
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn restart_with_file_store_restores_paused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let (engine, clock, _events) = create_engine(store);
        engine.set_duration(10).unwrap();
        engine.start().unwrap();
        advance_by_seconds(&clock, 5).await;
        assert_eq!(engine.current_state().remaining_seconds, 595);
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let (engine, clock, _events) = create_engine(store.clone());

    assert_eq!(
        engine.current_state(),
        TimerState {
            total_seconds: 600,
            remaining_seconds: 595,
            phase: TimerPhase::Paused,
        }
    );
    // The reconciled state was written back.
    assert_eq!(
        store.get(persist::KEY_IS_RUNNING).unwrap(),
        Some(serde_json::json!(false))
    );

    // Nothing ticks until resumed.
    advance_by_seconds(&clock, 3).await;
    assert_eq!(engine.current_state().remaining_seconds, 595);

    engine.resume().unwrap();
    advance_by_seconds(&clock, 1).await;
    assert_eq!(engine.current_state().remaining_seconds, 594);
}

#[tokio::test]
async fn restart_after_completion_stays_completed() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());

    {
        let (engine, clock, _events) = create_engine(store.clone());
        engine.set_duration(1).unwrap();
        engine.start().unwrap();
        clock.advance_secs(60);
        settle().await;
        assert!(engine.current_state().is_completed());
    }

    let (engine, _clock, _events) = create_engine(store);
    let state = engine.current_state();
    assert_eq!(state.phase, TimerPhase::Completed);
    assert!(matches!(engine.resume(), Err(TimerError::InvalidArgument(_))));
}

// ============================================================================
// Randomized command sequences
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    SetDuration(u32),
    Start,
    Pause,
    Resume,
    Reset,
    Advance(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..=3).prop_map(Op::SetDuration),
        Just(Op::Start),
        Just(Op::Pause),
        Just(Op::Resume),
        Just(Op::Reset),
        (0u64..=90).prop_map(Op::Advance),
    ]
}

fn assert_consistent(state: &TimerState) {
    assert!(state.total_seconds >= 60, "total too small: {:?}", state);
    assert!(
        state.remaining_seconds <= state.total_seconds,
        "remaining above total: {:?}",
        state
    );
    assert_eq!(
        state.remaining_seconds == 0,
        state.phase == TimerPhase::Completed,
        "zero remaining must mean completed: {:?}",
        state
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_commands_keep_state_consistent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let (engine, clock, _events) = create_engine(store.clone());

            for op in ops {
                let before = engine.current_state();
                let result = match op {
                    Op::SetDuration(minutes) => engine.set_duration(minutes).map(|_| ()),
                    Op::Start => engine.start().map(|_| ()),
                    Op::Pause => engine.pause().map(|_| ()),
                    Op::Resume => engine.resume().map(|_| ()),
                    Op::Reset => engine.reset().map(|_| ()),
                    Op::Advance(secs) => {
                        clock.advance_secs(secs);
                        settle().await;
                        Ok(())
                    }
                };

                let after = engine.current_state();
                if result.is_err() {
                    // Rejected commands leave the state untouched.
                    assert_eq!(before, after);
                }
                assert_consistent(&after);
                assert_eq!(engine.is_ticking(), after.phase == TimerPhase::Running);

                // The store always holds the latest snapshot.
                match persist::load(store.as_ref(), 900).unwrap() {
                    Some(restored) => {
                        assert_eq!(restored.state.total_seconds, after.total_seconds);
                        assert_eq!(restored.state.remaining_seconds, after.remaining_seconds);
                    }
                    // Nothing has changed since construction.
                    None => assert_eq!(after, TimerState::idle(900)),
                }
            }
        });
    }

    #[test]
    fn any_session_completes_after_its_full_length(minutes in 1u32..=1440) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (engine, clock, _events) = create_engine(Arc::new(MemoryStore::new()));
            engine.set_duration(minutes).unwrap();
            engine.start().unwrap();
            let total = minutes * 60;

            clock.advance_secs(u64::from(total - 1));
            settle().await;
            assert_eq!(
                engine.current_state(),
                TimerState {
                    total_seconds: total,
                    remaining_seconds: 1,
                    phase: TimerPhase::Running,
                }
            );

            clock.advance_secs(1);
            settle().await;
            assert_eq!(
                engine.current_state(),
                TimerState {
                    total_seconds: total,
                    remaining_seconds: 0,
                    phase: TimerPhase::Completed,
                }
            );
            assert!(!engine.is_ticking());
        });
    }
}
