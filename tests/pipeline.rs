mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{build_engine, test_config, wav_files, ScriptedRemote};
use soundwatch::audio::CaptureState;
use soundwatch::engine::StubBackend;
use soundwatch::storage::{KeyValueStore, MemoryStore};
use tokio_stream::StreamExt;

#[tokio::test(start_paused = true)]
async fn silent_sessions_never_reach_the_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.0);
    let remote = Arc::new(ScriptedRemote::new(&[("dog", 0.9)]));
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = build_engine(test_config(dir.path()), backend.clone(), remote.clone(), store);

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(7)).await;
    engine.shutdown().await;

    assert_eq!(remote.classify_calls(), 0);
    assert!(engine.results().is_empty());
    assert!(engine.telemetry().snapshot().count("silence_rejected") >= 2);
    assert!(wav_files(&dir.path().join("recordings")).is_empty());
    assert!(backend.stop_count() >= 2);
}

#[tokio::test(start_paused = true)]
async fn loud_session_produces_labelled_decision() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.08);
    let remote = Arc::new(ScriptedRemote::new(&[("dog", 0.82), ("cat", 0.1)]));
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = build_engine(test_config(dir.path()), backend, remote, store);

    let mut decisions = Box::pin(engine.decision_stream());
    engine.start().await.unwrap();

    let decision = decisions.next().await.unwrap();
    assert_eq!(decision.label(), "dog");
    assert!((decision.confidence() - 0.82).abs() < 1e-6);
    assert!(decision.predictions().is_none());
    assert!(!decision.is_error());

    engine.shutdown().await;
    assert_eq!(engine.capture_state(), CaptureState::Stopped);
    assert_eq!(
        engine.results().latest().unwrap().recording_id(),
        decision.recording_id()
    );
    assert!(wav_files(&dir.path().join("recordings")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn units_arriving_while_busy_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.08);
    // Units complete at odd seconds; classification finishes at t = 8 s.
    let remote = Arc::new(
        ScriptedRemote::new(&[("dog", 0.9)]).with_classify_delay(Duration::from_secs(7)),
    );
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = build_engine(test_config(dir.path()), backend, remote.clone(), store);

    let mut decisions = engine.subscribe_decisions();
    engine.start().await.unwrap();
    let first = decisions.recv().await.unwrap();
    assert_eq!(first.label(), "dog");

    let snapshot = engine.telemetry().snapshot();
    assert!(snapshot.count("unit_dropped") >= 2);
    assert_eq!(remote.classify_calls(), 1);

    engine.shutdown().await;
    assert!(wav_files(&dir.path().join("recordings")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn low_confidence_becomes_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.08);
    let remote = Arc::new(ScriptedRemote::new(&[("dog", 0.15), ("cat", 0.05)]));
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = build_engine(test_config(dir.path()), backend, remote, store);

    let mut decisions = engine.subscribe_decisions();
    engine.start().await.unwrap();
    let decision = decisions.recv().await.unwrap();
    engine.shutdown().await;

    assert!(decision.is_unknown());
    assert_eq!(decision.original_label(), Some("dog"));
    assert!((decision.confidence() - 0.15).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn evaluation_uses_cached_decision() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.08);
    let remote = Arc::new(ScriptedRemote::new(&[("siren", 0.7)]));
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = build_engine(test_config(dir.path()), backend, remote.clone(), store);

    let mut decisions = engine.subscribe_decisions();
    let mut statuses = engine.subscribe_evaluation_status();
    engine.start().await.unwrap();
    let decision = decisions.recv().await.unwrap();
    engine.stop().await;

    let accepted = engine
        .evaluate_recording(decision.recording_id(), false)
        .await;
    assert_eq!(accepted, Some(true));

    let submitted = remote.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].recording_name, decision.recording_id());
    assert_eq!(submitted[0].detection_class, "siren");
    assert!(!submitted[0].success);
    assert_eq!(submitted[0].device_id, engine.device_id());

    assert_eq!(
        statuses.recv().await.unwrap().to_string(),
        "submitting"
    );
    assert_eq!(
        statuses.recv().await.unwrap().to_string(),
        "submitted successfully"
    );
}
