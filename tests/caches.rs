mod common;

use std::sync::Arc;

use common::{build_engine, reference_class, test_config, ScriptedRemote};
use soundwatch::engine::StubBackend;
use soundwatch::storage::{FileStore, KeyValueStore};
use soundwatch::RemoteError;

fn file_store(dir: &std::path::Path) -> Arc<dyn KeyValueStore> {
    Arc::new(FileStore::open(dir.join("state")).unwrap())
}

#[tokio::test]
async fn reference_classes_fall_back_to_persisted_snapshot() {
    let dir = tempfile::tempdir().unwrap();

    let online = Arc::new(ScriptedRemote::new(&[]));
    online.set_classes(Ok(vec![reference_class(2, "glass"), reference_class(1, "dog")]));
    let engine = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        online,
        file_store(dir.path()),
    );
    let fetched = engine.reference().get(true).await;
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].id, 1);
    drop(engine);

    let offline = Arc::new(ScriptedRemote::new(&[]));
    offline.set_classes(Err(RemoteError::HttpStatus { status: 503 }));
    let engine = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        offline,
        file_store(dir.path()),
    );
    let restored = engine.reference().get(true).await;
    assert_eq!(restored, fetched);
    assert_eq!(engine.reference().find_by_name("glass").unwrap().id, 2);
    assert_eq!(
        engine
            .telemetry()
            .snapshot()
            .count("reference_refresh_failed"),
        1
    );
}

#[tokio::test]
async fn failed_refresh_keeps_in_memory_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(ScriptedRemote::new(&[]));
    remote.set_classes(Ok(vec![reference_class(1, "dog")]));
    let engine = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        remote.clone(),
        file_store(dir.path()),
    );
    assert_eq!(engine.reference().get(false).await.len(), 1);

    remote.set_classes(Err(RemoteError::Transport {
        reason: "connection refused".to_string(),
    }));
    let held = engine.reference().get(true).await;
    assert_eq!(held, vec![reference_class(1, "dog")]);
}

#[tokio::test(start_paused = true)]
async fn recent_decisions_survive_restart_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::new());
    backend.set_amplitude(0.08);
    let remote = Arc::new(ScriptedRemote::new(&[("dog", 0.9)]));
    let engine = build_engine(
        test_config(dir.path()),
        backend,
        remote.clone(),
        file_store(dir.path()),
    );

    let mut decisions = engine.subscribe_decisions();
    engine.start().await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(decisions.recv().await.unwrap().recording_id().to_string());
    }
    engine.shutdown().await;
    let cached: Vec<String> = engine
        .results()
        .entries()
        .iter()
        .map(|d| d.recording_id().to_string())
        .collect();
    drop(engine);

    let restarted = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        remote,
        file_store(dir.path()),
    );
    assert_eq!(restarted.results().load_persisted().unwrap(), cached.len());
    let reloaded: Vec<String> = restarted
        .results()
        .entries()
        .iter()
        .map(|d| d.recording_id().to_string())
        .collect();
    assert_eq!(reloaded, cached);
    assert_eq!(&reloaded[0], ids.last().unwrap());
}

#[tokio::test]
async fn settings_persist_across_engines() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(ScriptedRemote::new(&[]));
    let engine = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        remote.clone(),
        file_store(dir.path()),
    );
    let mut settings = engine.detection_settings();
    settings.detection_threshold = 0.6;
    settings.show_all_predictions = true;
    engine.update_detection_settings(settings).unwrap();
    drop(engine);

    let engine = build_engine(
        test_config(dir.path()),
        Arc::new(StubBackend::new()),
        remote,
        file_store(dir.path()),
    );
    let restored = engine.detection_settings();
    assert_eq!(restored.detection_threshold, 0.6);
    assert!(restored.show_all_predictions);
}
