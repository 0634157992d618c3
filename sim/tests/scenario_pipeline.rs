//! Scenarios driven through codec, engine and history store, then replayed.

use chrono::{Local, NaiveDate, TimeZone};
use sensor_models::{Observation, SensorMount};
use sim::{drive_pipeline, Recording, ReplayConfig, ReplayPlayer, Scenario, ScenarioKind};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracker_core::{
    HistoryStore, LiveConfig, LiveTracker, Pipeline, PipelineConfig, SmoothingConfig, Stamp,
    TrackId,
};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn noon() -> Stamp {
    Stamp {
        mono: Instant::now(),
        wall: Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap(),
    }
}

fn persisted(root: &Path) -> (Pipeline, HistoryStore) {
    let store = HistoryStore::open(root, day()).unwrap();
    let config = PipelineConfig {
        log_dir: root.to_path_buf(),
        ..Default::default()
    };
    (Pipeline::with_store(config, Some(store.clone())), store)
}

#[test]
fn dropout_starts_a_new_serial_and_finalizes_both() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, store) = persisted(dir.path());
    let txs = Scenario::build(ScenarioKind::Dropout, 11).transmissions();

    let summary = drive_pipeline(&mut pipeline, &txs, noon(), Duration::from_secs(1));
    assert_eq!(summary.births, vec![TrackId(1), TrackId(2)]);
    assert_eq!(summary.data_losses, 1);
    drop(pipeline);

    let index = store.read_index().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[0].serial, "T1");
    assert_eq!(index[1].serial, "T2");
    assert_eq!(index[0].first_seen, "2024-06-01T12:00:00");
    let first = index[0].duration_secs().unwrap();
    assert!((2..=3).contains(&first), "T1 lasted {first}s");
    let second = index[1].duration_secs().unwrap();
    assert!((3..=4).contains(&second), "T2 lasted {second}s");
    for record in &index {
        assert!(store.day_dir().join(&record.history_file).is_file());
    }

    let reopened = Pipeline::with_store(PipelineConfig::default(), Some(store));
    assert_eq!(reopened.track_manager.peek_next_id(), TrackId(3));
}

#[test]
fn slot_identity_survives_a_crossing() {
    for kind in [ScenarioKind::Crossing, ScenarioKind::SlotSwap] {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, store) = persisted(dir.path());
        let txs = Scenario::build(kind, 2).transmissions();

        let summary = drive_pipeline(&mut pipeline, &txs, noon(), Duration::from_secs(1));
        assert_eq!(summary.births.len(), 2, "{kind:?}");
        assert!(summary.expired.is_empty(), "{kind:?}");
        assert_eq!(pipeline.tracks().len(), 2);
        drop(pipeline);

        let index = store.read_index().unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.iter().all(|r| r.last_seen != r.first_seen));
    }
}

#[test]
fn recorded_walk_replays_with_live_world_positions() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, store) = persisted(dir.path());
    let txs = Scenario::build(ScenarioKind::WalkBy, 4).transmissions();
    let summary = drive_pipeline(&mut pipeline, &txs, noon(), Duration::from_secs(1));
    drop(pipeline);

    let files = store.recent_recordings(3);
    assert_eq!(files.len(), 1);
    let recording = Recording::load(&files[0]).unwrap();
    assert_eq!(recording.len(), summary.batches);
    assert!(recording.duration() > 3.5 && recording.duration() < 4.1);
    let first = &recording.samples[0];
    assert_eq!(first.t_rel, 0.0);
    assert!(first.raw_hex.as_deref().is_some_and(|h| h.starts_with("aaff0300")));

    // Same mount, same point: the live view and the replay agree.
    let mount = SensorMount::new([1200.0, -300.0], 35.0);
    let live = LiveTracker::spawn(
        Pipeline::with_store(
            PipelineConfig {
                smoothing: SmoothingConfig {
                    enabled: false,
                    level: 0,
                },
                ..Default::default()
            },
            None,
        ),
        LiveConfig {
            mount,
            ..Default::default()
        },
    )
    .unwrap();
    live.submit(vec![Observation::new(1, first.x_mm as i32, first.y_mm as i32)])
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let view = loop {
        let view = live.view();
        if view.batches == 1 || Instant::now() > deadline {
            break view;
        }
        thread::sleep(Duration::from_millis(5));
    };
    let (lx, ly) = view.tracks[0].world_mm;
    let (rx, ry) = recording.world_positions(&mount)[0];
    assert!((lx - rx).abs() < 1e-9 && (ly - ry).abs() < 1e-9);
    live.shutdown();

    let player = ReplayPlayer::start(
        recording,
        ReplayConfig {
            speed: 20.0,
            ..Default::default()
        },
    )
    .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !player.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(player.is_finished());
    assert_eq!(player.cursor(), Some(summary.batches - 1));
}
