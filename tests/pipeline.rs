//! End-to-end: snapshot file through the poll loop into a shared region.
//!
//! Uses the in-memory region backend so the test reads exactly the bytes a
//! consumer would see after each flush.

use serde_json::Value;
use simbridge::publisher::{
    DEFAULT_LIVENESS_NAME, DEFAULT_REGION_NAME, MemoryBackend, REGION_SIZE, SharedBufferPublisher,
    read_frame,
};
use simbridge::source::SnapshotSource;
use simbridge::{BridgeError, PollScheduler, TelemetrySink, TelemetrySource};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CRUISE: &str = r#"
latitude: 51.4775
longitude: -0.4614
offsets:
  indicated_airspeed: 35840      # 280 kt
  true_airspeed: 57344           # 448 kt
  ground_speed: 13107200         # 200 m/s
  vertical_speed: 1280           # 10 m/s
  indicated_altitude: 47244640256000  # 11000 m
  radio_altitude: 720896000      # 11000 m
  altimeter_pressure: 240
  true_heading: 1073741824       # 90 degrees
  magnetic_variation: 0
  pitch: 0
  bank: 0
  turn_rate: 0
  g_force: 625
  squawk: 29440                  # 0x7300
  paused: 0
  slew_mode: 1
"#;

fn snapshot_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn open_publisher(backend: &MemoryBackend) -> SharedBufferPublisher<MemoryBackend> {
    SharedBufferPublisher::open(backend.clone(), DEFAULT_REGION_NAME, DEFAULT_LIVENESS_NAME)
        .unwrap()
}

fn region_json(backend: &MemoryBackend) -> Value {
    let bytes = backend.contents();
    assert_eq!(bytes.len(), REGION_SIZE);
    serde_json::from_str(&read_frame(&bytes).unwrap()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn snapshot_reaches_region_in_wire_layout() {
    let file = snapshot_file(CRUISE);
    let mut source = SnapshotSource::from_path(file.path());
    source.connect().await.unwrap();

    let backend = MemoryBackend::new();
    let mut publisher = open_publisher(&backend);

    let summary = PollScheduler::new(Duration::from_secs(1))
        .with_max_cycles(2)
        .run(&mut source, &mut publisher, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.cycles, 2);
    assert_eq!(backend.flush_count(), 2);
    assert!(!backend.liveness_held());

    let value = region_json(&backend);
    assert_eq!(value["platform"]["simlink"]["version"], "1.1");
    assert_eq!(value["platform"]["simulator"]["family"], "MSFS");

    let aircraft = &value["aircraft"];
    assert_eq!(aircraft["squawk"], "7300");
    assert_eq!(aircraft["speed"]["ias"], 280);
    assert_eq!(aircraft["speed"]["tas"], 448);
    assert_eq!(aircraft["speed"]["gs"], 388);
    assert_eq!(aircraft["vertical_speed"], 1968);
    assert_eq!(aircraft["altitude"]["true"], aircraft["altitude"]["indicated"]);
    assert_eq!(aircraft["altitude"]["indicated"], 36089);
    assert_eq!(aircraft["altitude"]["agl"], 36089);
    assert_eq!(aircraft["altitude"]["pressureXP12"], 0.0);
    assert_eq!(aircraft["altitude"]["slp"], 29.92);
    assert_eq!(aircraft["status"]["true_heading"], 90);
    assert_eq!(aircraft["status"]["true_track"], 90);
    assert_eq!(aircraft["status"]["magnetic_heading"], 90);
    assert_eq!(aircraft["gforce"], 1.0);
    assert_eq!(aircraft["position"]["latitude"], 51.4775);

    assert_eq!(value["system"]["paused"], 0);
    assert_eq!(value["system"]["slew"], 1);
    assert_eq!(value["system"]["tz_offset"], 0);
    assert!(value["system"]["time"].as_i64().unwrap() > 0);

    let bytes = backend.contents();
    let payload_end = summary.last_message_bytes;
    assert!(bytes[payload_end..].iter().all(|&b| b == 0));
}

#[tokio::test(start_paused = true)]
async fn edited_snapshot_replaces_previous_frame() {
    let file = snapshot_file(CRUISE);
    let mut source = SnapshotSource::from_path(file.path());
    source.connect().await.unwrap();

    let backend = MemoryBackend::new();
    let mut publisher = open_publisher(&backend);
    let scheduler = PollScheduler::new(Duration::from_secs(1)).with_max_cycles(1);
    let first = scheduler
        .run(&mut source, &mut publisher, &CancellationToken::new())
        .await
        .unwrap();

    // Zeroed values serialize shorter than the cruise ones.
    std::fs::write(file.path(), "offsets:\n  squawk: 4608\n").unwrap();

    let mut source = SnapshotSource::from_path(file.path());
    source.connect().await.unwrap();
    let mut publisher = open_publisher(&backend);
    let second = scheduler
        .run(&mut source, &mut publisher, &CancellationToken::new())
        .await
        .unwrap();

    assert!(second.last_message_bytes < first.last_message_bytes);
    assert_eq!(region_json(&backend)["aircraft"]["squawk"], "1200");
    let bytes = backend.contents();
    assert!(bytes[second.last_message_bytes..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn unreadable_snapshot_aborts_and_releases() {
    let file = snapshot_file("offsets:\n  not_an_offset: 1\n");
    let mut source = SnapshotSource::from_path(file.path());
    source.connect().await.unwrap();

    let backend = MemoryBackend::new();
    let mut publisher = open_publisher(&backend);

    let result = PollScheduler::new(Duration::from_secs(1))
        .run(&mut source, &mut publisher, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(BridgeError::Snapshot { .. })));
    assert!(!publisher.is_open());
    assert!(!backend.liveness_held());
    assert!(!backend.region_mapped());
    assert!(backend.contents().iter().all(|&b| b == 0));
    assert!(!source.is_connected());
}

#[tokio::test]
async fn closed_publisher_rejects_messages() {
    let backend = MemoryBackend::new();
    let mut publisher = open_publisher(&backend);
    publisher.close();

    let message = simbridge::encode_now(&simbridge::CanonicalTelemetry::default());
    assert!(matches!(publisher.publish(&message), Err(BridgeError::RegionAccess { .. })));
}
