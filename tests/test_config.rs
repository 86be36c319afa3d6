//! Integration tests: engine configuration files
//!
//! Loads TOML and JSON files from disk and feeds the result to the graph and
//! session constructors.

use sndgraph::backend::mock::MockBackend;
use sndgraph::config::EngineConfig;
use sndgraph::session::Session;
use sndgraph::sound_graph::SoundGraph;
use sndgraph::wave_table::WaveTable;
use sndgraph::SndError;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        r#"
        sample_rate = 48000.0
        frames_per_buffer = 480
        ring_size = 2
        "#,
    );

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.sample_rate, 48000.0);
    assert_eq!(config.frames_per_buffer, 480);
    assert_eq!(config.ring_size, 2);
    assert_eq!(config.ring_warn_len, EngineConfig::default().ring_warn_len);
    assert_eq!(config.latency(), Duration::from_millis(20));
}

#[test]
fn test_load_json_file() {
    let file = write_config(r#"{ "frames_per_buffer": 128, "ring_warn_len": 8 }"#);

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.frames_per_buffer, 128);
    assert_eq!(config.ring_warn_len, 8);
    assert_eq!(config.sample_rate, 44100.0);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    assert!(matches!(EngineConfig::load(&path), Err(SndError::Io(_))));
}

#[test]
fn test_wrong_types_rejected() {
    let file = write_config("ring_size = \"four\"\n");
    assert!(matches!(
        EngineConfig::load(file.path()),
        Err(SndError::Config(_))
    ));
}

#[test]
fn test_session_from_config() {
    let file = write_config("sample_rate = 8000.0\nframes_per_buffer = 80\nring_size = 8\n");
    let config = EngineConfig::load(file.path()).unwrap();

    let mut graph = SoundGraph::from_config(&config);
    let osc = graph
        .oscillator(WaveTable::square(64).unwrap(), 100.0, None)
        .unwrap();
    graph.set_root(osc).unwrap();

    let mut session = Session::open_with_config(MockBackend::new(), &config).unwrap();
    session.attach(Arc::new(Mutex::new(graph))).unwrap();
    assert_eq!(session.ring_size(), 8);

    // 80 / 8000 * 8 = 80ms
    let latency = session.latency().unwrap();
    assert!((latency.as_secs_f64() - config.latency().as_secs_f64()).abs() < 1e-9);
    assert_eq!(session.tick().unwrap().buffers, 8);
}

#[test]
fn test_invalid_config_never_opens_device() {
    let config = EngineConfig {
        ring_size: 12,
        ..Default::default()
    };
    let backend = MockBackend::new();
    let handle = backend.handle();

    assert!(matches!(
        Session::open_with_config(backend, &config),
        Err(SndError::InvalidRingSize(12))
    ));
    assert!(!handle.is_open());
}
