use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::Builder;

use watchpost::{AnalyzerConfig, ExportFormat, TrackingMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WATCHPOST_CONFIG",
        "WATCHPOST_LOITER_WINDOW",
        "WATCHPOST_LOITER_RADIUS",
        "WATCHPOST_ABANDON_THRESHOLD",
        "WATCHPOST_CROWD_THRESHOLD",
        "WATCHPOST_LOITER_LABELS",
        "WATCHPOST_ABANDON_LABELS",
        "WATCHPOST_TRACKING",
        "WATCHPOST_ALERTS_PATH",
        "WATCHPOST_DB_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "heuristics": {
            "loiter_window": 30,
            "loiter_radius_px": 15,
            "abandon_threshold": 120,
            "crowd_threshold": 8,
            "abandon_labels": ["suitcase"]
        },
        "tracking": { "mode": "instance", "max_distance_px": 45 },
        "output": {
            "alerts_path": "lobby_alerts.json",
            "db_path": "lobby.db",
            "annotated_dir": "frames"
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("WATCHPOST_CONFIG", file.path());
    std::env::set_var("WATCHPOST_CROWD_THRESHOLD", "12");
    std::env::set_var("WATCHPOST_LOITER_LABELS", "person, dog");

    let cfg = AnalyzerConfig::load(None).expect("load config");

    assert_eq!(cfg.heuristics.loiter_window, 30);
    assert_eq!(cfg.heuristics.loiter_radius_px, 15);
    assert_eq!(cfg.heuristics.abandon_threshold, 120);
    assert_eq!(cfg.heuristics.crowd_threshold, 12);
    assert_eq!(cfg.heuristics.loiter_labels, vec!["person", "dog"]);
    assert_eq!(cfg.heuristics.abandon_labels, vec!["suitcase"]);
    assert_eq!(
        cfg.heuristics.tracking,
        TrackingMode::ByInstance {
            max_distance_px: 45,
            max_missing_frames: 25,
        }
    );
    assert_eq!(cfg.output.alerts_path, PathBuf::from("lobby_alerts.json"));
    assert_eq!(cfg.output.format, ExportFormat::Json);
    assert_eq!(cfg.output.db_path.as_deref(), Some("lobby.db"));
    assert_eq!(cfg.output.annotated_dir, Some(PathBuf::from("frames")));

    clear_env();
}

#[test]
fn loads_toml_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[heuristics]
loiter_window = 40
crowd_threshold = 3

[output]
alerts_path = "out.csv"
format = "json"
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("WATCHPOST_TRACKING", "label");
    std::env::set_var("WATCHPOST_DB_PATH", "runs.db");

    let cfg = AnalyzerConfig::load(Some(file.path())).expect("load config");

    assert_eq!(cfg.heuristics.loiter_window, 40);
    assert_eq!(cfg.heuristics.loiter_radius_px, 20);
    assert_eq!(cfg.heuristics.abandon_threshold, 80);
    assert_eq!(cfg.heuristics.crowd_threshold, 3);
    assert_eq!(cfg.heuristics.tracking, TrackingMode::ByLabel);
    assert_eq!(cfg.output.alerts_path, PathBuf::from("out.csv"));
    assert_eq!(cfg.output.format, ExportFormat::Json);
    assert_eq!(cfg.output.db_path.as_deref(), Some("runs.db"));

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHPOST_ALERTS_PATH", "night_shift.json");

    let cfg = AnalyzerConfig::load(None).expect("load config");
    assert_eq!(cfg.heuristics.loiter_window, 50);
    assert_eq!(cfg.heuristics.loiter_radius_px, 20);
    assert_eq!(cfg.heuristics.abandon_threshold, 80);
    assert_eq!(cfg.heuristics.crowd_threshold, 5);
    assert_eq!(cfg.heuristics.loiter_labels, vec!["person"]);
    assert_eq!(
        cfg.heuristics.abandon_labels,
        vec!["backpack", "suitcase", "handbag"]
    );
    assert_eq!(cfg.output.alerts_path, PathBuf::from("night_shift.json"));
    assert_eq!(cfg.output.format, ExportFormat::Json);
    assert!(cfg.output.db_path.is_none());

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHPOST_LOITER_WINDOW", "soon");
    let err = AnalyzerConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("WATCHPOST_LOITER_WINDOW"));
    clear_env();

    std::env::set_var("WATCHPOST_LOITER_RADIUS", "0");
    let err = AnalyzerConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("loiter_radius_px"));
    clear_env();

    std::env::set_var("WATCHPOST_TRACKING", "kalman");
    assert!(AnalyzerConfig::load(None).is_err());
    clear_env();
}

#[test]
fn zero_abandon_and_crowd_thresholds_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WATCHPOST_ABANDON_THRESHOLD", "0");
    std::env::set_var("WATCHPOST_CROWD_THRESHOLD", "0");
    let cfg = AnalyzerConfig::load(None).expect("zero thresholds load");
    assert_eq!(cfg.heuristics.abandon_threshold, 0);
    assert_eq!(cfg.heuristics.crowd_threshold, 0);
    clear_env();
}

#[test]
fn rejects_unreadable_or_malformed_files() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let missing = std::env::temp_dir().join("watchpost-missing-config.json");
    assert!(AnalyzerConfig::load(Some(missing.as_path())).is_err());

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    let err = AnalyzerConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
