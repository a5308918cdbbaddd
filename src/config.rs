use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::{
    HeuristicConfig, TrackingMode, DEFAULT_ABANDON_THRESHOLD, DEFAULT_CROWD_THRESHOLD,
    DEFAULT_LOITER_RADIUS_PX, DEFAULT_LOITER_WINDOW,
};
use crate::export::ExportFormat;

const DEFAULT_ALERTS_PATH: &str = "alerts_log.csv";
const DEFAULT_MATCH_DISTANCE_PX: i32 = 60;
const DEFAULT_MAX_MISSING_FRAMES: u64 = 25;

#[derive(Debug, Deserialize, Default)]
struct AnalyzerConfigFile {
    heuristics: Option<HeuristicsConfigFile>,
    tracking: Option<TrackingConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct HeuristicsConfigFile {
    loiter_window: Option<usize>,
    loiter_radius_px: Option<i32>,
    abandon_threshold: Option<usize>,
    crowd_threshold: Option<usize>,
    loiter_labels: Option<Vec<String>>,
    abandon_labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    mode: Option<String>,
    max_distance_px: Option<i32>,
    max_missing_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    alerts_path: Option<PathBuf>,
    format: Option<String>,
    db_path: Option<String>,
    annotated_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub heuristics: HeuristicConfig,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub alerts_path: PathBuf,
    pub format: ExportFormat,
    pub db_path: Option<String>,
    pub annotated_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let alerts_path = PathBuf::from(DEFAULT_ALERTS_PATH);
        Self {
            heuristics: HeuristicConfig::default(),
            output: OutputSettings {
                format: ExportFormat::from_path(&alerts_path),
                alerts_path,
                db_path: None,
                annotated_dir: None,
            },
        }
    }
}

impl AnalyzerConfig {
    /// Load from `path`, else `WATCHPOST_CONFIG`, else defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("WATCHPOST_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalyzerConfigFile) -> Result<Self> {
        let defaults = HeuristicConfig::default();
        let heuristics_file = file.heuristics.unwrap_or_default();
        let tracking = match file.tracking {
            Some(tracking) => parse_tracking(
                tracking.mode.as_deref().unwrap_or("label"),
                tracking.max_distance_px,
                tracking.max_missing_frames,
            )?,
            None => TrackingMode::ByLabel,
        };
        let heuristics = HeuristicConfig {
            loiter_window: heuristics_file
                .loiter_window
                .unwrap_or(DEFAULT_LOITER_WINDOW),
            loiter_radius_px: heuristics_file
                .loiter_radius_px
                .unwrap_or(DEFAULT_LOITER_RADIUS_PX),
            abandon_threshold: heuristics_file
                .abandon_threshold
                .unwrap_or(DEFAULT_ABANDON_THRESHOLD),
            crowd_threshold: heuristics_file
                .crowd_threshold
                .unwrap_or(DEFAULT_CROWD_THRESHOLD),
            loiter_labels: heuristics_file
                .loiter_labels
                .unwrap_or(defaults.loiter_labels),
            abandon_labels: heuristics_file
                .abandon_labels
                .unwrap_or(defaults.abandon_labels),
            tracking,
        };

        let output_file = file.output.unwrap_or_default();
        let alerts_path = output_file
            .alerts_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ALERTS_PATH));
        let format = match output_file.format.as_deref() {
            Some(format) => format.parse()?,
            None => ExportFormat::from_path(&alerts_path),
        };
        let output = OutputSettings {
            alerts_path,
            format,
            db_path: output_file.db_path,
            annotated_dir: output_file.annotated_dir,
        };
        Ok(Self { heuristics, output })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(window) = env_number::<usize>("WATCHPOST_LOITER_WINDOW")? {
            self.heuristics.loiter_window = window;
        }
        if let Some(radius) = env_number::<i32>("WATCHPOST_LOITER_RADIUS")? {
            self.heuristics.loiter_radius_px = radius;
        }
        if let Some(threshold) = env_number::<usize>("WATCHPOST_ABANDON_THRESHOLD")? {
            self.heuristics.abandon_threshold = threshold;
        }
        if let Some(threshold) = env_number::<usize>("WATCHPOST_CROWD_THRESHOLD")? {
            self.heuristics.crowd_threshold = threshold;
        }
        if let Ok(labels) = std::env::var("WATCHPOST_LOITER_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.heuristics.loiter_labels = parsed;
            }
        }
        if let Ok(labels) = std::env::var("WATCHPOST_ABANDON_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.heuristics.abandon_labels = parsed;
            }
        }
        if let Ok(mode) = std::env::var("WATCHPOST_TRACKING") {
            if !mode.trim().is_empty() {
                let (distance, missing) = match self.heuristics.tracking {
                    TrackingMode::ByInstance {
                        max_distance_px,
                        max_missing_frames,
                    } => (Some(max_distance_px), Some(max_missing_frames)),
                    TrackingMode::ByLabel => (None, None),
                };
                self.heuristics.tracking = parse_tracking(&mode, distance, missing)?;
            }
        }
        if let Ok(path) = std::env::var("WATCHPOST_ALERTS_PATH") {
            if !path.trim().is_empty() {
                self.output.alerts_path = PathBuf::from(path);
                self.output.format = ExportFormat::from_path(&self.output.alerts_path);
            }
        }
        if let Ok(path) = std::env::var("WATCHPOST_DB_PATH") {
            if !path.trim().is_empty() {
                self.output.db_path = Some(path);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let h = &self.heuristics;
        if h.loiter_window == 0 {
            return Err(anyhow!("loiter_window must be greater than zero"));
        }
        if h.loiter_radius_px <= 0 {
            return Err(anyhow!("loiter_radius_px must be greater than zero"));
        }
        // abandon/crowd thresholds of zero alert on the first sample or detection.
        if let TrackingMode::ByInstance {
            max_distance_px, ..
        } = h.tracking
        {
            if max_distance_px <= 0 {
                return Err(anyhow!("tracking.max_distance_px must be greater than zero"));
            }
        }
        if self.output.alerts_path.as_os_str().is_empty() {
            return Err(anyhow!("output.alerts_path must not be empty"));
        }
        Ok(())
    }
}

fn parse_tracking(
    mode: &str,
    max_distance_px: Option<i32>,
    max_missing_frames: Option<u64>,
) -> Result<TrackingMode> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "label" | "by_label" => Ok(TrackingMode::ByLabel),
        "instance" | "by_instance" => Ok(TrackingMode::ByInstance {
            max_distance_px: max_distance_px.unwrap_or(DEFAULT_MATCH_DISTANCE_PX),
            max_missing_frames: max_missing_frames.unwrap_or(DEFAULT_MAX_MISSING_FRAMES),
        }),
        other => Err(anyhow!(
            "unknown tracking mode '{}' (expected label|instance)",
            other
        )),
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<AnalyzerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = AnalyzerConfig::from_file(AnalyzerConfigFile::default()).unwrap();
        assert_eq!(cfg.heuristics, HeuristicConfig::default());
        assert_eq!(cfg.output.alerts_path, PathBuf::from("alerts_log.csv"));
        assert_eq!(cfg.output.format, ExportFormat::Csv);
        assert!(cfg.output.db_path.is_none());
    }

    #[test]
    fn tracking_modes_parse() {
        assert_eq!(parse_tracking("label", None, None).unwrap(), TrackingMode::ByLabel);
        assert_eq!(
            parse_tracking("Instance", Some(40), None).unwrap(),
            TrackingMode::ByInstance {
                max_distance_px: 40,
                max_missing_frames: DEFAULT_MAX_MISSING_FRAMES,
            }
        );
        assert!(parse_tracking("kalman", None, None).is_err());
    }

    #[test]
    fn validation_rejects_empty_loiter_window_and_radius() {
        let mut cfg = AnalyzerConfig::default();
        cfg.heuristics.loiter_window = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalyzerConfig::default();
        cfg.heuristics.loiter_radius_px = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AnalyzerConfig::default();
        assert!(cfg.validate().is_ok());

        let mut cfg = AnalyzerConfig::default();
        cfg.heuristics.abandon_threshold = 0;
        cfg.heuristics.crowd_threshold = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(split_csv(" person, ,dog "), vec!["person", "dog"]);
    }
}
