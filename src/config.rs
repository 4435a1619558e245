use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::StreamConfig;
use crate::record::{ContainerFormat, RecorderSettings};
use crate::track::{Hsv, HsvBounds, SegmenterKind, TrackerConfig, DEFAULT_MIN_RADIUS};

const DEFAULT_STREAM_URL: &str = "stub://target";
const DEFAULT_STREAM_FPS: u32 = 30;
const DEFAULT_STREAM_WIDTH: u32 = 960;
const DEFAULT_STREAM_HEIGHT: u32 = 720;
const DEFAULT_DEVICE: &str = "tello";
const DEFAULT_SPEED: u32 = 30;
const DEVICE_PATTERN: &str = r"^[a-z0-9_-]{1,32}$";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SkytrackConfigFile {
    stream: Option<StreamConfigFile>,
    tracker: Option<TrackerConfigFile>,
    recording: Option<RecordingConfigFile>,
    control: Option<ControlConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrackerConfigFile {
    lower: Option<Hsv>,
    upper: Option<Hsv>,
    min_radius: Option<f64>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RecordingConfigFile {
    pictures_dir: Option<PathBuf>,
    device: Option<String>,
    container: Option<String>,
    record_first: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ControlConfigFile {
    speed: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SkytrackConfig {
    pub stream: StreamConfig,
    pub tracker: TrackerSettings,
    pub recording: RecordingSettings,
    pub control: ControlSettings,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub lower: Hsv,
    pub upper: Hsv,
    pub min_radius: f64,
    pub backend: SegmenterKind,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    pub pictures_dir: PathBuf,
    pub device: String,
    pub container: ContainerFormat,
    pub record_first: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub speed: u32,
}

impl SkytrackConfig {
    /// Defaults, then the file named by `SKYTRACK_CONFIG`, then `SKYTRACK_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SKYTRACK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SkytrackConfigFile) -> Result<Self> {
        let stream = file.stream.unwrap_or_default();
        let tracker = file.tracker.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();
        let control = file.control.unwrap_or_default();
        let green = HsvBounds::green();

        let backend = tracker
            .backend
            .as_deref()
            .map(SegmenterKind::parse)
            .transpose()?
            .unwrap_or_default();
        let container = recording
            .container
            .as_deref()
            .map(ContainerFormat::parse)
            .transpose()?
            .unwrap_or_else(ContainerFormat::for_build);

        Ok(Self {
            stream: StreamConfig {
                url: stream.url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                fps: stream.fps.unwrap_or(DEFAULT_STREAM_FPS),
                width: stream.width.unwrap_or(DEFAULT_STREAM_WIDTH),
                height: stream.height.unwrap_or(DEFAULT_STREAM_HEIGHT),
            },
            tracker: TrackerSettings {
                lower: tracker.lower.unwrap_or(green.lower()),
                upper: tracker.upper.unwrap_or(green.upper()),
                min_radius: tracker.min_radius.unwrap_or(DEFAULT_MIN_RADIUS),
                backend,
            },
            recording: RecordingSettings {
                pictures_dir: recording.pictures_dir.unwrap_or_else(default_pictures_dir),
                device: recording
                    .device
                    .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                container,
                record_first: recording.record_first,
            },
            control: ControlSettings {
                speed: control.speed.unwrap_or(DEFAULT_SPEED),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SKYTRACK_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url;
            }
        }
        if let Ok(dir) = std::env::var("SKYTRACK_PICTURES_DIR") {
            if !dir.trim().is_empty() {
                self.recording.pictures_dir = PathBuf::from(dir);
            }
        }
        if let Ok(device) = std::env::var("SKYTRACK_DEVICE") {
            if !device.trim().is_empty() {
                self.recording.device = device;
            }
        }
        if let Ok(container) = std::env::var("SKYTRACK_CONTAINER") {
            if !container.trim().is_empty() {
                self.recording.container = ContainerFormat::parse(&container)?;
            }
        }
        if let Ok(backend) = std::env::var("SKYTRACK_TRACKER_BACKEND") {
            if !backend.trim().is_empty() {
                self.tracker.backend = SegmenterKind::parse(&backend)?;
            }
        }
        if let Ok(speed) = std::env::var("SKYTRACK_SPEED") {
            self.control.speed = speed
                .trim()
                .parse()
                .map_err(|_| anyhow!("SKYTRACK_SPEED must be an integer between 1 and 100"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let device_re = Regex::new(DEVICE_PATTERN)?;
        self.recording.device = self.recording.device.trim().to_lowercase();
        if !device_re.is_match(&self.recording.device) {
            return Err(anyhow!(
                "device name '{}' must match {}",
                self.recording.device,
                DEVICE_PATTERN
            ));
        }
        self.tracker_bounds()?;
        if !(self.tracker.min_radius.is_finite() && self.tracker.min_radius >= 0.0) {
            return Err(anyhow!("tracker min_radius must be a non-negative number"));
        }
        if !(1..=100).contains(&self.control.speed) {
            return Err(anyhow!("control speed must be between 1 and 100"));
        }
        if self.stream.fps == 0 {
            return Err(anyhow!("stream fps must be greater than zero"));
        }
        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(anyhow!("stream width and height must be greater than zero"));
        }
        if self.recording.record_first == Some(0) {
            return Err(anyhow!("record_first must be greater than zero when set"));
        }
        Ok(())
    }

    pub fn tracker_bounds(&self) -> Result<HsvBounds> {
        HsvBounds::new(self.tracker.lower, self.tracker.upper)
    }

    pub fn tracker_config(&self) -> Result<TrackerConfig> {
        Ok(TrackerConfig {
            bounds: self.tracker_bounds()?,
            min_radius: self.tracker.min_radius,
            annotate: true,
        })
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            pictures_dir: self.recording.pictures_dir.clone(),
            device: self.recording.device.clone(),
        }
    }
}

fn default_pictures_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Pictures"))
        .unwrap_or_else(|| PathBuf::from("Pictures"))
}

fn read_config_file(path: &Path) -> Result<SkytrackConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
