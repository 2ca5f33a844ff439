use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{pipeline::hands::HandsOptions, types::FrameSize};

const CONFIG_ENV: &str = "HAND_CAPTURE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub camera: CameraConfig,
    pub hands: HandsOptions,
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Origin the `/extract` endpoint is resolved against.
    pub origin: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub refresh_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub model_dir: PathBuf,
    pub model_base_url: String,
    pub poll_interval_ms: u64,
    pub load_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            refresh_interval_ms: 16,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            model_base_url:
                "https://raw.githubusercontent.com/214zzl995/gesture-universe/refs/heads/main/models"
                    .to_string(),
            poll_interval_ms: 100,
            load_timeout_ms: 8000,
        }
    }
}

impl CameraConfig {
    pub fn target(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl AppConfig {
    /// Loads from `$HAND_CAPTURE_CONFIG`, else `config.json`, else defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            match serde_json::from_str::<AppConfig>(&content) {
                Ok(config) => {
                    log::info!("loaded configuration from {}", path.display());
                    config
                }
                Err(err) => {
                    log::warn!("error parsing {}: {err}; using defaults", path.display());
                    Self::default()
                }
            }
        } else {
            log::info!("no configuration at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.backend.origin)
            .with_context(|| format!("backend origin {:?} is not a URL", self.backend.origin))?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        self.hands.validate()
    }
}
