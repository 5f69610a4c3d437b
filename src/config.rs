use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";
const DEFAULT_IMAGES_DIR: &str = "/media/cat_detector";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_CHANNEL: u8 = 0;
const DEFAULT_BURST_COUNT: u32 = 3;
const DEFAULT_BURST_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_RETENTION_DAYS: u32 = 7;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AUTOMATION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
pub const DEFAULT_AUTOMATION_PRIMARY_URL: &str =
    "http://supervisor/core/api/services/automation/trigger";
pub const DEFAULT_AUTOMATION_FALLBACK_URL: &str =
    "http://homeassistant:8123/api/services/automation/trigger";

/// Raw options file. Key names match the Home Assistant add-on options.
#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    camera_ip: Option<String>,
    username: Option<String>,
    password: Option<String>,
    channel: Option<u8>,
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    classifier: Option<String>,
    save_images: Option<bool>,
    images_dir: Option<PathBuf>,
    burst_count: Option<u32>,
    burst_interval_secs: Option<f64>,
    retention_days: Option<u32>,
    poll_interval_ms: Option<u64>,
    automation_with_prey: Option<String>,
    automation_without_prey: Option<String>,
    automation_primary_url: Option<String>,
    automation_fallback_url: Option<String>,
    classifier_timeout_secs: Option<u64>,
    automation_timeout_secs: Option<u64>,
    shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Gemini,
    Stub,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub camera: CameraSettings,
    pub classifier: ClassifierSettings,
    pub evidence: EvidenceSettings,
    pub burst: BurstSettings,
    pub automation: AutomationSettings,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Host, `http(s)://host[:port]`, or `stub://name` for the synthetic camera.
    pub address: String,
    pub username: String,
    pub password: String,
    pub channel: u8,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub kind: ClassifierKind,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EvidenceSettings {
    pub save_images: bool,
    pub images_dir: PathBuf,
    /// Zero disables the retention sweep.
    pub retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct BurstSettings {
    pub count: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AutomationSettings {
    pub with_prey: String,
    pub without_prey: String,
    pub primary_url: String,
    pub fallback_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl CameraSettings {
    pub fn is_stub(&self) -> bool {
        self.address.starts_with("stub://")
    }
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG`, falling back to the add-on options file when present.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_OPTIONS_PATH);
                default.exists().then_some(default)
            });
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let kind = match file.classifier.as_deref() {
            None | Some("gemini") => ClassifierKind::Gemini,
            Some("stub") => ClassifierKind::Stub,
            Some(other) => {
                return Err(anyhow!(
                    "unknown classifier '{}'; expected gemini or stub",
                    other
                ))
            }
        };
        let burst_interval_secs = file
            .burst_interval_secs
            .unwrap_or(DEFAULT_BURST_INTERVAL_SECS);
        if !burst_interval_secs.is_finite() || burst_interval_secs < 0.0 {
            return Err(anyhow!("burst_interval_secs must be a non-negative number"));
        }
        let burst_interval = Duration::try_from_secs_f64(burst_interval_secs)
            .map_err(|e| anyhow!("burst_interval_secs out of range: {}", e))?;

        Ok(Self {
            camera: CameraSettings {
                address: file.camera_ip.unwrap_or_default(),
                username: file.username.unwrap_or_default(),
                password: file.password.unwrap_or_default(),
                channel: file.channel.unwrap_or(DEFAULT_CHANNEL),
            },
            classifier: ClassifierSettings {
                kind,
                api_key: file.gemini_api_key.unwrap_or_default(),
                model: file
                    .gemini_model
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                timeout: Duration::from_secs(
                    file.classifier_timeout_secs
                        .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
                ),
            },
            evidence: EvidenceSettings {
                save_images: file.save_images.unwrap_or(true),
                images_dir: file
                    .images_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGES_DIR)),
                retention_days: file.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
            },
            burst: BurstSettings {
                count: file.burst_count.unwrap_or(DEFAULT_BURST_COUNT),
                interval: burst_interval,
            },
            automation: AutomationSettings {
                with_prey: file.automation_with_prey.unwrap_or_default(),
                without_prey: file.automation_without_prey.unwrap_or_default(),
                primary_url: file
                    .automation_primary_url
                    .unwrap_or_else(|| DEFAULT_AUTOMATION_PRIMARY_URL.to_string()),
                fallback_url: file
                    .automation_fallback_url
                    .unwrap_or_else(|| DEFAULT_AUTOMATION_FALLBACK_URL.to_string()),
                token: None,
                timeout: Duration::from_secs(
                    file.automation_timeout_secs
                        .unwrap_or(DEFAULT_AUTOMATION_TIMEOUT_SECS),
                ),
            },
            poll_interval: Duration::from_millis(
                file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            shutdown_grace: Duration::from_secs(
                file.shutdown_grace_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(address) = std::env::var("SENTINEL_CAMERA_IP") {
            if !address.trim().is_empty() {
                self.camera.address = address;
            }
        }
        if let Ok(dir) = std::env::var("SENTINEL_IMAGES_DIR") {
            if !dir.trim().is_empty() {
                self.evidence.images_dir = PathBuf::from(dir);
            }
        }
        if let Ok(count) = std::env::var("SENTINEL_BURST_COUNT") {
            self.burst.count = count
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_BURST_COUNT must be a positive integer"))?;
        }
        if let Ok(days) = std::env::var("SENTINEL_RETENTION_DAYS") {
            self.evidence.retention_days = days
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTINEL_RETENTION_DAYS must be an integer number of days"))?;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.classifier.api_key = key;
            }
        }
        if let Ok(token) = std::env::var("SUPERVISOR_TOKEN") {
            if !token.trim().is_empty() {
                self.automation.token = Some(token);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.camera.address.trim().is_empty() {
            missing.push("camera_ip");
        }
        if !self.camera.is_stub() {
            if self.camera.username.is_empty() {
                missing.push("username");
            }
            if self.camera.password.is_empty() {
                missing.push("password");
            }
        }
        if self.classifier.kind == ClassifierKind::Gemini && self.classifier.api_key.is_empty() {
            missing.push("gemini_api_key");
        }
        if !missing.is_empty() {
            return Err(anyhow!(
                "incomplete configuration; missing fields: {}",
                missing.join(", ")
            ));
        }

        if self.burst.count == 0 {
            return Err(anyhow!("burst_count must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        for url in [&self.automation.primary_url, &self.automation.fallback_url] {
            url::Url::parse(url).map_err(|e| anyhow!("invalid automation url {}: {}", url, e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
