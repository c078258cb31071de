//! Presets, tool locations and input limits.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::CleanupPolicy;
use crate::error::{Error, Result};
use crate::reducer::{ReductionConfig, ReductionMode};

pub const CONFIG_DIR: &str = "vidascii";
pub const CONFIG_STEM: &str = "vidascii";

/// Named quality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub columns: u32,
    /// Cell height as a fraction of cell width
    pub scale: f64,
    /// Output frames per second; also the default sampling stride
    pub frame_rate: u32,
    pub color: bool,
}

impl Preset {
    pub fn mode(&self) -> ReductionMode {
        if self.color {
            ReductionMode::Color
        } else {
            ReductionMode::Grayscale
        }
    }

    pub fn reduction(&self) -> ReductionConfig {
        ReductionConfig::new(self.columns, self.scale, self.mode())
    }
}

fn default_font_size() -> f32 {
    12.0
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["mp4".to_string(), "mov".to_string(), "avi".to_string()]
}

fn default_max_input_bytes() -> u64 {
    200 * 1024 * 1024
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub presets: HashMap<String, Preset>,
    pub default_preset: String,
    /// TrueType font used instead of the built-in bitmap font
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let preset = |columns, frame_rate| Preset {
            columns,
            scale: 0.5,
            frame_rate,
            color: true,
        };
        Self {
            presets: HashMap::from([
                ("default".to_string(), preset(100, 5)),
                ("small".to_string(), preset(50, 5)),
                ("large".to_string(), preset(200, 10)),
            ]),
            default_preset: "default".to_string(),
            font_path: None,
            font_size: default_font_size(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            cleanup: CleanupPolicy::default(),
            allowed_extensions: default_allowed_extensions(),
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

impl AppConfig {
    /// Read a config file; `.toml` files are TOML, anything else JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: AppConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        cfg.validate()
            .map_err(|e| Error::invalid_config(format!("{}: {}", path.display(), e)))?;
        Ok(cfg)
    }

    /// First config found in the user config dir, then the working
    /// directory; built-in defaults otherwise.
    pub fn load() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            let dir = dir.join(CONFIG_DIR);
            paths.push(dir.join(format!("{}.toml", CONFIG_STEM)));
            paths.push(dir.join(format!("{}.json", CONFIG_STEM)));
        }
        paths.push(PathBuf::from(format!("{}.toml", CONFIG_STEM)));
        paths.push(PathBuf::from(format!("{}.json", CONFIG_STEM)));
        paths
    }

    pub fn preset(&self, name: &str) -> Result<&Preset> {
        self.presets
            .get(name)
            .ok_or_else(|| Error::invalid_config(format!("missing preset '{}'", name)))
    }

    pub fn active_preset(&self) -> Result<&Preset> {
        self.preset(&self.default_preset)
    }

    pub fn input_policy(&self) -> InputPolicy {
        InputPolicy {
            allowed_extensions: self.allowed_extensions.clone(),
            max_bytes: self.max_input_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        let preset = self.active_preset()?;
        for (name, p) in &self.presets {
            p.reduction()
                .validate()
                .map_err(|e| Error::invalid_config(format!("preset '{}': {}", name, e)))?;
            if p.frame_rate == 0 {
                return Err(Error::invalid_config(format!("preset '{}': frame_rate must be at least 1", name)));
            }
        }
        debug!("Default preset: {:?}", preset);
        Ok(())
    }
}

/// Which input files are accepted before any decoding happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: u64,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_bytes: default_max_input_bytes(),
        }
    }
}

impl InputPolicy {
    pub fn check(&self, path: &Path) -> Result<()> {
        let reject = |reason: String| Error::UnsupportedInput {
            path: path.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|e| reject(e.to_string()))?;
        if !meta.is_file() {
            return Err(reject("not a regular file".to_string()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(reject(format!(
                "extension '{}' is not one of {}",
                ext,
                self.allowed_extensions.join(", ")
            )));
        }

        if meta.len() > self.max_bytes {
            return Err(reject(format!(
                "{} bytes exceeds the {} byte limit",
                meta.len(),
                self.max_bytes
            )));
        }
        Ok(())
    }
}
