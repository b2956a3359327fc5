//! Annotation configuration.
//!
//! Loaded from a TOML file passed on the command line, or defaulted. Every
//! section is optional; missing keys fall back to `Default`.
//!
//! ```toml
//! enabled = true
//! date_format = "relative"
//! fetch_messages = true
//!
//! [gutter]
//! template = "${revision} ${author} ${date}"
//!
//! [inline]
//! current_line_only = true
//! max_message_length = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Relative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeFileConfig {
    pub line_threshold: usize,
    pub warn: bool,
}

impl Default for LargeFileConfig {
    fn default() -> Self {
        Self {
            line_threshold: 5000,
            warn: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GutterConfig {
    pub text: bool,
    pub icon: bool,
    pub template: String,
}

impl Default for GutterConfig {
    fn default() -> Self {
        Self {
            text: true,
            icon: true,
            template: "${revision} ${author} ${date}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineConfig {
    pub enabled: bool,
    pub current_line_only: bool,
    pub show_message: bool,
    pub max_message_length: usize,
    pub template: String,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            current_line_only: true,
            show_message: true,
            max_message_length: 50,
            template: "${author}, ${date} • ${message}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub enabled: bool,
    pub auto_trigger_on_open: bool,
    pub date_format: DateFormat,
    pub large_file: LargeFileConfig,
    pub gutter: GutterConfig,
    pub inline: InlineConfig,
    pub fetch_messages: bool,
    /// Quiet period before a UI event triggers a render pass
    pub debounce_ms: u64,
    pub attribution_cache_capacity: usize,
    pub message_cache_capacity: usize,
    /// Skip message enrichment when a document touches more revisions than this
    pub max_enrichment_revisions: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_trigger_on_open: true,
            date_format: DateFormat::default(),
            large_file: LargeFileConfig::default(),
            gutter: GutterConfig::default(),
            inline: InlineConfig::default(),
            fetch_messages: true,
            debounce_ms: 300,
            attribution_cache_capacity: 20,
            message_cache_capacity: 500,
            max_enrichment_revisions: 100,
        }
    }
}

impl AnnotationConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.attribution_cache_capacity == 0 {
            return Err(AppError::Config(
                "attribution_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.message_cache_capacity == 0 {
            return Err(AppError::Config(
                "message_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.gutter.text && self.gutter.template.trim().is_empty() {
            return Err(AppError::Config("gutter.template is empty".to_string()));
        }
        if self.inline.enabled && self.inline.template.trim().is_empty() {
            return Err(AppError::Config("inline.template is empty".to_string()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Whether any surface will show a commit message, so enrichment is worth
    /// fetching.
    pub fn wants_messages(&self) -> bool {
        if !self.fetch_messages {
            return false;
        }
        let gutter = self.gutter.text && self.gutter.template.contains("${message}");
        let inline = self.inline.enabled
            && (self.inline.show_message || self.inline.template.contains("${message}"));
        gutter || inline
    }
}
