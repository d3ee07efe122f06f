//! Configuration file support.
//!
//! Settings are stored as versioned JSON. On native targets the file lives
//! under the user's config directory.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants;
use crate::geometry::ZoomLimits;
use crate::mode::Mode;
use crate::model::{ActorId, RemoteId};
use crate::pagination::PageLimits;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "Error",
            LogLevel::Warn => "Warn",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
        }
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Surface configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub viewport: ViewportConfig,

    #[serde(default)]
    pub traversal: TraversalConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub autosave: AutosaveConfig,

    #[serde(default)]
    pub collaboration: CollaborationConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Clicks this soon after a drag ends are ignored.
    #[serde(default = "default_drag_click_guard_ms")]
    pub drag_click_guard_ms: u64,
}

fn default_drag_click_guard_ms() -> u64 {
    constants::DRAG_CLICK_GUARD_MS
}

/// User preferences section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Select the next marker after labelling or deleting the selection
    #[serde(default = "default_true")]
    pub auto_traversal: bool,

    /// Mode the surface starts in
    #[serde(default)]
    pub initial_mode: Mode,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            auto_traversal: true,
            initial_mode: Mode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,
    /// Marker diameter at zoom 1
    pub marker_size: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: constants::DEFAULT_MIN_ZOOM,
            max_zoom: constants::DEFAULT_MAX_ZOOM,
            zoom_step: constants::DEFAULT_ZOOM_STEP,
            marker_size: constants::DEFAULT_MARKER_SIZE,
        }
    }
}

impl ViewportConfig {
    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            min: self.min_zoom,
            max: self.max_zoom,
            step: self.zoom_step,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Reading-line height at zoom 1
    pub line_height: f32,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            line_height: constants::TRAVERSAL_LINE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Largest truncated distance that still counts as a match
    pub match_threshold: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            match_threshold: constants::MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub max_pages: usize,
    /// Jump to the last page when a result is added
    pub show_last: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: constants::DEFAULT_PAGE_SIZE,
            max_pages: constants::DEFAULT_MAX_PAGES,
            show_last: true,
        }
    }
}

impl PaginationConfig {
    pub fn limits(&self) -> PageLimits {
        PageLimits {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Minimum time between two draft saves
    pub save_interval_ms: u64,
    /// Quiet period after the last edit before a draft is saved
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_interval_ms: 20_000,
            debounce_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    /// Apply events broadcast by other participants
    pub active: bool,
    /// Local participant, used to drop echoes of our own saves
    pub actor: ActorId,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            active: false,
            actor: ActorId(0),
        }
    }
}

/// Server-side records describing the participant's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Task membership flagged `seen_all` once the required queue runs dry
    pub task_member: Option<RemoteId>,
    /// Shared task session pointed at each new required task
    pub task_session: Option<RemoteId>,
}

impl AnnotatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            preferences: Preferences::default(),
            viewport: ViewportConfig::default(),
            traversal: TraversalConfig::default(),
            scoring: ScoringConfig::default(),
            pagination: PaginationConfig::default(),
            autosave: AutosaveConfig::default(),
            collaboration: CollaborationConfig::default(),
            session: SessionConfig::default(),
            drag_click_guard_ms: default_drag_click_guard_ms(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }
        config.validate()?;

        Ok(config)
    }

    /// Reject values the surface cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let viewport = &self.viewport;
        if !viewport.zoom_limits().is_valid() {
            return Err(ConfigError::Invalid(format!(
                "zoom limits min={} max={} step={} (need 0 < min <= max and step > 0)",
                viewport.min_zoom, viewport.max_zoom, viewport.zoom_step
            )));
        }
        if !viewport.marker_size.is_finite() || viewport.marker_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "marker_size {} must be positive",
                viewport.marker_size
            )));
        }
        if !self.traversal.line_height.is_finite() || self.traversal.line_height <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "traversal line_height {} must be positive",
                self.traversal.line_height
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn default_filename() -> &'static str {
        "annotator-config.json"
    }

    /// Get the default config file path for auto-load/save.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<std::path::PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("annotator").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("annotator")
                    .join(Self::default_filename())
            })
        }
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save(&path)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
