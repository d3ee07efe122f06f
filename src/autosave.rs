//! Debounced draft saving.
//!
//! Marker edits mark the draft dirty. Once edits have settled for the
//! debounce delay, and at least the save interval has passed since the
//! previous draft, the surface sends a draft `response` through the same
//! remote-sync path as every other write.

use std::time::Duration;
use web_time::Instant;

use crate::config::AutosaveConfig;

/// Decides when a draft save is due.
///
/// The `*_at` methods take the current time explicitly; the plain ones read
/// the clock.
#[derive(Debug)]
pub struct DraftSaver {
    /// Minimum interval between saves.
    save_interval: Duration,

    /// Wait this long after the last edit before saving.
    debounce_delay: Duration,

    last_save: Option<Instant>,
    last_change: Option<Instant>,
    enabled: bool,
    dirty: bool,
}

impl DraftSaver {
    pub fn new(save_interval: Duration, debounce_delay: Duration) -> Self {
        Self {
            save_interval,
            debounce_delay,
            last_save: None,
            last_change: None,
            enabled: true,
            dirty: false,
        }
    }

    pub fn from_config(config: &AutosaveConfig) -> Self {
        let mut saver = Self::new(
            Duration::from_millis(config.save_interval_ms),
            Duration::from_millis(config.debounce_ms),
        );
        saver.enabled = config.enabled;
        saver
    }

    pub fn disabled() -> Self {
        let mut saver = Self::new(Duration::ZERO, Duration::ZERO);
        saver.enabled = false;
        saver
    }

    pub fn mark_dirty(&mut self) {
        self.mark_dirty_at(Instant::now());
    }

    pub fn mark_dirty_at(&mut self, now: Instant) {
        self.dirty = true;
        self.last_change = Some(now);
        log::trace!("Draft: marked dirty");
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn should_save(&self) -> bool {
        self.should_save_at(Instant::now())
    }

    /// True when enabled, dirty, settled for the debounce delay, and the
    /// save interval has passed since the previous save.
    pub fn should_save_at(&self, now: Instant) -> bool {
        if !self.enabled || !self.dirty {
            return false;
        }
        let Some(last_change) = self.last_change else {
            return false;
        };
        if now.saturating_duration_since(last_change) < self.debounce_delay {
            return false;
        }
        self.last_save
            .is_none_or(|last_save| now.saturating_duration_since(last_save) >= self.save_interval)
    }

    /// A draft was sent. The remote result is reported separately by the
    /// sync layer; a failed draft is simply superseded by the next one.
    pub fn mark_saved_at(&mut self, now: Instant) {
        self.last_save = Some(now);
        self.dirty = false;
        self.last_change = None;
        log::trace!("Draft: marked saved");
    }

    pub fn mark_saved(&mut self) {
        self.mark_saved_at(Instant::now());
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        log::debug!("Draft saving: enabled = {}", enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget pending changes and timing (after submit or reset).
    pub fn reset(&mut self) {
        self.last_save = None;
        self.last_change = None;
        self.dirty = false;
    }
}

impl Default for DraftSaver {
    fn default() -> Self {
        Self::from_config(&AutosaveConfig::default())
    }
}
