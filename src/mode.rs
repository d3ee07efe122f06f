//! Interaction modes and the transitions between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnnotatorError;

/// Interaction mode of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Nothing accepts pointer input yet
    #[default]
    Uninitialized,
    /// Place markers and type a character label for each
    Transcription,
    /// Place markers tagged with the currently selected label
    Counting,
    /// Drag out two-point measurements
    Measure,
}

/// Which store receives pointer clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Markers,
    Measurements,
    Nothing,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Uninitialized => "uninitialized",
            Mode::Transcription => "transcription",
            Mode::Counting => "counting",
            Mode::Measure => "measure",
        }
    }

    /// Parse a mode name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uninitialized" => Some(Mode::Uninitialized),
            "transcription" => Some(Mode::Transcription),
            "counting" => Some(Mode::Counting),
            "measure" => Some(Mode::Measure),
            _ => None,
        }
    }

    /// Check if clicks in this mode create markers.
    pub fn accepts_markers(&self) -> bool {
        matches!(self, Mode::Transcription | Mode::Counting)
    }

    /// Check if clicks in this mode start measurements.
    pub fn accepts_measurements(&self) -> bool {
        matches!(self, Mode::Measure)
    }

    /// Counting needs a selected label; transcription labels afterwards.
    pub fn requires_label(&self) -> bool {
        matches!(self, Mode::Counting)
    }

    pub fn pointer_target(&self) -> PointerTarget {
        if self.accepts_markers() {
            PointerTarget::Markers
        } else if self.accepts_measurements() {
            PointerTarget::Measurements
        } else {
            PointerTarget::Nothing
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = AnnotatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::from_name(s).ok_or_else(|| AnnotatorError::invalid_mode(s))
    }
}

/// Result of a mode change, describing what the caller must tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
}

impl ModeTransition {
    /// Leaving measure mode cancels any pending measurement.
    pub fn leaves_measure(&self) -> bool {
        self.from == Mode::Measure && self.to != Mode::Measure
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn markers_visible(&self) -> bool {
        self.to != Mode::Measure
    }

    pub fn measurements_visible(&self) -> bool {
        self.to == Mode::Measure
    }
}

/// The mode state machine. Every target is reachable from every state.
#[derive(Debug, Clone, Default)]
pub struct ModeMachine {
    current: Mode,
}

impl ModeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Switch to `target`.
    pub fn change(&mut self, target: Mode) -> ModeTransition {
        let transition = ModeTransition {
            from: self.current,
            to: target,
        };
        self.current = target;
        log::debug!("🔀 Mode: {} -> {}", transition.from, transition.to);
        transition
    }

    /// Switch by name. Unknown names park the machine in `Uninitialized`,
    /// where no store accepts pointer input.
    pub fn change_named(&mut self, name: &str) -> ModeTransition {
        let target = match name.parse::<Mode>() {
            Ok(mode) => mode,
            Err(_) => {
                log::warn!("Unknown mode '{}', pointer input disabled", name);
                Mode::Uninitialized
            }
        };
        self.change(target)
    }
}
