//! Persistent performance settings.
//!
//! A `SettingsSnapshot` is everything the pedal remembers across power
//! cycles. Loading NEVER fails: a missing, unreadable, or corrupt store
//! yields validated defaults, because a pedal that boots into a panic is a
//! brick. Saving reports its error and the control loop carries on.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::arp::ArpMode;
use crate::harmony::HarmonyMode;
use crate::pitch::Instrument;
use crate::voice::bank::OutputRouting;
use crate::voice::controller::StopMode;
use crate::voice::timbre::Timbre;

pub const OCTAVE_SHIFT_MIN: i8 = -1;
pub const OCTAVE_SHIFT_MAX: i8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    /// Key as a chromatic pitch class, C = 0.
    pub key: u8,
    pub mode: HarmonyMode,
    /// Octaves the whole chord is shifted by, -1..=2.
    pub octave_shift: i8,
    pub timbre: Timbre,
    pub arp_mode: ArpMode,
    pub routing: OutputRouting,
    pub stop_mode: StopMode,
    pub instrument: Instrument,
    /// Mute the chord while a fresh listening window settles.
    pub muting: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            key: 0, // C
            mode: HarmonyMode::Major,
            octave_shift: 0,
            timbre: Timbre::Sine,
            arp_mode: ArpMode::Poly,
            routing: OutputRouting::MixWithDry,
            stop_mode: StopMode::Fade,
            instrument: Instrument::Guitar,
            muting: false,
        }
    }
}

impl SettingsSnapshot {
    /// Clamp every numeric field into range. Enum fields are already
    /// in-range by construction once deserialized.
    pub fn validated(mut self) -> Self {
        if self.key > 11 {
            self.key = SettingsSnapshot::default().key;
        }
        self.octave_shift = self.octave_shift.clamp(OCTAVE_SHIFT_MIN, OCTAVE_SHIFT_MAX);
        self
    }
}

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "settings io error: {e}"),
            SettingsError::Serialize(e) => write!(f, "settings serialize error: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<io::Error> for SettingsError {
    fn from(e: io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Serialize(e)
    }
}

pub trait SettingsStore {
    /// Load the stored snapshot; any kind of failure yields defaults.
    fn load(&self) -> SettingsSnapshot;

    fn save(&self, settings: &SettingsSnapshot) -> Result<(), SettingsError>;
}

/// Settings as a JSON file next to the project/config directory.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> SettingsSnapshot {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str::<SettingsSnapshot>(&text).ok())
            .map(SettingsSnapshot::validated)
            .unwrap_or_default()
    }

    fn save(&self, settings: &SettingsSnapshot) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}
