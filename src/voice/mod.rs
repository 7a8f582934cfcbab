//! Chord voices - the audio-voice abstraction and the controller driving it.
//!
//! `bank` defines the seam to the oscillator hardware (or the software bank
//! in `crate::synth`), `timbre` the closed table of oscillator
//! configurations, and `controller` the chord lifecycle that writes through
//! the seam.

/// Oscillator-bank seam and the shared mixer-gain table.
pub mod bank;
/// Chord lifecycle: start, retune, volume, fade, decay, vibrato.
pub mod controller;
/// Closed set of oscillator configurations.
pub mod timbre;

pub use bank::{Role, RoleGains, VoiceBank, Waveform, MAX_OSCS_PER_ROLE, SYNTH_GAIN};
pub use controller::{ChordPhase, VoiceController};
pub use timbre::{Timbre, TimbreSpec};
