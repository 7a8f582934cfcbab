//! Diatonic harmony - pure pitch-class math.
//!
//! Given a tonic frequency, a key, and a harmony mode, these functions pick
//! the interval ratios a harmonized triad is built from. Everything here is
//! stateless; the voice controller calls into this module on every retune.

/*
Picking the Third
=================

A harmonizer that always stacks a fixed interval on the played note sounds
wrong the moment the player leaves the tonic: in C major, a chord built on E
wants a MINOR third (E-G), while a chord built on C wants a MAJOR third (C-E).

The selection works in pitch-class space:

  1. Frequency -> nearest MIDI note:  n = round(12 * log2(f / 440) + 69)
  2. Pitch class:                     class = n mod 12        (C = 0)
  3. Degree relative to the key:      degree = (class - key + 12) mod 12

Then a per-mode table maps the degree to an interval:

  Major key     degree 0, 5, 7        -> major third (4 semitones)
                degree 2, 4, 9, 11    -> minor third (3 semitones)

  Natural minor degree 3, 8, 10       -> major third
                degree 0, 2, 5, 7     -> minor third

Degrees outside the scale fall back to a minor third, which is the safer
sound when the detector lands between scale tones. The two "fixed" modes
skip the table entirely.

The fifth is a perfect fifth (7 semitones) everywhere, except the optional
diatonic-fifth variant which flattens it to 6 semitones on the one scale
degree whose triad is diminished (the leading tone in major, the second
degree in natural minor).
*/

use serde::{Deserialize, Serialize};

/// How the third of the triad is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmonyMode {
    /// Diatonic selection within a major key.
    Major,
    /// Diatonic selection within a natural-minor key.
    Minor,
    /// Always a major third, key ignored.
    FixedMajor,
    /// Always a minor third, key ignored.
    FixedMinor,
}

impl HarmonyMode {
    pub fn label(self) -> &'static str {
        match self {
            HarmonyMode::Major => "Major",
            HarmonyMode::Minor => "Minor",
            HarmonyMode::FixedMajor => "Fix Maj",
            HarmonyMode::FixedMinor => "Fix Min",
        }
    }
}

/// Chromatic note names, C = 0.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Frequency ratio of an interval in equal temperament.
#[inline]
pub fn interval_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

/// Nearest MIDI note number for a frequency (A4 = 440 Hz = 69).
#[inline]
pub fn midi_from_freq(hz: f32) -> i32 {
    (12.0 * (hz / 440.0).log2() + 69.0).round() as i32
}

/// Pitch class (0-11, C = 0) of the nearest chromatic note.
#[inline]
pub fn pitch_class_from_freq(hz: f32) -> u8 {
    midi_from_freq(hz).rem_euclid(12) as u8
}

/// Display name of the nearest chromatic note.
pub fn note_name(hz: f32) -> &'static str {
    NOTE_NAMES[pitch_class_from_freq(hz) as usize]
}

/// Scale degree of a tonic relative to a key, in semitones (0-11).
#[inline]
fn relative_degree(tonic_hz: f32, key: u8) -> u8 {
    (pitch_class_from_freq(tonic_hz) + 12 - key % 12) % 12
}

/// Ratio of the third above a tonic, per the key/mode table above.
pub fn diatonic_third_ratio(tonic_hz: f32, key: u8, mode: HarmonyMode) -> f32 {
    let semitones = match mode {
        HarmonyMode::FixedMajor => 4,
        HarmonyMode::FixedMinor => 3,
        HarmonyMode::Major => match relative_degree(tonic_hz, key) {
            0 | 5 | 7 => 4,
            _ => 3,
        },
        HarmonyMode::Minor => match relative_degree(tonic_hz, key) {
            3 | 8 | 10 => 4,
            _ => 3,
        },
    };
    interval_ratio(semitones as f32)
}

/// Ratio of the fifth above a tonic.
///
/// A perfect fifth everywhere unless `diatonic_fifths` is enabled, in which
/// case the one diminished-triad degree of the scale gets a flattened fifth.
pub fn fifth_ratio(tonic_hz: f32, key: u8, mode: HarmonyMode, diatonic_fifths: bool) -> f32 {
    if diatonic_fifths {
        let diminished = match mode {
            HarmonyMode::Major => relative_degree(tonic_hz, key) == 11,
            HarmonyMode::Minor => relative_degree(tonic_hz, key) == 2,
            HarmonyMode::FixedMajor | HarmonyMode::FixedMinor => false,
        };
        if diminished {
            return interval_ratio(6.0);
        }
    }
    interval_ratio(7.0)
}
