//! Timbre models - a closed table of oscillator configurations.
//!
//! Every timbre is fully described by one row: how many oscillators back
//! each harmonic role, how they are detuned against the role's base
//! frequency, how the role's amplitude is split across them, and which
//! waveform they run. The controller dispatches on the table instead of
//! carrying per-timbre code paths.

use serde::{Deserialize, Serialize};

use super::bank::{Waveform, MAX_OSCS_PER_ROLE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timbre {
    /// One clean sine per role.
    Sine,
    /// Three slightly detuned sines per role, vibrato applied while sustaining.
    Organ,
    /// Primary sine plus a quieter detuned companion; release decays over 2 s.
    Rhodes,
    /// Two detuned sawtooths per role for an ensemble spread.
    Strings,
    /// Delegates playback to the sample-player collaborator; no oscillators.
    Sample,
}

/// One row of the timbre table.
#[derive(Clone, Copy, Debug)]
pub struct TimbreSpec {
    /// Oscillators backing each role (0 for the sample timbre).
    pub oscs_per_role: usize,
    pub waveform: Waveform,
    /// Frequency multiplier per slot, relative to the role's base frequency.
    pub detunes: [f32; MAX_OSCS_PER_ROLE],
    /// Share of the role's amplitude per slot; live slots sum to 1.
    pub amp_split: [f32; MAX_OSCS_PER_ROLE],
}

impl Timbre {
    pub const ALL: [Timbre; 5] = [
        Timbre::Sine,
        Timbre::Organ,
        Timbre::Rhodes,
        Timbre::Strings,
        Timbre::Sample,
    ];

    pub fn spec(self) -> TimbreSpec {
        match self {
            Timbre::Sine => TimbreSpec {
                oscs_per_role: 1,
                waveform: Waveform::Sine,
                detunes: [1.0, 1.0, 1.0],
                amp_split: [1.0, 0.0, 0.0],
            },
            Timbre::Organ => TimbreSpec {
                oscs_per_role: 3,
                waveform: Waveform::Sine,
                // +/- ~3.5 cents around the base
                detunes: [1.0, 1.002, 0.998],
                amp_split: [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
            },
            Timbre::Rhodes => TimbreSpec {
                oscs_per_role: 2,
                waveform: Waveform::Sine,
                // +2.6 cents - subtle bell-like chorus
                detunes: [1.0, 1.0015, 1.0],
                amp_split: [0.65, 0.35, 0.0],
            },
            Timbre::Strings => TimbreSpec {
                oscs_per_role: 2,
                waveform: Waveform::Sawtooth,
                // +6.9 cents - wider detune for the ensemble effect
                detunes: [1.0, 1.004, 1.0],
                amp_split: [0.5, 0.5, 0.0],
            },
            Timbre::Sample => TimbreSpec {
                oscs_per_role: 0,
                waveform: Waveform::Sine,
                detunes: [1.0, 1.0, 1.0],
                amp_split: [0.0, 0.0, 0.0],
            },
        }
    }

    /// The sample timbre bypasses the oscillator path entirely.
    pub fn is_sample(self) -> bool {
        self == Timbre::Sample
    }

    pub fn label(self) -> &'static str {
        match self {
            Timbre::Sine => "Sine",
            Timbre::Organ => "Organ",
            Timbre::Rhodes => "Rhodes",
            Timbre::Strings => "Strings",
            Timbre::Sample => "Sample",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_splits_sum_to_one() {
        for timbre in Timbre::ALL {
            let spec = timbre.spec();
            let sum: f32 = spec.amp_split[..spec.oscs_per_role].iter().sum();
            if spec.oscs_per_role > 0 {
                assert!(
                    (sum - 1.0).abs() < 1e-6,
                    "{:?} split sums to {sum}",
                    timbre
                );
            } else {
                assert_eq!(sum, 0.0);
            }
        }
    }

    #[test]
    fn oscillator_counts_match_the_models() {
        assert_eq!(Timbre::Sine.spec().oscs_per_role, 1);
        assert_eq!(Timbre::Organ.spec().oscs_per_role, 3);
        assert_eq!(Timbre::Rhodes.spec().oscs_per_role, 2);
        assert_eq!(Timbre::Strings.spec().oscs_per_role, 2);
        assert_eq!(Timbre::Sample.spec().oscs_per_role, 0);
    }

    #[test]
    fn strings_is_the_only_sawtooth_model() {
        for timbre in Timbre::ALL {
            let expected = if timbre == Timbre::Strings {
                Waveform::Sawtooth
            } else {
                Waveform::Sine
            };
            assert_eq!(timbre.spec().waveform, expected);
        }
    }

    #[test]
    fn primary_slot_is_never_detuned() {
        for timbre in Timbre::ALL {
            assert_eq!(timbre.spec().detunes[0], 1.0);
        }
    }
}
