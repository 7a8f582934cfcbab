//! The oscillator-bank seam the engine writes through.
//!
//! Everything the engine does to sound ends in one of these calls. They are
//! fire-and-forget parameter writes: no return values, no blocking, safe to
//! issue from the control loop every cycle.

use std::sync::atomic::{AtomicU32, Ordering};

/// Harmonic roles of the triad. Each role owns up to
/// [`MAX_OSCS_PER_ROLE`] oscillator slots, depending on the active timbre.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Root,
    Third,
    Fifth,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Root, Role::Third, Role::Fifth];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Role::Root => 0,
            Role::Third => 1,
            Role::Fifth => 2,
        }
    }

    #[inline]
    pub fn from_index(index: usize) -> Role {
        Role::ALL[index % 3]
    }
}

/// Oscillator waveform shapes the timbre table selects between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
}

/// Where the synthesized voices go relative to the dry instrument signal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub enum OutputRouting {
    /// Dry input mixed with the synth voices (normal pedal operation).
    MixWithDry,
    /// Synth voices only.
    SynthOnly,
}

impl OutputRouting {
    pub fn label(self) -> &'static str {
        match self {
            OutputRouting::MixWithDry => "Mix",
            OutputRouting::SynthOnly => "Synth",
        }
    }
}

pub const MAX_OSCS_PER_ROLE: usize = 3;

/// Mixer gain a role sits at when the arpeggiator is not muting it.
pub const SYNTH_GAIN: f32 = 0.8;

/// Per-oscillator parameter writes, per-role via [`RoleGains`].
///
/// Implementors must tolerate writes to slots the current timbre does not
/// use; the controller zeroes them rather than tracking which are live.
pub trait VoiceBank {
    fn set_frequency(&mut self, role: Role, slot: usize, hz: f32);
    fn set_amplitude(&mut self, role: Role, slot: usize, amplitude: f32);
    fn set_waveform(&mut self, role: Role, slot: usize, waveform: Waveform);

    /// Route selection is a mixer concern; banks without a dry path ignore it.
    fn set_routing(&mut self, _routing: OutputRouting) {}

    /// Zero every oscillator amplitude across all roles and slots.
    fn silence(&mut self) {
        for role in Role::ALL {
            for slot in 0..MAX_OSCS_PER_ROLE {
                self.set_amplitude(role, slot, 0.0);
            }
        }
    }
}

/// Per-role mixer gains, shared between the control loop, the arpeggiator
/// clock thread, and the audio renderer.
///
/// Each gain is a single atomic cell holding f32 bits, so no reader can
/// observe a half-written update - the whole table carries no invariant
/// spanning more than one cell.
#[derive(Debug)]
pub struct RoleGains {
    cells: [AtomicU32; 3],
}

impl RoleGains {
    pub fn new(gain: f32) -> Self {
        Self {
            cells: [
                AtomicU32::new(gain.to_bits()),
                AtomicU32::new(gain.to_bits()),
                AtomicU32::new(gain.to_bits()),
            ],
        }
    }

    pub fn set(&self, role: Role, gain: f32) {
        self.cells[role.index()].store(gain.to_bits(), Ordering::Release);
    }

    pub fn get(&self, role: Role) -> f32 {
        f32::from_bits(self.cells[role.index()].load(Ordering::Acquire))
    }

    pub fn set_all(&self, gain: f32) {
        for role in Role::ALL {
            self.set(role, gain);
        }
    }

    /// Roles currently above zero gain.
    pub fn unmuted(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|&r| self.get(r) > 0.0)
            .collect()
    }
}

impl Default for RoleGains {
    fn default() -> Self {
        Self::new(SYNTH_GAIN)
    }
}
