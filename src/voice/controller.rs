//! Chord lifecycle - start, retune, volume, fade, decay, vibrato.
//!
//! `VoiceController` owns every oscillator parameter write. A chord moves
//! through a small phase machine:
//!
//! ```text
//! Silent -> Sustaining -> Fading   -> Silent      (FS2 stop, fade mode)
//!                      -> Decaying -> Silent      (Rhodes release)
//! ```
//!
//! While Fading or Decaying, amplitude is a pure function of elapsed time;
//! external volume updates are ignored until the envelope finishes or is
//! aborted. Completion always suppresses the chord, which blocks the
//! orchestrator's auto-restart until the next explicit start.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::harmony::{self, HarmonyMode};
use crate::sample::{SampleError, SamplePlayer};

use super::bank::{OutputRouting, Role, RoleGains, VoiceBank, MAX_OSCS_PER_ROLE, SYNTH_GAIN};
use super::timbre::Timbre;

/// What FS2 does to a sounding chord.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    /// Ramp down over the configured fade duration.
    Fade,
    /// Zero all voices on the spot.
    Immediate,
}

impl StopMode {
    pub fn label(self) -> &'static str {
        match self {
            StopMode::Fade => "Fade",
            StopMode::Immediate => "Cut",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChordPhase {
    Silent,
    Sustaining,
    Fading,
    Decaying,
}

/// Default fade-out when stopping in fade mode.
pub const FADE_DURATION_MS: u64 = 1500;
/// Rhodes release decay after the listening window closes.
pub const DECAY_DURATION_MS: u64 = 2000;

const VIBRATO_RATE_HZ: f64 = 6.0;
const VIBRATO_DEPTH: f32 = 0.015; // +/- 1.5%

#[derive(Clone, Copy, Debug)]
struct ChordState {
    tonic: f32,
    key: u8,
    mode: HarmonyMode,
    amplitude: f32,
    phase: ChordPhase,
    phase_started_ms: u64,
    phase_start_amplitude: f32,
    suppressed: bool,
}

impl ChordState {
    fn new() -> Self {
        Self {
            tonic: 0.0,
            key: 0,
            mode: HarmonyMode::Major,
            amplitude: 0.0,
            phase: ChordPhase::Silent,
            phase_started_ms: 0,
            phase_start_amplitude: 0.0,
            // Suppressed until the performer arms the first chord.
            suppressed: true,
        }
    }
}

pub struct VoiceController<B: VoiceBank> {
    bank: B,
    gains: Arc<RoleGains>,
    sampler: Option<Box<dyn SamplePlayer>>,
    sample_path: Option<PathBuf>,
    sample_error: Option<SampleError>,

    timbre: Timbre,
    octave_shift: i8,
    stop_mode: StopMode,
    fade_ms: u64,
    diatonic_fifths: bool,

    chord: ChordState,
    /// Unmodulated base frequency per role, kept for vibrato and retunes.
    base_freqs: [f32; 3],
}

impl<B: VoiceBank> VoiceController<B> {
    pub fn new(bank: B, gains: Arc<RoleGains>) -> Self {
        Self {
            bank,
            gains,
            sampler: None,
            sample_path: None,
            sample_error: None,
            timbre: Timbre::Sine,
            octave_shift: 0,
            stop_mode: StopMode::Fade,
            fade_ms: FADE_DURATION_MS,
            diatonic_fifths: false,
            chord: ChordState::new(),
            base_freqs: [0.0; 3],
        }
    }

    /// Start (or restart) the chord.
    ///
    /// A non-positive `tonic_hint` falls back to the previous chord's tonic;
    /// with no tonic at all the chord arms active-but-silent and sounds on
    /// the first valid pitch sample, instead of jumping in on a guess.
    pub fn start_chord(
        &mut self,
        volume: f32,
        tonic_hint: f32,
        key: u8,
        mode: HarmonyMode,
        now_ms: u64,
    ) {
        let tonic = if tonic_hint > 0.0 {
            tonic_hint
        } else {
            self.chord.tonic
        };

        self.chord.key = key % 12;
        self.chord.mode = mode;
        self.chord.tonic = tonic;
        self.chord.amplitude = volume;
        self.chord.suppressed = false;
        self.chord.phase = ChordPhase::Sustaining;
        self.chord.phase_started_ms = now_ms;
        self.chord.phase_start_amplitude = volume;

        // Every start passes through silence so no oscillator carries
        // residual energy from a previous timbre or chord.
        self.bank.silence();

        if self.timbre.is_sample() {
            self.play_sample(volume);
        } else if tonic > 0.0 {
            self.init_oscillators(tonic, volume);
        }
    }

    /// Restart the chord armed-but-silent, discarding the previous tonic.
    /// It sounds again on the next valid pitch sample.
    pub fn start_chord_pending(
        &mut self,
        volume: f32,
        key: u8,
        mode: HarmonyMode,
        now_ms: u64,
    ) {
        self.chord.tonic = 0.0;
        self.start_chord(volume, 0.0, key, mode, now_ms);
    }

    /// Retune the sounding chord without touching amplitude. No-op when the
    /// chord is inactive, the tonic is invalid, or the sample timbre plays.
    pub fn update_tonic(&mut self, tonic_hz: f32, key: u8, mode: HarmonyMode) {
        if !self.is_active() || tonic_hz <= 0.0 || self.timbre.is_sample() {
            return;
        }
        self.chord.key = key % 12;
        self.chord.mode = mode;

        if self.chord.tonic <= 0.0 {
            // A blind start completing: first valid pitch brings the chord up.
            self.chord.tonic = tonic_hz;
            self.init_oscillators(tonic_hz, self.chord.amplitude);
        } else {
            self.chord.tonic = tonic_hz;
            self.write_frequencies(tonic_hz);
        }
    }

    /// Re-derive all oscillator amplitudes from a new target volume.
    /// Ignored while a fade or decay owns the amplitude.
    pub fn update_volume(&mut self, volume: f32) {
        if self.chord.phase != ChordPhase::Sustaining {
            return;
        }
        self.chord.amplitude = volume;
        if self.timbre.is_sample() {
            if let Some(sampler) = self.sampler.as_mut() {
                sampler.set_gain(volume);
            }
        } else if self.chord.tonic > 0.0 {
            self.write_amplitudes(volume);
        }
    }

    /// Stop the chord per the configured stop mode and suppress restarts.
    pub fn stop_chord(&mut self, now_ms: u64) {
        if !self.is_active() {
            return;
        }
        self.chord.suppressed = true;

        if self.timbre.is_sample() {
            if let Some(sampler) = self.sampler.as_mut() {
                sampler.stop();
            }
            self.enter_silent();
            return;
        }

        // A blind chord has nothing audible to fade; fading it would push
        // fresh amplitudes onto oscillators still holding stale frequencies.
        if self.stop_mode == StopMode::Fade && self.fade_ms > 0 && self.chord.tonic > 0.0 {
            self.chord.phase = ChordPhase::Fading;
            self.chord.phase_started_ms = now_ms;
            self.chord.phase_start_amplitude = self.chord.amplitude;
        } else {
            self.bank.silence();
            self.gains.set_all(SYNTH_GAIN);
            self.enter_silent();
        }
    }

    /// Cancel an in-flight fade and restore the pre-fade amplitude.
    /// Used when tap-tempo entry reinterprets the stop that started the fade.
    pub fn abort_fade(&mut self) {
        if self.chord.phase != ChordPhase::Fading {
            return;
        }
        self.chord.phase = ChordPhase::Sustaining;
        self.chord.suppressed = false;
        self.chord.amplitude = self.chord.phase_start_amplitude;
        if self.chord.tonic > 0.0 {
            self.write_amplitudes(self.chord.amplitude);
        }
    }

    /// Advance an in-flight fade or decay. Amplitude during either envelope
    /// is exactly `start * (1 - elapsed / duration)`.
    pub fn tick(&mut self, now_ms: u64) {
        let duration = match self.chord.phase {
            ChordPhase::Fading => self.fade_ms,
            ChordPhase::Decaying => DECAY_DURATION_MS,
            _ => return,
        };
        let elapsed = now_ms.wrapping_sub(self.chord.phase_started_ms);
        if elapsed >= duration {
            self.bank.silence();
            self.gains.set_all(SYNTH_GAIN);
            self.enter_silent();
            self.chord.suppressed = true;
        } else {
            let t = elapsed as f32 / duration as f32;
            let amplitude = self.chord.phase_start_amplitude * (1.0 - t);
            self.write_amplitudes(amplitude);
            self.chord.amplitude = amplitude;
        }
    }

    /// Begin the Rhodes release decay when the listening window closes.
    /// Other timbres release by sustaining until stopped.
    pub fn start_release(&mut self, now_ms: u64) {
        if self.timbre != Timbre::Rhodes
            || self.chord.phase != ChordPhase::Sustaining
            || self.chord.tonic <= 0.0
        {
            return;
        }
        self.chord.phase = ChordPhase::Decaying;
        self.chord.phase_started_ms = now_ms;
        self.chord.phase_start_amplitude = self.chord.amplitude;
    }

    /// Organ-only shared frequency modulation, ~6 Hz at +/-1.5%.
    pub fn apply_vibrato(&mut self, now_ms: u64) {
        if self.timbre != Timbre::Organ
            || self.chord.phase != ChordPhase::Sustaining
            || self.chord.tonic <= 0.0
        {
            return;
        }
        let t = now_ms as f64 / 1000.0;
        let lfo = (std::f64::consts::TAU * VIBRATO_RATE_HZ * t).sin() as f32;
        let mult = 1.0 + lfo * VIBRATO_DEPTH;

        let spec = self.timbre.spec();
        for role in Role::ALL {
            let base = self.base_freqs[role.index()] * mult;
            for slot in 0..spec.oscs_per_role {
                self.bank.set_frequency(role, slot, base * spec.detunes[slot]);
            }
        }
    }

    /// Hold all oscillators at zero without disturbing the stored amplitude.
    /// The transition-muting window uses this; fades are left alone.
    pub fn mute_output(&mut self) {
        if self.chord.phase == ChordPhase::Sustaining {
            self.write_amplitudes(0.0);
        }
    }

    /// Re-assert the stored amplitude on every live oscillator.
    pub fn apply_stored_amplitude(&mut self) {
        if self.chord.phase == ChordPhase::Sustaining
            && self.chord.tonic > 0.0
            && !self.timbre.is_sample()
        {
            self.write_amplitudes(self.chord.amplitude);
        }
    }

    /// Switch timbre. Always passes through silence-all first; a sustaining
    /// chord is re-initialized under the new model.
    pub fn set_timbre(&mut self, timbre: Timbre, _now_ms: u64) {
        if timbre == self.timbre {
            return;
        }
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.stop();
        }
        self.bank.silence();
        self.timbre = timbre;

        match self.chord.phase {
            ChordPhase::Sustaining => {
                if timbre.is_sample() {
                    let volume = self.chord.amplitude;
                    self.play_sample(volume);
                } else if self.chord.tonic > 0.0 {
                    self.init_oscillators(self.chord.tonic, self.chord.amplitude);
                }
            }
            ChordPhase::Fading | ChordPhase::Decaying => {
                // Mid-envelope switches just end the chord.
                self.gains.set_all(SYNTH_GAIN);
                self.enter_silent();
                self.chord.suppressed = true;
            }
            ChordPhase::Silent => {}
        }
    }

    pub fn set_octave_shift(&mut self, shift: i8) {
        self.octave_shift = shift.clamp(-1, 2);
        if self.is_active() && self.chord.tonic > 0.0 && !self.timbre.is_sample() {
            self.write_frequencies(self.chord.tonic);
        }
    }

    pub fn set_stop_mode(&mut self, mode: StopMode) {
        self.stop_mode = mode;
    }

    pub fn set_fade_duration_ms(&mut self, fade_ms: u64) {
        self.fade_ms = fade_ms;
    }

    pub fn set_diatonic_fifths(&mut self, enabled: bool) {
        self.diatonic_fifths = enabled;
    }

    pub fn set_routing(&mut self, routing: OutputRouting) {
        self.bank.set_routing(routing);
    }

    pub fn set_sampler(&mut self, sampler: Box<dyn SamplePlayer>) {
        self.sampler = Some(sampler);
    }

    pub fn set_sample_path(&mut self, path: Option<PathBuf>) {
        self.sample_path = path;
    }

    /// Last sample-player failure, if any. Cleared on read.
    pub fn take_sample_error(&mut self) -> Option<SampleError> {
        self.sample_error.take()
    }

    pub fn phase(&self) -> ChordPhase {
        self.chord.phase
    }

    pub fn is_active(&self) -> bool {
        self.chord.phase != ChordPhase::Silent
    }

    pub fn is_fading(&self) -> bool {
        self.chord.phase == ChordPhase::Fading
    }

    pub fn is_suppressed(&self) -> bool {
        self.chord.suppressed
    }

    pub fn amplitude(&self) -> f32 {
        self.chord.amplitude
    }

    pub fn tonic(&self) -> f32 {
        self.chord.tonic
    }

    pub fn timbre(&self) -> Timbre {
        self.timbre
    }

    // ── internals ────────────────────────────────────────────────

    fn enter_silent(&mut self) {
        self.chord.phase = ChordPhase::Silent;
        self.chord.amplitude = 0.0;
    }

    fn play_sample(&mut self, volume: f32) {
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };
        let Some(path) = self.sample_path.as_deref() else {
            return;
        };
        sampler.set_gain(volume);
        self.sample_error = sampler.play(path).err();
    }

    fn init_oscillators(&mut self, tonic: f32, volume: f32) {
        let spec = self.timbre.spec();
        for role in Role::ALL {
            for slot in 0..spec.oscs_per_role {
                self.bank.set_waveform(role, slot, spec.waveform);
            }
        }
        self.write_frequencies(tonic);
        self.write_amplitudes(volume);
    }

    fn write_frequencies(&mut self, tonic: f32) {
        let third = harmony::diatonic_third_ratio(tonic, self.chord.key, self.chord.mode);
        let fifth = harmony::fifth_ratio(
            tonic,
            self.chord.key,
            self.chord.mode,
            self.diatonic_fifths,
        );
        let octave = 2.0_f32.powi(self.octave_shift as i32);

        self.base_freqs = [
            tonic * octave,
            tonic * third * octave,
            tonic * fifth * octave,
        ];

        let spec = self.timbre.spec();
        for role in Role::ALL {
            let base = self.base_freqs[role.index()];
            for slot in 0..spec.oscs_per_role {
                self.bank.set_frequency(role, slot, base * spec.detunes[slot]);
            }
        }
    }

    fn write_amplitudes(&mut self, total: f32) {
        // A third of the total per harmonic role keeps the triad's sum at
        // the target volume, then the timbre splits each role's share.
        let per_role = total / 3.0;
        let spec = self.timbre.spec();
        for role in Role::ALL {
            for slot in 0..MAX_OSCS_PER_ROLE {
                let amplitude = if slot < spec.oscs_per_role {
                    per_role * spec.amp_split[slot]
                } else {
                    0.0
                };
                self.bank.set_amplitude(role, slot, amplitude);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::bank::Waveform;
    use std::path::Path;

    /// Records parameter writes; flags whether every amplitude was zero at
    /// the moment a frequency write arrived (the silence-first invariant).
    struct MockBank {
        freqs: [[f32; MAX_OSCS_PER_ROLE]; 3],
        amps: [[f32; MAX_OSCS_PER_ROLE]; 3],
        waveforms: [[Waveform; MAX_OSCS_PER_ROLE]; 3],
        silenced_before_retune: bool,
    }

    impl MockBank {
        fn new() -> Self {
            Self {
                freqs: [[0.0; MAX_OSCS_PER_ROLE]; 3],
                amps: [[0.0; MAX_OSCS_PER_ROLE]; 3],
                waveforms: [[Waveform::Sine; MAX_OSCS_PER_ROLE]; 3],
                silenced_before_retune: false,
            }
        }

        fn all_silent(&self) -> bool {
            self.amps.iter().flatten().all(|&a| a == 0.0)
        }
    }

    impl VoiceBank for MockBank {
        fn set_frequency(&mut self, role: Role, slot: usize, hz: f32) {
            if self.all_silent() {
                self.silenced_before_retune = true;
            }
            self.freqs[role.index()][slot] = hz;
        }

        fn set_amplitude(&mut self, role: Role, slot: usize, amplitude: f32) {
            self.amps[role.index()][slot] = amplitude;
        }

        fn set_waveform(&mut self, role: Role, slot: usize, waveform: Waveform) {
            self.waveforms[role.index()][slot] = waveform;
        }
    }

    fn controller() -> (VoiceController<MockBank>, Arc<RoleGains>) {
        let gains = Arc::new(RoleGains::default());
        (
            VoiceController::new(MockBank::new(), Arc::clone(&gains)),
            gains,
        )
    }

    const TOL: f32 = 1e-3;

    #[test]
    fn start_writes_the_triad() {
        let (mut vc, _) = controller();
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::Major, 0);

        // A over a C-major key is degree 9: minor third.
        let third = 440.0 * 2.0_f32.powf(3.0 / 12.0);
        let fifth = 440.0 * 2.0_f32.powf(7.0 / 12.0);
        assert!((vc.bank.freqs[0][0] - 440.0).abs() < TOL);
        assert!((vc.bank.freqs[1][0] - third).abs() < TOL);
        assert!((vc.bank.freqs[2][0] - fifth).abs() < TOL);
        // Sine: one oscillator per role at volume/3.
        assert!((vc.bank.amps[0][0] - 0.2).abs() < TOL);
        assert_eq!(vc.bank.amps[0][1], 0.0);
        assert_eq!(vc.phase(), ChordPhase::Sustaining);
        assert!(!vc.is_suppressed());
    }

    #[test]
    fn octave_shift_multiplies_every_frequency() {
        let (mut vc, _) = controller();
        vc.set_octave_shift(1);
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::FixedMajor, 0);
        assert!((vc.bank.freqs[0][0] - 880.0).abs() < TOL);
        vc.set_octave_shift(-1);
        assert!((vc.bank.freqs[0][0] - 220.0).abs() < TOL);
    }

    #[test]
    fn blind_start_is_silent_until_the_first_pitch() {
        let (mut vc, _) = controller();
        vc.start_chord(0.9, 0.0, 0, HarmonyMode::Major, 0);
        assert!(vc.is_active());
        assert!(vc.bank.all_silent());

        // Volume churn while blind must not un-silence stale oscillators.
        vc.update_volume(0.7);
        assert!(vc.bank.all_silent());

        vc.update_tonic(330.0, 0, HarmonyMode::Major);
        assert!((vc.bank.freqs[0][0] - 330.0).abs() < TOL);
        assert!((vc.bank.amps[0][0] - 0.7 / 3.0).abs() < TOL);
    }

    #[test]
    fn organ_splits_a_role_across_three_detuned_oscillators() {
        let (mut vc, _) = controller();
        vc.set_timbre(Timbre::Organ, 0);
        vc.start_chord(0.9, 440.0, 0, HarmonyMode::FixedMajor, 0);

        for slot in 0..3 {
            assert!((vc.bank.amps[0][slot] - 0.1).abs() < TOL); // 0.9 / 9
        }
        assert!((vc.bank.freqs[0][1] - 440.0 * 1.002).abs() < 0.1);
        assert!((vc.bank.freqs[0][2] - 440.0 * 0.998).abs() < 0.1);
    }

    #[test]
    fn rhodes_splits_main_and_companion_65_35() {
        let (mut vc, _) = controller();
        vc.set_timbre(Timbre::Rhodes, 0);
        vc.start_chord(0.9, 440.0, 0, HarmonyMode::FixedMajor, 0);

        let per_role = 0.3;
        assert!((vc.bank.amps[0][0] - per_role * 0.65).abs() < TOL);
        assert!((vc.bank.amps[0][1] - per_role * 0.35).abs() < TOL);
        assert_eq!(vc.bank.amps[0][2], 0.0);
    }

    #[test]
    fn strings_uses_sawtooth() {
        let (mut vc, _) = controller();
        vc.set_timbre(Timbre::Strings, 0);
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::FixedMajor, 0);
        assert_eq!(vc.bank.waveforms[0][0], Waveform::Sawtooth);
        assert_eq!(vc.bank.waveforms[2][1], Waveform::Sawtooth);
    }

    #[test]
    fn fade_is_linear_and_reaches_silence() {
        let (mut vc, gains) = controller();
        vc.start_chord(0.8, 440.0, 0, HarmonyMode::Major, 0);
        vc.stop_chord(1000);
        assert_eq!(vc.phase(), ChordPhase::Fading);
        assert!(vc.is_active(), "chord stays nominally active while fading");

        // Halfway through the default 1500 ms fade.
        vc.tick(1000 + FADE_DURATION_MS / 2);
        assert!((vc.amplitude() - 0.4).abs() < TOL);
        assert!((vc.bank.amps[0][0] - 0.4 / 3.0).abs() < TOL);

        let mut last = vc.amplitude();
        for dt in [900, 1100, 1400] {
            vc.tick(1000 + dt);
            assert!(vc.amplitude() <= last + TOL, "fade must not increase");
            last = vc.amplitude();
        }

        vc.tick(1000 + FADE_DURATION_MS);
        assert_eq!(vc.phase(), ChordPhase::Silent);
        assert!(vc.is_suppressed());
        assert_eq!(vc.amplitude(), 0.0);
        assert!(vc.bank.all_silent());
        assert_eq!(gains.get(Role::Root), SYNTH_GAIN);
    }

    #[test]
    fn volume_updates_are_ignored_while_fading() {
        let (mut vc, _) = controller();
        vc.start_chord(0.8, 440.0, 0, HarmonyMode::Major, 0);
        vc.stop_chord(0);
        vc.update_volume(1.0);
        vc.tick(FADE_DURATION_MS / 2);
        assert!((vc.amplitude() - 0.4).abs() < TOL);
    }

    #[test]
    fn abort_fade_restores_the_prefade_amplitude() {
        let (mut vc, _) = controller();
        vc.start_chord(0.8, 440.0, 0, HarmonyMode::Major, 0);
        vc.stop_chord(0);
        vc.tick(FADE_DURATION_MS / 2);
        vc.abort_fade();
        assert_eq!(vc.phase(), ChordPhase::Sustaining);
        assert!(!vc.is_suppressed());
        assert!((vc.amplitude() - 0.8).abs() < TOL);
        assert!((vc.bank.amps[0][0] - 0.8 / 3.0).abs() < TOL);
    }

    #[test]
    fn immediate_stop_zeroes_on_the_spot() {
        let (mut vc, _) = controller();
        vc.set_stop_mode(StopMode::Immediate);
        vc.start_chord(0.8, 440.0, 0, HarmonyMode::Major, 0);
        vc.stop_chord(0);
        assert_eq!(vc.phase(), ChordPhase::Silent);
        assert!(vc.is_suppressed());
        assert!(vc.bank.all_silent());
    }

    #[test]
    fn release_decay_is_rhodes_only() {
        let (mut vc, _) = controller();
        vc.start_chord(0.8, 440.0, 0, HarmonyMode::Major, 0);
        vc.start_release(0);
        assert_eq!(vc.phase(), ChordPhase::Sustaining, "sine has no release decay");

        vc.set_timbre(Timbre::Rhodes, 0);
        vc.start_release(100);
        assert_eq!(vc.phase(), ChordPhase::Decaying);

        // 65/35 split holds through the decay.
        vc.tick(100 + DECAY_DURATION_MS / 2);
        let per_role = vc.amplitude() / 3.0;
        assert!((vc.bank.amps[0][0] - per_role * 0.65).abs() < TOL);
        assert!((vc.bank.amps[0][1] - per_role * 0.35).abs() < TOL);

        vc.tick(100 + DECAY_DURATION_MS);
        assert_eq!(vc.phase(), ChordPhase::Silent);
        assert!(vc.is_suppressed());
    }

    #[test]
    fn vibrato_stays_within_depth_and_preserves_detune() {
        let (mut vc, _) = controller();
        vc.set_timbre(Timbre::Organ, 0);
        vc.start_chord(0.9, 440.0, 0, HarmonyMode::FixedMajor, 0);

        for now in (0..200).step_by(13) {
            vc.apply_vibrato(now);
            let root = vc.bank.freqs[0][0];
            assert!(root >= 440.0 * (1.0 - VIBRATO_DEPTH) - TOL);
            assert!(root <= 440.0 * (1.0 + VIBRATO_DEPTH) + TOL);
            let ratio = vc.bank.freqs[0][1] / root;
            assert!((ratio - 1.002).abs() < 1e-4, "detune must ride the LFO");
        }
    }

    #[test]
    fn vibrato_does_not_touch_other_timbres() {
        let (mut vc, _) = controller();
        vc.start_chord(0.9, 440.0, 0, HarmonyMode::FixedMajor, 0);
        vc.apply_vibrato(37);
        assert!((vc.bank.freqs[0][0] - 440.0).abs() < TOL);
    }

    #[test]
    fn retune_is_a_noop_when_inactive_or_invalid() {
        let (mut vc, _) = controller();
        vc.update_tonic(330.0, 0, HarmonyMode::Major);
        assert_eq!(vc.bank.freqs[0][0], 0.0);

        vc.start_chord(0.6, 440.0, 0, HarmonyMode::Major, 0);
        vc.update_tonic(0.0, 0, HarmonyMode::Major);
        assert!((vc.bank.freqs[0][0] - 440.0).abs() < TOL);
    }

    #[test]
    fn retune_moves_frequencies_but_not_amplitude() {
        let (mut vc, _) = controller();
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::Major, 0);
        let amp_before = vc.bank.amps[0][0];
        vc.update_tonic(523.25, 0, HarmonyMode::Major);
        assert!((vc.bank.freqs[0][0] - 523.25).abs() < TOL);
        assert_eq!(vc.bank.amps[0][0], amp_before);
    }

    #[test]
    fn timbre_switch_passes_through_silence() {
        let (mut vc, _) = controller();
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::Major, 0);
        vc.bank.silenced_before_retune = false;

        vc.set_timbre(Timbre::Strings, 0);
        assert!(
            vc.bank.silenced_before_retune,
            "all voices must be silent before the new model tunes up"
        );
        // And the sustaining chord came back under the new model.
        assert_eq!(vc.bank.waveforms[0][0], Waveform::Sawtooth);
        assert!((vc.bank.amps[0][0] - 0.1).abs() < TOL); // 0.6/3 * 0.5
    }

    #[test]
    fn mute_and_restore_preserve_the_stored_amplitude() {
        let (mut vc, _) = controller();
        vc.start_chord(0.6, 440.0, 0, HarmonyMode::Major, 0);
        vc.mute_output();
        assert!(vc.bank.all_silent());
        assert!((vc.amplitude() - 0.6).abs() < TOL);
        vc.apply_stored_amplitude();
        assert!((vc.bank.amps[0][0] - 0.2).abs() < TOL);
    }

    // ── sample timbre ────────────────────────────────────────────

    #[derive(Default)]
    struct FakeSampler {
        playing: bool,
    }

    impl SamplePlayer for FakeSampler {
        fn play(&mut self, _path: &Path) -> Result<(), SampleError> {
            self.playing = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.playing = false;
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn set_gain(&mut self, _gain: f32) {}
    }

    fn sample_controller() -> VoiceController<MockBank> {
        let (mut vc, _) = controller();
        vc.set_sampler(Box::<FakeSampler>::default());
        vc.set_sample_path(Some(PathBuf::from("chord.wav")));
        vc.set_timbre(Timbre::Sample, 0);
        vc
    }

    #[test]
    fn sample_timbre_delegates_to_the_player() {
        let mut vc = sample_controller();
        vc.start_chord(0.5, 440.0, 0, HarmonyMode::Major, 0);
        assert!(vc.bank.all_silent(), "no oscillators for the sample timbre");
        assert!(vc.is_active());

        // Retunes never reach the sample player or the bank.
        vc.update_tonic(330.0, 0, HarmonyMode::Major);
        assert_eq!(vc.bank.freqs[0][0], 0.0);

        vc.stop_chord(0);
        assert_eq!(vc.phase(), ChordPhase::Silent, "samples stop without fading");
    }
}
