//! The per-cycle integration of the performance surface.
//!
//! `PerformanceEngine` is what the firmware's main loop calls once per
//! ~50 ms tick: it runs the input arbiter, applies its decisions to the
//! voice controller, feeds the pitch tracker, reconciles the arpeggiator
//! clock, and exposes a read-only snapshot for whatever is rendering the
//! display. All the pieces are owned here - there is no global audio state.

use std::sync::Arc;

use crate::arp::{ArpMode, Arpeggiator, DEFAULT_BPM};
use crate::harmony::HarmonyMode;
use crate::input::{Decision, InputArbiter, PerformanceMode, RawInputs};
use crate::pitch::{Instrument, PitchTracker, TonicSample};
use crate::sample::SamplePlayer;
use crate::settings::{SettingsError, SettingsSnapshot, SettingsStore};
use crate::voice::bank::{OutputRouting, RoleGains, VoiceBank};
use crate::voice::controller::{ChordPhase, StopMode, VoiceController};
use crate::voice::timbre::Timbre;

/// Discrete setting-change events from the UI/menu collaborator. Applied
/// exactly as a footswitch or encoder event would be, then persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum SettingChange {
    Key(u8),
    Mode(HarmonyMode),
    OctaveShift(i8),
    Timbre(Timbre),
    ArpMode(ArpMode),
    Routing(OutputRouting),
    StopMode(StopMode),
    Instrument(Instrument),
    Muting(bool),
}

/// Read-only state for the UI collaborator, rebuilt on demand.
#[derive(Clone, Copy, Debug)]
pub struct EngineSnapshot {
    pub note: Option<&'static str>,
    pub stable_hz: Option<f32>,
    pub chord_phase: ChordPhase,
    pub chord_tonic: f32,
    /// Volume currently driving the voices.
    pub volume: f32,
    /// Whether that volume comes from the footswitches or the pot.
    pub volume_source_is_footswitch: bool,
    pub tempo_bpm: f32,
    pub arp_running: bool,
    pub arp_step: u8,
    pub performance_mode: PerformanceMode,
    pub listening: bool,
    pub settings: SettingsSnapshot,
}

pub struct PerformanceEngine<B: VoiceBank> {
    arbiter: InputArbiter,
    tracker: PitchTracker,
    voices: VoiceController<B>,
    arp: Arpeggiator,
    settings: SettingsSnapshot,
    store: Option<Box<dyn SettingsStore>>,
    tempo_bpm: f32,
    last_volume: f32,
    last_listening: bool,
}

impl<B: VoiceBank> PerformanceEngine<B> {
    pub fn new(bank: B, gains: Arc<RoleGains>, settings: SettingsSnapshot) -> Self {
        let settings = settings.validated();
        let mut voices = VoiceController::new(bank, Arc::clone(&gains));
        voices.set_timbre(settings.timbre, 0);
        voices.set_stop_mode(settings.stop_mode);
        voices.set_octave_shift(settings.octave_shift);
        voices.set_routing(settings.routing);

        let mut arp = Arpeggiator::new(gains);
        arp.set_mode(settings.arp_mode);

        Self {
            arbiter: InputArbiter::new(),
            tracker: PitchTracker::new(settings.instrument),
            voices,
            arp,
            settings,
            store: None,
            tempo_bpm: DEFAULT_BPM,
            last_volume: 0.0,
            last_listening: false,
        }
    }

    /// Build from a persistent store; the stored snapshot seeds the engine
    /// and later setting changes are saved back.
    pub fn with_store(bank: B, gains: Arc<RoleGains>, store: Box<dyn SettingsStore>) -> Self {
        let settings = store.load();
        let mut engine = Self::new(bank, gains, settings);
        engine.store = Some(store);
        engine
    }

    pub fn set_sampler(&mut self, sampler: Box<dyn SamplePlayer>) {
        self.voices.set_sampler(sampler);
    }

    pub fn set_sample_path(&mut self, path: Option<std::path::PathBuf>) {
        self.voices.set_sample_path(path);
    }

    /// One control-loop cycle: inputs, envelopes, pitch, arpeggiator.
    pub fn cycle(&mut self, raw: &RawInputs, pitch: Option<TonicSample>, now_ms: u64) {
        let decision = self.arbiter.update(raw, now_ms);
        let volume = self.arbiter.effective_volume(raw.pot);
        self.last_volume = volume;
        self.last_listening = decision.listening;

        self.apply_decision(&decision, volume, now_ms);

        self.voices.update_volume(volume);
        self.voices.tick(now_ms);
        self.voices.apply_vibrato(now_ms);

        // Keep the chord sounding: anything that ended without an explicit
        // stop comes back on its own. Sample playback is finite by design
        // and stays exempt.
        if !self.voices.is_active()
            && !self.voices.is_suppressed()
            && !self.settings.timbre.is_sample()
        {
            self.voices.start_chord(
                volume,
                0.0,
                self.settings.key,
                self.settings.mode,
                now_ms,
            );
            self.arp.reset_step();
        }

        // Transition muting: keep the chord quiet while a fresh listening
        // window settles, when the performer asked for it.
        if decision.in_transition_window && self.settings.muting && !self.voices.is_fading() {
            self.voices.mute_output();
        } else {
            self.voices.apply_stored_amplitude();
        }

        if let Some(sample) = pitch {
            self.tracker.ingest(sample);
        }
        if decision.listening {
            if let Some(hz) = self.tracker.stable_frequency() {
                self.voices
                    .update_tonic(hz, self.settings.key, self.settings.mode);
            }
        }

        self.arp
            .sync(self.voices.is_active(), self.voices.is_fading());
    }

    fn apply_decision(&mut self, decision: &Decision, volume: f32, now_ms: u64) {
        if decision.abort_fade {
            self.voices.abort_fade();
        }
        if let Some(bpm) = decision.tempo_bpm {
            self.tempo_bpm = bpm;
            self.arp.set_tempo(bpm);
        }
        if decision.stop_chord {
            self.voices.stop_chord(now_ms);
        }
        if decision.relisten {
            self.tracker.reset();
            if self.voices.is_suppressed() {
                self.voices.start_chord_pending(
                    volume,
                    self.settings.key,
                    self.settings.mode,
                    now_ms,
                );
                self.arp.reset_step();
            }
        }
        if decision.release {
            self.voices.start_release(now_ms);
        }
    }

    /// Apply a setting change from the UI collaborator and persist it.
    /// A save failure is reported, never fatal.
    pub fn apply_setting(
        &mut self,
        change: SettingChange,
        now_ms: u64,
    ) -> Result<(), SettingsError> {
        match change {
            SettingChange::Key(key) => {
                self.settings.key = key % 12;
                self.retune_active();
            }
            SettingChange::Mode(mode) => {
                self.settings.mode = mode;
                self.retune_active();
            }
            SettingChange::OctaveShift(shift) => {
                self.settings.octave_shift =
                    shift.clamp(crate::settings::OCTAVE_SHIFT_MIN, crate::settings::OCTAVE_SHIFT_MAX);
                self.voices.set_octave_shift(self.settings.octave_shift);
            }
            SettingChange::Timbre(timbre) => {
                self.settings.timbre = timbre;
                self.voices.set_timbre(timbre, now_ms);
            }
            SettingChange::ArpMode(mode) => {
                self.settings.arp_mode = mode;
                self.arp.set_mode(mode);
            }
            SettingChange::Routing(routing) => {
                self.settings.routing = routing;
                self.voices.set_routing(routing);
            }
            SettingChange::StopMode(mode) => {
                self.settings.stop_mode = mode;
                self.voices.set_stop_mode(mode);
            }
            SettingChange::Instrument(instrument) => {
                self.settings.instrument = instrument;
                self.tracker.set_instrument(instrument);
            }
            SettingChange::Muting(muting) => {
                self.settings.muting = muting;
            }
        }

        match &self.store {
            Some(store) => store.save(&self.settings),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            note: self.tracker.note_name(),
            stable_hz: self.tracker.stable_frequency(),
            chord_phase: self.voices.phase(),
            chord_tonic: self.voices.tonic(),
            volume: self.last_volume,
            volume_source_is_footswitch: self.arbiter.volume_source_is_footswitch(),
            tempo_bpm: self.tempo_bpm,
            arp_running: self.arp.is_running(),
            arp_step: self.arp.current_step(),
            performance_mode: self.arbiter.mode(),
            listening: self.last_listening,
            settings: self.settings,
        }
    }

    /// Last sample-player failure, if any. Cleared on read; the caller
    /// decides how to surface it.
    pub fn take_sample_error(&mut self) -> Option<crate::sample::SampleError> {
        self.voices.take_sample_error()
    }

    /// Deterministic teardown: the arp clock halts before anything else is
    /// dropped.
    pub fn shutdown(&mut self) {
        self.arp.stop();
    }

    fn retune_active(&mut self) {
        let tonic = self.voices.tonic();
        if tonic > 0.0 {
            self.voices
                .update_tonic(tonic, self.settings.key, self.settings.mode);
        }
    }
}
