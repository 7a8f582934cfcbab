//! Benchmarks for the hot per-cycle control paths.
//!
//! Run with: cargo bench
//!
//! The engine runs at 20 Hz, so nothing here is deadline-critical the way
//! an audio callback is - these exist to catch regressions that would make
//! a control cycle stall the loop (the top-level failure mode the design
//! avoids).

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use tricord::harmony::{diatonic_third_ratio, HarmonyMode};
use tricord::pitch::{Instrument, PitchTracker, TonicSample};
use tricord::voice::bank::{Role, RoleGains, VoiceBank, Waveform};
use tricord::voice::controller::VoiceController;
use tricord::voice::timbre::Timbre;

/// Parameter sink for benchmarking the controller without an audio device.
struct NullBank;

impl VoiceBank for NullBank {
    fn set_frequency(&mut self, _role: Role, _slot: usize, hz: f32) {
        black_box(hz);
    }

    fn set_amplitude(&mut self, _role: Role, _slot: usize, amplitude: f32) {
        black_box(amplitude);
    }

    fn set_waveform(&mut self, _role: Role, _slot: usize, _waveform: Waveform) {}
}

fn bench_harmony(c: &mut Criterion) {
    c.bench_function("harmony/diatonic_third_sweep", |b| {
        b.iter(|| {
            let mut acc = 0.0_f32;
            for midi in 40..88 {
                let hz = 440.0 * 2.0_f32.powf((midi - 69) as f32 / 12.0);
                acc += diatonic_third_ratio(black_box(hz), 0, HarmonyMode::Major);
            }
            acc
        })
    });
}

fn bench_tracker(c: &mut Criterion) {
    c.bench_function("pitch/ingest_64_samples", |b| {
        b.iter(|| {
            let mut tracker = PitchTracker::new(Instrument::Guitar);
            for i in 0..64 {
                tracker.ingest(TonicSample {
                    frequency: 440.0 + (i % 5) as f32,
                    confidence: 0.7,
                });
            }
            tracker.stable_frequency()
        })
    });
}

fn bench_retune(c: &mut Criterion) {
    c.bench_function("voice/retune_organ", |b| {
        let gains = Arc::new(RoleGains::default());
        let mut controller = VoiceController::new(NullBank, gains);
        controller.set_timbre(Timbre::Organ, 0);
        controller.start_chord(0.7, 440.0, 0, HarmonyMode::Major, 0);
        let mut hz = 330.0_f32;
        b.iter(|| {
            hz = if hz > 430.0 { 330.0 } else { hz + 1.0 };
            controller.update_tonic(black_box(hz), 0, HarmonyMode::Major);
        })
    });
}

criterion_group!(benches, bench_harmony, bench_tracker, bench_retune);
criterion_main!(benches);
