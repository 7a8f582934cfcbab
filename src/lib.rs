pub mod arp;
pub mod engine; // Per-cycle orchestration of the performance surface
pub mod harmony;
pub mod input;
pub mod pitch;
pub mod sample;
pub mod settings;
pub mod synth; // Realtime oscillator-bank backend driven by the engine
pub mod voice;

/// Cadence of the main control loop in milliseconds (~20 Hz).
pub const CONTROL_TICK_MS: u64 = 50;

/// Canonical octave band the pitch tracker folds every tonic into (Hz).
/// Lower bound inclusive, upper bound exclusive.
pub const PITCH_BAND_LOW: f32 = 200.0;
pub const PITCH_BAND_HIGH: f32 = 950.0;
