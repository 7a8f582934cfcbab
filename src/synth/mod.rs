//! Realtime backend for the audio-voice abstraction.
//!
//! The engine side holds a [`BankHandle`] (the [`VoiceBank`] implementation)
//! and writes parameters; the audio callback holds the matching
//! [`BankRenderer`] and turns them into samples. Every shared parameter is a
//! single atomic cell, so the callback never locks and never observes a
//! half-written update.
//!
//! [`VoiceBank`]: crate::voice::bank::VoiceBank

/// Atomic parameter store, control-side handle, callback-side renderer.
pub mod bank;
/// WAV-file sample player for the Sample timbre.
pub mod sampler;

pub use bank::{shared_bank, BankHandle, BankRenderer};
pub use sampler::WavSamplePlayer;
