//! Sample-player collaborator interface.
//!
//! The Sample timbre hands the whole chord off to an external player of
//! finite-length recordings instead of driving oscillators. The engine only
//! needs this narrow seam; `crate::synth::WavSamplePlayer` is the shipped
//! implementation.

use std::fmt;
use std::path::{Path, PathBuf};

/// Errors a sample player can report. Never fatal to the control loop -
/// the chord simply stays silent.
#[derive(Debug)]
pub enum SampleError {
    /// The sample file does not exist or could not be opened.
    NotFound(PathBuf),
    /// The file exists but could not be decoded.
    Decode(String),
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::NotFound(path) => write!(f, "sample not found: {}", path.display()),
            SampleError::Decode(msg) => write!(f, "sample decode failed: {msg}"),
        }
    }
}

impl std::error::Error for SampleError {}

pub trait SamplePlayer: Send {
    /// Begin playback of the file at `path`.
    fn play(&mut self, path: &Path) -> Result<(), SampleError>;

    /// Stop playback immediately.
    fn stop(&mut self);

    /// Whether a sample is still sounding (playback is finite-length).
    fn is_playing(&self) -> bool;

    fn set_gain(&mut self, gain: f32);
}
