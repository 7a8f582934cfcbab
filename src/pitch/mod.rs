//! Pitch tracking - raw detector samples to a stable tonic.
//!
//! The external pitch detector delivers one noisy (frequency, confidence)
//! reading per control cycle. `PitchTracker` turns that stream into a single
//! stable tonic frequency: a 3-wide median knocks out single-sample spikes,
//! a plausibility band rejects octave errors and junk, the survivor is folded
//! into one canonical octave, and an exponential smoother - weighted by the
//! detector's own confidence - converges on the note being held.

use serde::{Deserialize, Serialize};

use crate::harmony;
use crate::{PITCH_BAND_HIGH, PITCH_BAND_LOW};

/// One raw reading from the external pitch detector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TonicSample {
    pub frequency: f32,
    /// Detector confidence in [0, 1]; used as the smoothing weight.
    pub confidence: f32,
}

/// Pitch-detector collaborator, sampled once per control cycle.
pub trait PitchDetector {
    fn poll(&mut self) -> Option<TonicSample>;
}

/// Which instrument is plugged in. Bass extends the plausible band downward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instrument {
    Guitar,
    Bass,
}

impl Instrument {
    /// Lowest raw frequency the tracker will believe.
    fn min_plausible_hz(self) -> f32 {
        match self {
            Instrument::Guitar => 50.0,
            Instrument::Bass => 25.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Instrument::Guitar => "Guitar",
            Instrument::Bass => "Bass",
        }
    }
}

const MEDIAN_DEPTH: usize = 3;
const MAX_PLAUSIBLE_HZ: f32 = 2000.0;

/// Fold a frequency into the canonical octave band by repeated
/// doubling/halving. Already-in-band inputs come back unchanged.
pub fn normalize_octave(mut hz: f32) -> f32 {
    if hz <= 0.0 {
        return hz;
    }
    while hz < PITCH_BAND_LOW {
        hz *= 2.0;
    }
    while hz >= PITCH_BAND_HIGH {
        hz /= 2.0;
    }
    hz
}

/// Median filter + plausibility band + octave fold + confidence-weighted
/// smoothing over the raw detector stream.
///
/// Invariant: `smoothed` is either exactly 0.0 ("no valid pitch yet") or
/// inside the canonical band [200, 950).
pub struct PitchTracker {
    history: [f32; MEDIAN_DEPTH],
    next: usize,
    smoothed: f32,
    instrument: Instrument,
}

impl PitchTracker {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            history: [0.0; MEDIAN_DEPTH],
            next: 0,
            smoothed: 0.0,
            instrument,
        }
    }

    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.instrument = instrument;
    }

    /// Feed one raw detector reading. Returns the updated stable frequency
    /// when the reading survived the filters, `None` otherwise.
    pub fn ingest(&mut self, sample: TonicSample) -> Option<f32> {
        self.history[self.next] = sample.frequency;
        self.next = (self.next + 1) % MEDIAN_DEPTH;

        // Median of the three most recent raw samples. A freshly reset
        // history still holds zeros, so the tracker stays silent until two
        // real readings agree - that is the point of the filter.
        let mut sorted = self.history;
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = sorted[MEDIAN_DEPTH / 2];

        if median < self.instrument.min_plausible_hz() || median > MAX_PLAUSIBLE_HZ {
            return None;
        }

        let normalized = normalize_octave(median);
        let confidence = sample.confidence.clamp(0.0, 1.0);

        if self.smoothed <= 0.0 {
            // First valid sample: adopt directly, no smoothing history to blend.
            self.smoothed = normalized;
        } else {
            self.smoothed = confidence * normalized + (1.0 - confidence) * self.smoothed;
        }
        Some(self.smoothed)
    }

    /// Last stable tonic, if a valid pitch has been seen since the last reset.
    pub fn stable_frequency(&self) -> Option<f32> {
        (self.smoothed > 0.0).then_some(self.smoothed)
    }

    /// Note name of the stable tonic.
    pub fn note_name(&self) -> Option<&'static str> {
        self.stable_frequency().map(harmony::note_name)
    }

    /// Discard all pitch memory. Called when a fresh listening window opens.
    pub fn reset(&mut self) {
        self.history = [0.0; MEDIAN_DEPTH];
        self.next = 0;
        self.smoothed = 0.0;
    }
}
