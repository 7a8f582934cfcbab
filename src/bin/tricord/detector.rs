//! FFT pitch detector over the microphone ring.
//!
//! Hann window, forward FFT, peak pick restricted to the instrument band,
//! parabolic interpolation for sub-bin accuracy. The peak's share of the
//! band energy becomes the confidence the tracker smooths with. Deliberately
//! simple - the tracker downstream is built to absorb a noisy detector.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use tricord::pitch::{PitchDetector, TonicSample};

const FFT_SIZE: usize = 4096;

/// Band the peak search is limited to (Hz). Covers bass low B through the
/// upper frets.
const MIN_HZ: f32 = 25.0;
const MAX_HZ: f32 = 1200.0;

/// RMS below this is treated as silence rather than a detection.
const SILENCE_RMS: f32 = 1e-3;

pub struct FftPitchDetector {
    mic: rtrb::Consumer<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Sliding buffer of the most recent FFT_SIZE samples.
    buffer: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    sample_rate: f32,
}

impl FftPitchDetector {
    pub fn new(mic: rtrb::Consumer<f32>, sample_rate: f32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Hann window - reduces spectral leakage.
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                let denom = (FFT_SIZE - 1) as f32;
                0.5 * (1.0 - (std::f32::consts::TAU * i as f32 / denom).cos())
            })
            .collect();

        Self {
            mic,
            fft,
            window,
            buffer: Vec::with_capacity(FFT_SIZE),
            scratch: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            sample_rate,
        }
    }

    fn drain_mic(&mut self) {
        while let Ok(sample) = self.mic.pop() {
            self.buffer.push(sample);
        }
        if self.buffer.len() > FFT_SIZE {
            let excess = self.buffer.len() - FFT_SIZE;
            self.buffer.drain(0..excess);
        }
    }
}

impl PitchDetector for FftPitchDetector {
    fn poll(&mut self) -> Option<TonicSample> {
        self.drain_mic();
        if self.buffer.len() < FFT_SIZE {
            return None;
        }

        let rms = (self.buffer.iter().map(|s| s * s).sum::<f32>() / FFT_SIZE as f32).sqrt();
        if rms < SILENCE_RMS {
            return None;
        }

        for (i, (&sample, &w)) in self.buffer.iter().zip(&self.window).enumerate() {
            self.scratch[i] = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let bin_hz = self.sample_rate / FFT_SIZE as f32;
        let lo = ((MIN_HZ / bin_hz) as usize).max(1);
        let hi = ((MAX_HZ / bin_hz) as usize).min(FFT_SIZE / 2 - 1);
        if lo >= hi {
            return None;
        }

        let mut peak_bin = lo;
        let mut peak_mag = 0.0_f32;
        let mut band_energy = 0.0_f32;
        for bin in lo..=hi {
            let mag = self.scratch[bin].norm();
            band_energy += mag;
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = bin;
            }
        }
        if peak_mag <= 0.0 || band_energy <= 0.0 {
            return None;
        }

        // Parabolic interpolation over the peak and its neighbors gives
        // sub-bin frequency accuracy.
        let m0 = self.scratch[peak_bin - 1].norm();
        let m1 = peak_mag;
        let m2 = self.scratch[peak_bin + 1].norm();
        let denom = m0 - 2.0 * m1 + m2;
        let offset = if denom.abs() > 1e-9 {
            (0.5 * (m0 - m2) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let frequency = (peak_bin as f32 + offset) * bin_hz;

        // How much the peak dominates its band. A clean plucked note puts
        // most band energy at the fundamental and its skirt.
        let confidence = (3.0 * peak_mag / band_energy).clamp(0.0, 1.0);

        Some(TonicSample {
            frequency,
            confidence,
        })
    }
}
