//! WAV sample player - the shipped `SamplePlayer` collaborator.
//!
//! Decoding happens on the control thread; the audio callback only ever
//! receives a finished buffer over the command channel and reads it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::sample::{SampleError, SamplePlayer};

use super::bank::SampleCmd;

pub struct WavSamplePlayer {
    tx: Sender<SampleCmd>,
    playing: Arc<AtomicBool>,
    gain: f32,
}

impl WavSamplePlayer {
    pub(crate) fn new(tx: Sender<SampleCmd>, playing: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            playing,
            gain: 1.0,
        }
    }
}

impl SamplePlayer for WavSamplePlayer {
    fn play(&mut self, path: &Path) -> Result<(), SampleError> {
        let mut reader = hound::WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(_) => SampleError::NotFound(path.to_path_buf()),
            other => SampleError::Decode(other.to_string()),
        })?;

        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                reader.samples::<f32>().filter_map(Result::ok).collect()
            }
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .filter_map(Result::ok)
                    .map(|s| s as f32 / scale)
                    .collect()
            }
        };
        if interleaved.is_empty() {
            return Err(SampleError::Decode("empty sample".into()));
        }

        // Fold to mono; the bank renders a single channel.
        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        let _ = self.tx.send(SampleCmd::Start {
            buffer: Arc::new(mono),
            source_rate: spec.sample_rate as f32,
            gain: self.gain,
        });
        self.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        let _ = self.tx.send(SampleCmd::Stop);
        self.playing.store(false, Ordering::Release);
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        let _ = self.tx.send(SampleCmd::SetGain(self.gain));
    }
}
