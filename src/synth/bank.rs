//! Oscillator bank split across the control/audio boundary.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::voice::bank::{
    OutputRouting, Role, RoleGains, VoiceBank, Waveform, MAX_OSCS_PER_ROLE,
};

const ROLE_COUNT: usize = 3;

/// Amplitudes below this leave an oscillator out of the mix entirely.
const AMP_EPSILON: f32 = 1e-4;

/// One oscillator's parameters as lock-free cells.
struct OscCell {
    freq_bits: AtomicU32,
    amp_bits: AtomicU32,
    waveform: AtomicU8,
}

impl OscCell {
    fn new() -> Self {
        Self {
            freq_bits: AtomicU32::new(440.0_f32.to_bits()),
            amp_bits: AtomicU32::new(0.0_f32.to_bits()),
            waveform: AtomicU8::new(0),
        }
    }

    fn frequency(&self) -> f32 {
        f32::from_bits(self.freq_bits.load(Ordering::Acquire))
    }

    fn amplitude(&self) -> f32 {
        f32::from_bits(self.amp_bits.load(Ordering::Acquire))
    }

    fn waveform(&self) -> Waveform {
        match self.waveform.load(Ordering::Acquire) {
            1 => Waveform::Sawtooth,
            _ => Waveform::Sine,
        }
    }
}

fn waveform_code(waveform: Waveform) -> u8 {
    match waveform {
        Waveform::Sine => 0,
        Waveform::Sawtooth => 1,
    }
}

struct BankParams {
    cells: [[OscCell; MAX_OSCS_PER_ROLE]; ROLE_COUNT],
    role_gains: Arc<RoleGains>,
    /// 0 = mix with dry, 1 = synth only.
    routing: AtomicU8,
}

pub(crate) enum SampleCmd {
    Start {
        buffer: Arc<Vec<f32>>,
        source_rate: f32,
        gain: f32,
    },
    SetGain(f32),
    Stop,
}

/// Build a connected handle/renderer pair over one shared parameter store.
pub fn shared_bank(
    sample_rate: f32,
    role_gains: Arc<RoleGains>,
) -> (BankHandle, BankRenderer) {
    let params = Arc::new(BankParams {
        cells: std::array::from_fn(|_| std::array::from_fn(|_| OscCell::new())),
        role_gains,
        routing: AtomicU8::new(0),
    });
    let (sample_tx, sample_rx) = bounded::<SampleCmd>(8);
    let sample_playing = Arc::new(AtomicBool::new(false));

    let handle = BankHandle {
        params: Arc::clone(&params),
        sample_tx: sample_tx.clone(),
        sample_playing: Arc::clone(&sample_playing),
    };
    let renderer = BankRenderer {
        params,
        sample_rx,
        sample_playing,
        sample_rate,
        phases: [[0.0; MAX_OSCS_PER_ROLE]; ROLE_COUNT],
        sample_voice: None,
        dry_input: None,
    };
    (handle, renderer)
}

/// Control-side writer; implements the engine's bank seam.
pub struct BankHandle {
    params: Arc<BankParams>,
    sample_tx: Sender<SampleCmd>,
    sample_playing: Arc<AtomicBool>,
}

impl BankHandle {
    /// A sample player wired to this bank's renderer.
    pub fn sample_player(&self) -> super::WavSamplePlayer {
        super::WavSamplePlayer::new(self.sample_tx.clone(), Arc::clone(&self.sample_playing))
    }
}

impl VoiceBank for BankHandle {
    fn set_frequency(&mut self, role: Role, slot: usize, hz: f32) {
        self.params.cells[role.index()][slot]
            .freq_bits
            .store(hz.to_bits(), Ordering::Release);
    }

    fn set_amplitude(&mut self, role: Role, slot: usize, amplitude: f32) {
        self.params.cells[role.index()][slot]
            .amp_bits
            .store(amplitude.to_bits(), Ordering::Release);
    }

    fn set_waveform(&mut self, role: Role, slot: usize, waveform: Waveform) {
        self.params.cells[role.index()][slot]
            .waveform
            .store(waveform_code(waveform), Ordering::Release);
    }

    fn set_routing(&mut self, routing: OutputRouting) {
        let code = match routing {
            OutputRouting::MixWithDry => 0,
            OutputRouting::SynthOnly => 1,
        };
        self.params.routing.store(code, Ordering::Release);
    }
}

struct SampleVoice {
    buffer: Arc<Vec<f32>>,
    /// Fractional read position; advances by `step` per output frame.
    pos: f32,
    step: f32,
    gain: f32,
}

/// Callback-side reader. `render` is allocation-free and never blocks.
pub struct BankRenderer {
    params: Arc<BankParams>,
    sample_rx: Receiver<SampleCmd>,
    sample_playing: Arc<AtomicBool>,
    sample_rate: f32,
    phases: [[f32; MAX_OSCS_PER_ROLE]; ROLE_COUNT],
    sample_voice: Option<SampleVoice>,
    dry_input: Option<rtrb::Consumer<f32>>,
}

impl BankRenderer {
    /// Attach the dry instrument signal. Mixed through when routing says so.
    pub fn set_dry_input(&mut self, input: rtrb::Consumer<f32>) {
        self.dry_input = Some(input);
    }

    /// Fill a mono block from the current parameters.
    pub fn render(&mut self, out: &mut [f32]) {
        self.drain_commands();

        out.fill(0.0);
        self.render_oscillators(out);
        self.render_sample(out);
        self.mix_dry(out);
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.sample_rx.try_recv() {
            match cmd {
                SampleCmd::Start {
                    buffer,
                    source_rate,
                    gain,
                } => {
                    let step = if self.sample_rate > 0.0 {
                        source_rate / self.sample_rate
                    } else {
                        1.0
                    };
                    self.sample_voice = Some(SampleVoice {
                        buffer,
                        pos: 0.0,
                        step,
                        gain,
                    });
                    self.sample_playing.store(true, Ordering::Release);
                }
                SampleCmd::SetGain(gain) => {
                    if let Some(voice) = self.sample_voice.as_mut() {
                        voice.gain = gain;
                    }
                }
                SampleCmd::Stop => {
                    self.sample_voice = None;
                    self.sample_playing.store(false, Ordering::Release);
                }
            }
        }
    }

    fn render_oscillators(&mut self, out: &mut [f32]) {
        for (role_idx, role) in Role::ALL.into_iter().enumerate() {
            let gain = self.params.role_gains.get(role);
            for slot in 0..MAX_OSCS_PER_ROLE {
                let cell = &self.params.cells[role_idx][slot];
                let amplitude = cell.amplitude() * gain;
                if amplitude < AMP_EPSILON {
                    continue;
                }
                let phase_inc = std::f32::consts::TAU * cell.frequency() / self.sample_rate;
                let waveform = cell.waveform();
                let phase = &mut self.phases[role_idx][slot];
                for frame in out.iter_mut() {
                    let sample = match waveform {
                        Waveform::Sine => phase.sin(),
                        Waveform::Sawtooth => (*phase / std::f32::consts::TAU) * 2.0 - 1.0,
                    };
                    *frame += sample * amplitude;
                    *phase += phase_inc;
                    if *phase >= std::f32::consts::TAU {
                        *phase -= std::f32::consts::TAU;
                    }
                }
            }
        }
    }

    fn render_sample(&mut self, out: &mut [f32]) {
        let Some(voice) = self.sample_voice.as_mut() else {
            return;
        };
        let data = voice.buffer.as_slice();
        let mut finished = false;
        for frame in out.iter_mut() {
            let i = voice.pos as usize;
            if i + 1 >= data.len() {
                finished = true;
                break;
            }
            let frac = voice.pos - i as f32;
            let sample = data[i] * (1.0 - frac) + data[i + 1] * frac;
            *frame += sample * voice.gain;
            voice.pos += voice.step;
        }
        if finished {
            self.sample_voice = None;
            self.sample_playing.store(false, Ordering::Release);
        }
    }

    fn mix_dry(&mut self, out: &mut [f32]) {
        let Some(dry) = self.dry_input.as_mut() else {
            return;
        };
        let pass_through = self.params.routing.load(Ordering::Acquire) == 0;
        // Always drain so the ring cannot back up while routing is
        // synth-only.
        for frame in out.iter_mut() {
            match dry.pop() {
                Ok(sample) => {
                    if pass_through {
                        *frame += sample;
                    }
                }
                Err(_) => break,
            }
        }
    }
}
