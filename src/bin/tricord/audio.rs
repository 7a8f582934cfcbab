//! cpal plumbing: output stream rendering the bank, optional input stream
//! feeding the dry path and the pitch detector.

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use tricord::synth::{shared_bank, BankHandle};
use tricord::voice::bank::RoleGains;

/// Running audio stack. Streams stop when this is dropped.
pub struct Audio {
    pub bank: Option<BankHandle>,
    pub sample_rate: f32,
    /// Microphone samples for the pitch detector; `None` without an input
    /// device.
    pub mic: Option<rtrb::Consumer<f32>>,
    _output: cpal::Stream,
    _input: Option<cpal::Stream>,
}

pub fn start(gains: Arc<RoleGains>) -> EyreResult<Audio> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| eyre!("no default output device available"))?;
    let config = device
        .default_output_config()
        .wrap_err("failed to fetch default output config")?;

    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(eyre!("unsupported sample format (only f32 supported)"));
    }

    let sample_rate = config.sample_rate().0 as f32;
    let channels = config.channels() as usize;

    let (bank, mut renderer) = shared_bank(sample_rate, gains);

    // Rings out of the input callback: one for the dry signal path, one for
    // the pitch detector. A full ring just drops samples.
    let (dry_tx, dry_rx) = rtrb::RingBuffer::<f32>::new(1 << 14);
    let (mic_tx, mic_rx) = rtrb::RingBuffer::<f32>::new(1 << 15);
    renderer.set_dry_input(dry_rx);

    let err_fn = |err| eprintln!("audio stream error: {err}");

    let mut scratch = vec![0.0_f32; 4096];
    let output = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let frames = data.len() / channels;
                if scratch.len() < frames {
                    // Device asked for more than we pre-sized; grow once.
                    scratch.resize(frames, 0.0);
                }
                let block = &mut scratch[..frames];
                renderer.render(block);
                for (i, &sample) in block.iter().enumerate() {
                    for ch in 0..channels {
                        data[i * channels + ch] = sample;
                    }
                }
            },
            err_fn,
            None,
        )
        .wrap_err("failed to build output stream")?;
    output.play().wrap_err("failed to start output stream")?;

    let input = try_start_input(&host, dry_tx, mic_tx);
    let mic = input.as_ref().map(|_| mic_rx);

    Ok(Audio {
        bank: Some(bank),
        sample_rate,
        mic,
        _output: output,
        _input: input,
    })
}

/// Open the default input device, folding frames to mono into both rings.
/// Missing or failing input is not fatal - the simulator still runs, just
/// without live pitch detection or a dry path.
fn try_start_input(
    host: &cpal::Host,
    mut dry_tx: rtrb::Producer<f32>,
    mut mic_tx: rtrb::Producer<f32>,
) -> Option<cpal::Stream> {
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            eprintln!("tricord: no input device - pitch detection disabled");
            return None;
        }
    };

    let supported = device.default_input_config().ok()?;
    let stream_config: cpal::StreamConfig = supported.into();
    let in_channels = (stream_config.channels as usize).max(1);

    let err_fn = |err| eprintln!("audio input stream error: {err}");

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(in_channels) {
                    let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                    let _ = dry_tx.push(mono);
                    let _ = mic_tx.push(mono);
                }
            },
            err_fn,
            None,
        )
        .ok()?;

    if let Err(e) = stream.play() {
        eprintln!("tricord: could not start input stream: {e}");
        return None;
    }
    Some(stream)
}
