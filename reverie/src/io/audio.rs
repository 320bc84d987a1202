//! Fire-and-forget sine tones for programs.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::error::Error;
use std::f32::consts::TAU;
use std::sync::Arc;

use crate::core::logging::{debug, error, info, warn};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_VOLUME: f32 = 0.1;

/// Upper bound on simultaneously sounding tones; the oldest voice is dropped
/// when a program fires tones faster than they finish.
const MAX_VOICES: usize = 32;

/// Longest tone a program may request, in seconds.
const MAX_TONE_SECONDS: f32 = 10.0;

pub trait ToneSink {
    fn play_tone(&self, frequency: f32, duration: f32);
}

/// Generates `round(duration * sample_rate)` samples of a sine wave scaled
/// by `volume`.
pub fn generate_tone(
    frequency: f32,
    duration: f32,
    sample_rate: u32,
    volume: f32,
) -> Vec<f32> {
    if !frequency.is_finite() || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let duration = duration.min(MAX_TONE_SECONDS);
    let n_samples = (duration * sample_rate as f32).round() as usize;
    let step = TAU * frequency / sample_rate as f32;

    (0..n_samples)
        .map(|i| (step * i as f32).sin() * volume)
        .collect()
}

struct Voice {
    samples: Vec<f32>,
    cursor: usize,
}

#[derive(Default)]
struct Mixer {
    voices: Vec<Voice>,
}

impl Mixer {
    fn add(&mut self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices.push(Voice { samples, cursor: 0 });
    }

    fn next_sample(&mut self) -> f32 {
        let mut value = 0.0;
        for voice in &mut self.voices {
            if let Some(sample) = voice.samples.get(voice.cursor) {
                value += sample;
                voice.cursor += 1;
            }
        }
        value.clamp(-1.0, 1.0)
    }

    fn retire_finished(&mut self) {
        self.voices.retain(|v| v.cursor < v.samples.len());
    }
}

/// Plays tones through the default output device.
pub struct ToneSynth {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    volume: f32,
    _stream: Stream,
}

impl ToneSynth {
    pub fn start(volume: f32) -> Result<Self, Box<dyn Error>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No default audio output device")?;

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();
        let mixer = Arc::new(Mutex::new(Mixer::default()));

        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, mixer.clone())?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, mixer.clone())?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, mixer.clone())?
            }
            other => {
                return Err(
                    format!("Unsupported sample format: {other:?}").into()
                );
            }
        };

        stream.play()?;

        info!(
            "Tone output connected to device: {:?} ({} Hz, {} channels)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            stream_config.sample_rate.0,
            stream_config.channels,
        );

        Ok(Self {
            mixer,
            sample_rate: stream_config.sample_rate.0,
            volume,
            _stream: stream,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl ToneSink for ToneSynth {
    fn play_tone(&self, frequency: f32, duration: f32) {
        let samples =
            generate_tone(frequency, duration, self.sample_rate, self.volume);
        self.mixer.lock().add(samples);
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<Stream, Box<dyn Error>>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    if channels < 1 {
        return Err("Device must have at least one channel".into());
    }

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut mixer = mixer.lock();
            for frame in data.chunks_mut(channels) {
                let value = T::from_sample(mixer.next_sample());
                for sample in frame.iter_mut() {
                    *sample = value;
                }
            }
            mixer.retire_finished();
        },
        move |err| error!("Error in tone stream: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Used when no output device could be opened.
pub struct SilentTones;

impl ToneSink for SilentTones {
    fn play_tone(&self, frequency: f32, duration: f32) {
        debug!("(silent) tone {frequency} Hz for {duration}s");
    }
}

/// Opens the default device, falling back to [`SilentTones`].
pub fn default_tone_sink(volume: f32) -> Box<dyn ToneSink> {
    match ToneSynth::start(volume) {
        Ok(synth) => Box::new(synth),
        Err(err) => {
            warn!("Tones disabled; audio output unavailable: {}", err);
            Box::new(SilentTones)
        }
    }
}

/// Records requested tones instead of playing them; handy for headless runs
/// and tests.
#[derive(Default)]
pub struct ToneLog {
    tones: RefCell<Vec<(f32, f32)>>,
}

impl ToneLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tones(&self) -> Vec<(f32, f32)> {
        self.tones.borrow().clone()
    }
}

impl ToneSink for ToneLog {
    fn play_tone(&self, frequency: f32, duration: f32) {
        self.tones.borrow_mut().push((frequency, duration));
    }
}
