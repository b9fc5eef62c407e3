// ABOUTME: cpal-based audio output implementation
// ABOUTME: Cross-platform audio output using the cpal library

use crate::audio::output::AudioOutput;
use crate::audio::AudioFormat;
use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

/// cpal-based audio output.
pub struct CpalOutput {
    format: AudioFormat,
    _stream: Stream,
    sample_tx: SyncSender<Arc<[f32]>>,
    latency_micros: Arc<Mutex<u64>>,
}

impl CpalOutput {
    /// Create a new cpal audio output for `format`.
    pub fn new(format: AudioFormat) -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("No output device available".to_string()))?;

        // Log device's default supported config to catch format mismatches
        if let Ok(def) = device.default_output_config() {
            log::info!(
                "Device default: {:?} {}Hz {}ch",
                def.sample_format(),
                def.sample_rate().0,
                def.channels()
            );
            if def.sample_rate().0 != format.sample_rate
                || def.channels() != format.channels as u16
            {
                log::warn!(
                    "WARN: requested {}Hz/{}ch; device default is {}Hz/{}ch (OS may resample)",
                    format.sample_rate, format.channels, def.sample_rate().0, def.channels()
                );
            }
        }

        let config = StreamConfig {
            channels: format.channels as u16,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Bounded channel for backpressure: 10 scheduler passes' worth of
        // frames is ample slack without letting decode run unbounded ahead.
        let (sample_tx, sample_rx) = sync_channel::<Arc<[f32]>>(10);
        let latency_micros = Arc::new(Mutex::new(0u64));
        let latency_clone = Arc::clone(&latency_micros);

        let stream = Self::build_stream(&device, &config, sample_rx, latency_clone)?;
        stream.play().map_err(|e| Error::Output(e.to_string()))?;

        Ok(Self {
            format,
            _stream: stream,
            sample_tx,
            latency_micros,
        })
    }

    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_rx: Receiver<Arc<[f32]>>,
        _latency_micros: Arc<Mutex<u64>>,
    ) -> Result<Stream, Error> {
        let sample_rx = Arc::new(Mutex::new(sample_rx));
        let mut current_buffer: Option<Arc<[f32]>> = None;
        let mut buffer_pos = 0;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample_out in data.iter_mut() {
                        // Get next sample from current buffer or receive new buffer
                        if current_buffer.is_none()
                            || buffer_pos >= current_buffer.as_ref().unwrap().len()
                        {
                            if let Ok(rx) = sample_rx.lock() {
                                if let Ok(buf) = rx.try_recv() {
                                    current_buffer = Some(buf);
                                    buffer_pos = 0;
                                }
                            }
                        }

                        *sample_out = match &current_buffer {
                            Some(buf) if buffer_pos < buf.len() => {
                                let s = buf[buffer_pos];
                                buffer_pos += 1;
                                s
                            }
                            _ => 0.0,
                        };
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;

        Ok(stream)
    }
}

// cpal's `Stream` carries a `PhantomData<*mut ()>` marker that makes it
// `!Send` on some platforms even though ownership transfer between threads
// is sound (the stream is never accessed concurrently from multiple
// threads; only its owning thread interacts with it, and callback state
// lives in the audio callback closure, not here).
unsafe impl Send for CpalOutput {}

impl AudioOutput for CpalOutput {
    fn write(&mut self, samples: &[f32]) -> Result<(), Error> {
        self.sample_tx
            .send(Arc::from(samples))
            .map_err(|_| Error::Output("Failed to send samples to audio thread".to_string()))
    }

    fn latency_micros(&self) -> u64 {
        *self.latency_micros.lock().unwrap()
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }
}
