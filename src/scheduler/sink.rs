// ABOUTME: PlaybackSink: a schedulable-source abstraction the Scheduler drives
// ABOUTME: BufferedSink adapts the push-streaming AudioOutput trait to the Scheduler's scheduled-source contract

use std::collections::VecDeque;

use crate::audio::output::AudioOutput;

/// One scheduled unit of audio, handed to a `PlaybackSink`.
pub struct ScheduledAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channel_count: u8,
    /// Sink-clock seconds at which the first sample should play.
    pub start_at: f64,
    /// Playback speed multiplier; 1.0 is unmodified.
    pub rate: f64,
}

/// A sink the Scheduler can push scheduled sources into and query a virtual
/// playback clock from: `current_time()` for the clock, `schedule()` to
/// hand off a source with a `start_at`/`rate`, `cancel_from()` to flush.
pub trait PlaybackSink: Send {
    /// Current playback position, in seconds, on the sink's own clock.
    fn current_time(&self) -> f64;

    /// Reported output latency (base + output stage), in microseconds.
    fn output_latency_micros(&self) -> u64;

    fn is_running(&self) -> bool;

    /// Schedule a source; returns a handle usable with `cancel`.
    fn schedule(&mut self, source: ScheduledAudio) -> u64;

    /// Cancel every scheduled source whose start time is at or after `cutoff`.
    fn cancel_from(&mut self, cutoff: f64);

    /// Drain anything now due and push it to the underlying output.
    /// Called once per scheduling pass after new sources are queued.
    fn pump(&mut self);

    /// Advance the sink's virtual playback clock by `elapsed_us` and pump
    /// anything now due. A sink backed by real hardware timing may ignore
    /// this and derive `current_time` from the device directly.
    fn advance(&mut self, elapsed_us: u64);
}

struct PendingSource {
    id: u64,
    start_at: f64,
    samples: Vec<f32>,
    sample_rate: u32,
    channel_count: u8,
    rate: f64,
}

/// Adapts a push-streaming [`AudioOutput`] into a `PlaybackSink` by holding
/// scheduled sources in start-time order and writing each one through once
/// the virtual clock reaches its `start_at`.
///
/// The virtual clock advances by counting samples actually written to the
/// output, since `AudioOutput` has no callback-driven position of its own
/// here; `advance` is called by the session loop on a steady tick.
pub struct BufferedSink<O: AudioOutput> {
    output: O,
    pending: VecDeque<PendingSource>,
    played_seconds: f64,
    next_id: u64,
    running: bool,
}

impl<O: AudioOutput> BufferedSink<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            pending: VecDeque::new(),
            played_seconds: 0.0,
            next_id: 1,
            running: true,
        }
    }

    fn resample_for_rate(samples: &[f32], channel_count: u8, rate: f64) -> Vec<f32> {
        if (rate - 1.0).abs() < 1e-9 || channel_count == 0 {
            return samples.to_vec();
        }
        let channels = channel_count as usize;
        let in_frames = samples.len() / channels;
        if in_frames == 0 {
            return Vec::new();
        }
        let out_frames = ((in_frames as f64) / rate).round().max(1.0) as usize;
        let mut out = Vec::with_capacity(out_frames * channels);
        for out_idx in 0..out_frames {
            let src_pos = out_idx as f64 * rate;
            let idx0 = (src_pos.floor() as usize).min(in_frames - 1);
            let idx1 = (idx0 + 1).min(in_frames - 1);
            let frac = src_pos - idx0 as f64;
            for ch in 0..channels {
                let a = samples[idx0 * channels + ch];
                let b = samples[idx1 * channels + ch];
                out.push((a as f64 + (b - a) as f64 * frac) as f32);
            }
        }
        out
    }
}

impl<O: AudioOutput> PlaybackSink for BufferedSink<O> {
    fn current_time(&self) -> f64 {
        self.played_seconds
    }

    fn output_latency_micros(&self) -> u64 {
        self.output.latency_micros()
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn schedule(&mut self, source: ScheduledAudio) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let insert_at = self
            .pending
            .iter()
            .position(|p| p.start_at > source.start_at)
            .unwrap_or(self.pending.len());
        self.pending.insert(
            insert_at,
            PendingSource {
                id,
                start_at: source.start_at,
                samples: source.samples,
                sample_rate: source.sample_rate,
                channel_count: source.channel_count,
                rate: source.rate,
            },
        );
        id
    }

    fn cancel_from(&mut self, cutoff: f64) {
        self.pending.retain(|p| p.start_at < cutoff);
    }

    fn pump(&mut self) {
        while let Some(front) = self.pending.front() {
            if front.start_at > self.played_seconds {
                break;
            }
            let source = self.pending.pop_front().expect("front just peeked");
            let samples =
                Self::resample_for_rate(&source.samples, source.channel_count, source.rate);
            if let Err(e) = self.output.write(&samples) {
                log::warn!("sink write failed: {e}");
            }
            let _ = source.sample_rate;
            let _ = source.id;
        }
    }

    fn advance(&mut self, elapsed_us: u64) {
        self.played_seconds += elapsed_us as f64 / 1_000_000.0;
        self.pump();
    }
}
