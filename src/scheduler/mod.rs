// ABOUTME: The scheduling pass: drift-corrected target times, four correction tiers, edge interpolation
// ABOUTME: Runs on the debounce timer or immediately after a synchronous decode with no timer pending

mod sink;

pub use sink::{BufferedSink, PlaybackSink, ScheduledAudio};

use crate::audio::DecodedAudioFrame;
use crate::config::{CorrectionMode, CorrectionThresholds};
use crate::sync::TimeFilter;

const HEADROOM_S: f64 = 0.200;
const GAP_THRESHOLD_US: i64 = 100_000;

/// Observational record of which correction tier the last dispatched frame used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMethod {
    /// No frame has been dispatched yet.
    None,
    /// Tier 0: waiting for the Time Filter to settle.
    Wait,
    Deadband,
    SampleAdjust,
    RateAdjust,
    Resync,
}

struct ScheduledSourceHandle {
    #[allow(dead_code)]
    id: u64,
    end_at: f64,
}

/// The audio scheduler: owns the pending-frame queue, the playback anchor,
/// and every correction-tier decision.
pub struct Scheduler {
    sink: Box<dyn PlaybackSink>,
    queue: Vec<DecodedAudioFrame>,
    scheduled_sources: Vec<ScheduledSourceHandle>,

    next_playback_time: f64,
    last_scheduled_server_end_time_us: i64,
    smoothed_sync_error_ms: f64,
    latency_ema_us: f64,

    resync_count: u32,
    current_playback_rate: f64,
    current_correction_method: CorrectionMethod,

    correction_mode: CorrectionMode,
    sync_delay_ms: i64,
    use_output_latency_compensation: bool,
    /// Tier-0 gate: the Time Filter's error must be at or below this before
    /// a contiguous frame is corrected instead of parked at `next_playback_time`.
    wait_error_cap_us: f64,
}

impl Scheduler {
    pub fn new(
        sink: Box<dyn PlaybackSink>,
        correction_mode: CorrectionMode,
        sync_delay_ms: i64,
        use_output_latency_compensation: bool,
    ) -> Self {
        Self {
            sink,
            queue: Vec::new(),
            scheduled_sources: Vec::new(),
            next_playback_time: 0.0,
            last_scheduled_server_end_time_us: 0,
            smoothed_sync_error_ms: 0.0,
            latency_ema_us: 0.0,
            resync_count: 0,
            current_playback_rate: 1.0,
            current_correction_method: CorrectionMethod::None,
            correction_mode,
            sync_delay_ms,
            use_output_latency_compensation,
            wait_error_cap_us: 20_000.0,
        }
    }

    /// Append a decoded frame. Generation filtering happens at decode time
    /// (the frame is already stamped) and again at the top of `run_pass`.
    pub fn enqueue(&mut self, frame: DecodedAudioFrame) {
        self.queue.push(frame);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn resync_count(&self) -> u32 {
        self.resync_count
    }

    pub fn current_playback_rate(&self) -> f64 {
        self.current_playback_rate
    }

    pub fn current_correction_method(&self) -> CorrectionMethod {
        self.current_correction_method
    }

    /// Run one scheduling pass. No-op if the sink isn't ready or the filter
    /// hasn't synchronized yet; queued frames are left for the next pass.
    pub fn run_pass(&mut self, time_filter: &TimeFilter, t_local_now_us: i64, stream_generation: u32) {
        if !self.sink.is_running() || !time_filter.is_synchronized() {
            return;
        }

        self.queue.retain(|f| f.generation == stream_generation);
        self.queue.sort_by_key(|f| f.server_time_us);

        let t_sink = self.sink.current_time();
        let thresholds = self.correction_mode.thresholds();
        let sync_delay_s = self.sync_delay_ms as f64 / 1000.0;

        let raw_latency_us = self.sink.output_latency_micros() as f64;
        self.latency_ema_us = 0.01 * raw_latency_us + 0.99 * self.latency_ema_us;

        let frames = std::mem::take(&mut self.queue);
        for frame in frames {
            let t_server_client_us = time_filter.compute_client_time(frame.server_time_us, t_local_now_us);
            let delta_s = (t_server_client_us - t_local_now_us) as f64 / 1_000_000.0;

            let mut target_sink_time = t_sink + delta_s + HEADROOM_S + sync_delay_s;
            if !self.use_output_latency_compensation {
                target_sink_time -= self.latency_ema_us / 1_000_000.0;
            }

            let (schedule_at, rate, adjusted_samples) =
                self.decide(frame.server_time_us, target_sink_time, time_filter, &thresholds, &frame);

            if schedule_at < t_sink {
                self.next_playback_time = 0.0;
                self.last_scheduled_server_end_time_us = 0;
                continue;
            }

            let samples = adjusted_samples.unwrap_or_else(|| frame.samples.clone());
            let frame_count = if frame.channel_count == 0 {
                0
            } else {
                samples.len() / frame.channel_count as usize
            };
            let duration_s = frame_count as f64 / frame.sample_rate.max(1) as f64;

            let id = self.sink.schedule(ScheduledAudio {
                samples,
                sample_rate: frame.sample_rate,
                channel_count: frame.channel_count,
                start_at: schedule_at,
                rate,
            });
            self.current_playback_rate = rate;
            self.scheduled_sources.push(ScheduledSourceHandle {
                id,
                end_at: schedule_at + duration_s / rate,
            });

            self.next_playback_time = schedule_at + duration_s / rate;
            self.last_scheduled_server_end_time_us =
                frame.server_time_us + (duration_s * 1_000_000.0).round() as i64;
        }

        self.sink.pump();
        self.scheduled_sources.retain(|s| s.end_at > t_sink);
    }

    fn decide(
        &mut self,
        frame_server_time_us: i64,
        target_sink_time: f64,
        time_filter: &TimeFilter,
        thresholds: &CorrectionThresholds,
        frame: &DecodedAudioFrame,
    ) -> (f64, f64, Option<Vec<f32>>) {
        let is_gap = self.last_scheduled_server_end_time_us != 0
            && (frame_server_time_us - self.last_scheduled_server_end_time_us).abs() >= GAP_THRESHOLD_US;

        if self.next_playback_time == 0.0 || is_gap {
            if is_gap {
                self.resync_count += 1;
                self.sink.cancel_from(target_sink_time);
                self.scheduled_sources.retain(|s| s.end_at <= target_sink_time);
            }
            self.smoothed_sync_error_ms = 0.0;
            self.current_correction_method = CorrectionMethod::Resync;
            return (target_sink_time, 1.0, None);
        }

        if time_filter.error_us() > self.wait_error_cap_us {
            self.current_correction_method = CorrectionMethod::Wait;
            return (self.next_playback_time, 1.0, None);
        }

        let sync_error_ms = (self.next_playback_time - target_sink_time) * 1000.0;
        self.smoothed_sync_error_ms = 0.1 * sync_error_ms + 0.9 * self.smoothed_sync_error_ms;
        let e = self.smoothed_sync_error_ms;
        let abs_e = e.abs();

        if abs_e < thresholds.deadband_ms {
            self.current_correction_method = CorrectionMethod::Deadband;
            (self.next_playback_time, 1.0, None)
        } else if abs_e < thresholds.sample_correct_ms {
            self.current_correction_method = CorrectionMethod::SampleAdjust;
            let adjusted = edge_interpolate(&frame.samples, frame.channel_count, e > 0.0);
            (self.next_playback_time, 1.0, Some(adjusted))
        } else if let Some(rate_cap) = thresholds.rate_correct_ms {
            if abs_e < rate_cap {
                let step = if abs_e >= thresholds.rate_large_step_ms { 0.02 } else { 0.01 };
                let rate = if e > 0.0 { 1.0 - step } else { 1.0 + step };
                self.current_correction_method = CorrectionMethod::RateAdjust;
                (self.next_playback_time, rate, None)
            } else {
                self.resync_count += 1;
                self.sink.cancel_from(target_sink_time);
                self.scheduled_sources.retain(|s| s.end_at <= target_sink_time);
                self.smoothed_sync_error_ms = 0.0;
                self.current_correction_method = CorrectionMethod::Resync;
                (target_sink_time, 1.0, None)
            }
        } else {
            self.resync_count += 1;
            self.sink.cancel_from(target_sink_time);
            self.scheduled_sources.retain(|s| s.end_at <= target_sink_time);
            self.smoothed_sync_error_ms = 0.0;
            self.current_correction_method = CorrectionMethod::Resync;
            (target_sink_time, 1.0, None)
        }
    }

    /// Stop every scheduled source, discard the queue, and reset every
    /// anchor: the buffer-clear (seek) operation. Format, `is_playing`,
    /// and the Time Filter are untouched; the caller bumps `stream_generation`.
    pub fn clear_buffers(&mut self) {
        self.sink.cancel_from(f64::NEG_INFINITY);
        self.queue.clear();
        self.scheduled_sources.clear();
        self.next_playback_time = 0.0;
        self.last_scheduled_server_end_time_us = 0;
        self.smoothed_sync_error_ms = 0.0;
        self.resync_count = 0;
        self.latency_ema_us = 0.0;
    }

    pub fn close(&mut self) {
        self.clear_buffers();
    }

    /// Advance the underlying sink's virtual playback clock.
    pub fn advance_sink(&mut self, elapsed_us: u64) {
        self.sink.advance(elapsed_us);
    }

    /// The sink's current raw output latency. Read by the session loop to
    /// feed the Protocol Engine's time-sync measurements when
    /// `use_output_latency_compensation` is enabled.
    pub fn raw_output_latency_micros(&self) -> u64 {
        self.sink.output_latency_micros()
    }
}

/// Insert or delete one interpolated sample at the appropriate edge of a
/// frame, operating on a fresh copy. `ahead == true` inserts (holds back);
/// `ahead == false` deletes (catches up). Frames under two audio-frames long
/// pass through unchanged.
fn edge_interpolate(samples: &[f32], channel_count: u8, ahead: bool) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    let frame_count = samples.len() / channels;
    if frame_count < 2 {
        return samples.to_vec();
    }

    if ahead {
        // [A, B, C, ...] -> [A, (A+B)/2, B, C, ...]
        let mut out = Vec::with_capacity(samples.len() + channels);
        out.extend_from_slice(&samples[..channels]);
        for ch in 0..channels {
            let a = samples[ch];
            let b = samples[channels + ch];
            out.push((a + b) / 2.0);
        }
        out.extend_from_slice(&samples[channels..]);
        out
    } else {
        // [..., Y, Z] -> [..., (Y+Z)/2]
        let mut out = samples[..(frame_count - 2) * channels].to_vec();
        for ch in 0..channels {
            let y = samples[(frame_count - 2) * channels + ch];
            let z = samples[(frame_count - 1) * channels + ch];
            out.push((y + z) / 2.0);
        }
        out
    }
}
