use sendspin::audio::DecodedAudioFrame;
use sendspin::config::CorrectionMode;
use sendspin::scheduler::{CorrectionMethod, PlaybackSink, ScheduledAudio, Scheduler};
use sendspin::sync::TimeFilter;

/// An in-memory `PlaybackSink` a test can drive deterministically: no real
/// clock, no real audio device, just a recorded call log.
struct FakeSink {
    now: f64,
    running: bool,
    scheduled: Vec<ScheduledAudio>,
    cancel_calls: Vec<f64>,
}

impl FakeSink {
    fn new() -> Self {
        Self {
            now: 0.0,
            running: true,
            scheduled: Vec::new(),
            cancel_calls: Vec::new(),
        }
    }
}

impl PlaybackSink for FakeSink {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn output_latency_micros(&self) -> u64 {
        0
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn schedule(&mut self, source: ScheduledAudio) -> u64 {
        let id = self.scheduled.len() as u64 + 1;
        self.scheduled.push(source);
        id
    }

    fn cancel_from(&mut self, cutoff: f64) {
        self.cancel_calls.push(cutoff);
        self.scheduled.retain(|s| s.start_at < cutoff);
    }

    fn pump(&mut self) {}

    fn advance(&mut self, elapsed_us: u64) {
        self.now += elapsed_us as f64 / 1_000_000.0;
    }
}

fn synchronized_filter() -> TimeFilter {
    let mut filter = TimeFilter::new();
    filter.update(0.0, 100.0, 0);
    filter.update(0.0, 100.0, 1_000_000);
    assert!(filter.is_synchronized());
    filter
}

fn frame(server_time_us: i64, generation: u32, frame_count: usize) -> DecodedAudioFrame {
    DecodedAudioFrame {
        samples: vec![0.0; frame_count],
        server_time_us,
        generation,
        sample_rate: 48_000,
        channel_count: 1,
    }
}

fn new_scheduler() -> Scheduler {
    Scheduler::new(Box::new(FakeSink::new()), CorrectionMode::Sync, 0, true)
}

#[test]
fn run_pass_is_a_no_op_until_the_filter_synchronizes() {
    let mut scheduler = new_scheduler();
    let unsynced = TimeFilter::new();
    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&unsynced, 0, 1);
    assert_eq!(scheduler.queue_len(), 1, "frame should stay queued until sync");
}

#[test]
fn first_frame_schedules_as_resync_without_counting_as_a_gap() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();
    scheduler.enqueue(frame(1_000_000, 1, 480));

    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::Resync);
    assert_eq!(scheduler.resync_count(), 0, "the very first frame isn't a gap");
    assert_eq!(scheduler.queue_len(), 0);
}

#[test]
fn contiguous_frame_lands_in_the_deadband() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    // 10ms frame at 48kHz mono, 480 samples.
    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    // Exactly contiguous with the first frame's end (1_000_000 + 10_000us).
    scheduler.enqueue(frame(1_010_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::Deadband);
    assert_eq!(scheduler.resync_count(), 0);
}

#[test]
fn small_drift_triggers_single_sample_adjustment() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    // 5ms early relative to perfectly contiguous (1_010_000), within the
    // Sync mode's sample-correction band (1ms..8ms).
    scheduler.enqueue(frame(1_005_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::SampleAdjust);
    assert_eq!(scheduler.current_playback_rate(), 1.0);
}

#[test]
fn moderate_drift_triggers_rate_adjustment() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    // 50ms early, within the Sync mode's rate-correction band (8ms..200ms).
    scheduler.enqueue(frame(960_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::RateAdjust);
    assert_ne!(scheduler.current_playback_rate(), 1.0);
}

#[test]
fn a_timestamp_gap_forces_a_resync_and_counts_it() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);
    assert_eq!(scheduler.resync_count(), 0);

    // Half a second past where the stream left off: well past the 100ms gap threshold.
    scheduler.enqueue(frame(1_500_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::Resync);
    assert_eq!(scheduler.resync_count(), 1);
}

#[test]
fn a_gap_of_exactly_the_threshold_still_forces_a_resync() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    // 100ms frame at 48kHz mono starting at server time 0, ending at 100_000us.
    scheduler.enqueue(frame(0, 1, 4_800));
    scheduler.run_pass(&filter, 0, 1);
    assert_eq!(scheduler.resync_count(), 0);

    // Starts exactly 100ms after the first frame ends: the gap threshold is
    // a closed boundary, so this must still resync rather than deadband.
    scheduler.enqueue(frame(200_000, 1, 4_800));
    scheduler.run_pass(&filter, 0, 1);

    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::Resync);
    assert_eq!(scheduler.resync_count(), 1);
}

#[test]
fn stale_generation_frames_are_dropped_without_scheduling() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    scheduler.enqueue(frame(1_000_000, 1, 480));
    // Stream generation advanced to 2 (a stream/clear arrived) before this pass ran.
    scheduler.run_pass(&filter, 0, 2);

    assert_eq!(scheduler.queue_len(), 0, "stale-generation frames are discarded, not scheduled");
    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::None);
}

#[test]
fn clear_buffers_resets_anchors_so_the_next_frame_is_treated_as_first() {
    let mut scheduler = new_scheduler();
    let filter = synchronized_filter();

    scheduler.enqueue(frame(1_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);
    scheduler.enqueue(frame(5_000_000, 1, 480));
    scheduler.run_pass(&filter, 0, 1);
    assert_eq!(scheduler.resync_count(), 1);

    scheduler.clear_buffers();
    assert_eq!(scheduler.resync_count(), 0);
    assert_eq!(scheduler.queue_len(), 0);

    scheduler.enqueue(frame(9_000_000, 2, 480));
    scheduler.run_pass(&filter, 0, 2);
    assert_eq!(scheduler.current_correction_method(), CorrectionMethod::Resync);
    assert_eq!(scheduler.resync_count(), 0, "post-clear first frame isn't a counted gap");
}
