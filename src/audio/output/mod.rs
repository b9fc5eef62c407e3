// ABOUTME: Audio sink abstraction: the scheduler hands ready frames to an AudioOutput
// ABOUTME: CpalOutput is the production sink; tests use an in-memory recorder

mod cpal_output;

pub use cpal_output::CpalOutput;

use crate::audio::AudioFormat;
use crate::error::Result;

/// A sink that accepts interleaved `f32` samples at a fixed format.
pub trait AudioOutput: Send {
    /// Enqueue samples for playback. Non-blocking; backpressure is the
    /// caller's responsibility (the scheduler paces writes to the format's
    /// real-time rate).
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Output-path latency, in microseconds, from `write()` to audible sound.
    /// Used by the scheduler's output-latency compensation.
    fn latency_micros(&self) -> u64;

    fn format(&self) -> &AudioFormat;
}
