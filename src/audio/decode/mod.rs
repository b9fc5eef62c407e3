// ABOUTME: Per-codec decode front-end: dispatches each stream/start format to the right decoder
// ABOUTME: Every Decoder produces interleaved f32 samples from one wire chunk at a time

mod flac;
mod opus;
mod pcm;

pub use flac::FlacDecoder;
pub use opus::OpusDecoder;
pub use pcm::PcmDecoder;

use crate::config::Codec;
use crate::error::Result;
use crate::state::StreamFormat;

/// Decodes one codec's wire chunks into interleaved `f32` PCM.
///
/// A fresh `Decoder` is constructed per `stream/start` (per generation); it
/// is never reused across a format change, since codec state (e.g. a FLAC
/// decoder's STREAMINFO) is tied to the format that produced it.
pub trait Decoder: Send {
    /// Decode one binary audio chunk's payload into interleaved `f32`
    /// samples at this decoder's native sample rate and channel count.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>>;

    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> u8;
}

/// Construct the decoder named by `format.codec`.
pub fn make_decoder(format: &StreamFormat) -> Result<Box<dyn Decoder>> {
    match format.codec {
        Codec::Pcm => Ok(Box::new(PcmDecoder::new(
            format.sample_rate,
            format.channel_count,
            format.bit_depth.unwrap_or(16),
        )?)),
        Codec::Flac => Ok(Box::new(FlacDecoder::new(
            format.sample_rate,
            format.channel_count,
            format.codec_header.as_deref(),
        )?)),
        Codec::Opus => Ok(Box::new(OpusDecoder::new(
            format.sample_rate,
            format.channel_count,
        )?)),
    }
}
