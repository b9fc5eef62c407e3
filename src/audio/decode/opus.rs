// ABOUTME: Opus decode via the software `opus` crate, per the single-backend resolution
// ABOUTME: Each wire chunk is exactly one Opus packet; there is no Ogg framing to strip

use ::opus::{Channels, Decoder as OpusLibDecoder};

use crate::error::{Error, Result};

use super::Decoder;

/// Software Opus decode. Hardware-accelerated decode is left unimplemented;
/// a single software path keeps the `Decoder` trait synchronous and
/// platform-independent.
pub struct OpusDecoder {
    inner: OpusLibDecoder,
    sample_rate: u32,
    channel_count: u8,
    scratch: Vec<f32>,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channel_count: u8) -> Result<Self> {
        let channels = match channel_count {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(Error::Unsupported(format!(
                    "opus channel count {other} is not supported"
                )))
            }
        };

        let inner = OpusLibDecoder::new(sample_rate, channels)
            .map_err(|e| Error::Decode(format!("failed to create opus decoder: {e}")))?;

        // 120ms is the largest Opus frame; leaves headroom for any frame size
        // the server sends without needing to grow the scratch buffer.
        let max_frame_samples = (sample_rate as usize * 120 / 1000) * channel_count as usize;

        Ok(Self {
            inner,
            sample_rate,
            channel_count,
            scratch: vec![0.0; max_frame_samples],
        })
    }
}

impl Decoder for OpusDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        let decoded_frames = self
            .inner
            .decode_float(payload, &mut self.scratch, false)
            .map_err(|e| Error::Decode(format!("opus decode failed: {e}")))?;

        let sample_count = decoded_frames * self.channel_count as usize;
        Ok(self.scratch[..sample_count].to_vec())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u8 {
        self.channel_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_channel_count() {
        assert!(OpusDecoder::new(48000, 6).is_err());
    }
}
