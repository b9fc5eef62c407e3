// ABOUTME: FLAC decode via symphonia, fed raw frames with no container
// ABOUTME: STREAMINFO arrives once as stream/start's codec_header and seeds the decoder's extra_data

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_FLAC};
use symphonia::core::formats::Packet;

use crate::error::{Error, Result};

use super::Decoder;

/// Decodes raw FLAC frames (no Ogg/container framing) using the STREAMINFO
/// block carried out-of-band in `stream/start`'s `codec_header`.
pub struct FlacDecoder {
    inner: Box<dyn SymphoniaDecoder>,
    sample_rate: u32,
    channel_count: u8,
}

impl FlacDecoder {
    pub fn new(sample_rate: u32, channel_count: u8, codec_header: Option<&[u8]>) -> Result<Self> {
        let extra_data = codec_header.ok_or_else(|| {
            Error::Decode("flac stream started without a STREAMINFO codec_header".to_string())
        })?;

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_FLAC)
            .with_sample_rate(sample_rate)
            .with_extra_data(extra_data.to_vec().into_boxed_slice());

        let inner = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("failed to create flac decoder: {e}")))?;

        Ok(Self {
            inner,
            sample_rate,
            channel_count,
        })
    }
}

impl Decoder for FlacDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        let packet = Packet::new_from_slice(0, 0, 0, payload);
        let decoded = self
            .inner
            .decode(&packet)
            .map_err(|e| Error::Decode(format!("flac decode failed: {e}")))?;

        Ok(interleave_to_f32(&decoded))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u8 {
        self.channel_count
    }
}

/// Interleave a decoded symphonia buffer of any sample format into `f32`.
fn interleave_to_f32(decoded: &AudioBufferRef) -> Vec<f32> {
    let channels = decoded.spec().channels.count();
    let frames = decoded.frames();
    let mut out = Vec::with_capacity(frames * channels);

    match decoded {
        AudioBufferRef::F32(buf) => {
            for frame in 0..frames {
                for ch in 0..channels {
                    out.push(buf.chan(ch)[frame]);
                }
            }
        }
        AudioBufferRef::S16(buf) => {
            for frame in 0..frames {
                for ch in 0..channels {
                    out.push(buf.chan(ch)[frame] as f32 / 32768.0);
                }
            }
        }
        AudioBufferRef::S32(buf) => {
            for frame in 0..frames {
                for ch in 0..channels {
                    out.push(buf.chan(ch)[frame] as f32 / 2_147_483_648.0);
                }
            }
        }
        AudioBufferRef::U8(buf) => {
            for frame in 0..frames {
                for ch in 0..channels {
                    out.push((buf.chan(ch)[frame] as f32 - 128.0) / 128.0);
                }
            }
        }
        _ => out.resize(frames * channels, 0.0),
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_codec_header_is_rejected() {
        let result = FlacDecoder::new(48000, 2, None);
        assert!(result.is_err());
    }
}
