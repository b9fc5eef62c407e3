// ABOUTME: Raw interleaved PCM decode: 16/24/32-bit little-endian integers to f32

use crate::error::{Error, Result};

use super::Decoder;

/// Decodes raw little-endian interleaved PCM chunks to `f32` in `[-1.0, 1.0]`.
pub struct PcmDecoder {
    sample_rate: u32,
    channel_count: u8,
    bit_depth: u8,
    bytes_per_sample: usize,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32, channel_count: u8, bit_depth: u8) -> Result<Self> {
        let bytes_per_sample = match bit_depth {
            16 => 2,
            24 => 3,
            32 => 4,
            other => {
                return Err(Error::Unsupported(format!(
                    "pcm bit depth {other} is not supported"
                )))
            }
        };
        Ok(Self {
            sample_rate,
            channel_count,
            bit_depth,
            bytes_per_sample,
        })
    }
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        if payload.len() % self.bytes_per_sample != 0 {
            return Err(Error::Decode(format!(
                "pcm chunk length {} is not a multiple of {} bytes",
                payload.len(),
                self.bytes_per_sample
            )));
        }

        let sample_count = payload.len() / self.bytes_per_sample;
        let mut out = Vec::with_capacity(sample_count);

        match self.bit_depth {
            16 => {
                for chunk in payload.chunks_exact(2) {
                    let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                    out.push(v as f32 / 32768.0);
                }
            }
            24 => {
                for chunk in payload.chunks_exact(3) {
                    let raw = [chunk[0], chunk[1], chunk[2], if chunk[2] & 0x80 != 0 { 0xFF } else { 0x00 }];
                    let v = i32::from_le_bytes(raw);
                    out.push(v as f32 / 8_388_608.0);
                }
            }
            32 => {
                for chunk in payload.chunks_exact(4) {
                    let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    out.push(v as f32 / 2_147_483_648.0);
                }
            }
            _ => unreachable!("validated in new()"),
        }

        Ok(out)
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
    fn decodes_16_bit_full_scale() {
        let mut d = PcmDecoder::new(48000, 2, 16).unwrap();
        let bytes = i16::MAX.to_le_bytes();
        let out = d.decode(&bytes).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0] - 0.999969).abs() < 1e-4);
    }

    #[test]
    fn decodes_24_bit_negative() {
        let mut d = PcmDecoder::new(48000, 1, 24).unwrap();
        // -1 as 24-bit LE: 0xFF 0xFF 0xFF
        let out = d.decode(&[0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0] - (-1.0 / 8_388_608.0)).abs() < 1e-6);
    }

    #[test]
    fn rejects_unsupported_bit_depth() {
        assert!(PcmDecoder::new(48000, 2, 8).is_err());
    }

    #[test]
    fn rejects_misaligned_chunk() {
        let mut d = PcmDecoder::new(48000, 2, 16).unwrap();
        assert!(d.decode(&[0x00]).is_err());
    }
}
