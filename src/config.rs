// ABOUTME: Core configuration recognized by the session
// ABOUTME: Connection, codec, and drift-correction options for a receiver session

use uuid::Uuid;

/// Correction-tier threshold table selector for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMode {
    /// Default: tight deadband, rate correction tier enabled.
    Sync,
    /// Wider sample-correction window, no rate tier.
    Quality,
    /// Very wide sample-correction window, no rate tier, loosest deadband.
    QualityLocal,
}

impl Default for CorrectionMode {
    fn default() -> Self {
        CorrectionMode::Sync
    }
}

/// Per-tier thresholds, in milliseconds, selected by `CorrectionMode`.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionThresholds {
    /// |e| below this: no correction (tier 1).
    pub deadband_ms: f64,
    /// |e| below this: single-sample insert/delete (tier 2).
    pub sample_correct_ms: f64,
    /// |e| below this: rate adjustment is used (tier 3); `None` disables the rate tier.
    pub rate_correct_ms: Option<f64>,
    /// |e| at or above this: hard resync (tier 4).
    pub resync_above_ms: f64,
    /// |e| at or above this within the rate tier: use the larger of the two rate steps.
    pub rate_large_step_ms: f64,
}

impl CorrectionMode {
    /// Threshold table for this mode.
    pub fn thresholds(self) -> CorrectionThresholds {
        match self {
            CorrectionMode::Sync => CorrectionThresholds {
                deadband_ms: 1.0,
                sample_correct_ms: 8.0,
                rate_correct_ms: Some(200.0),
                resync_above_ms: 200.0,
                rate_large_step_ms: 35.0,
            },
            CorrectionMode::Quality => CorrectionThresholds {
                deadband_ms: 1.0,
                sample_correct_ms: 35.0,
                rate_correct_ms: None,
                resync_above_ms: 35.0,
                rate_large_step_ms: f64::INFINITY,
            },
            CorrectionMode::QualityLocal => CorrectionThresholds {
                deadband_ms: 5.0,
                sample_correct_ms: 600.0,
                rate_correct_ms: None,
                resync_above_ms: 600.0,
                rate_large_step_ms: f64::INFINITY,
            },
        }
    }
}

/// Codec priority entry: which codecs the host can decode, most preferred first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Pcm,
    Flac,
    Opus,
}

impl Codec {
    /// The wire name used in `client/hello` and `stream/start` payloads.
    pub fn wire_name(self) -> &'static str {
        match self {
            Codec::Pcm => "pcm",
            Codec::Flac => "flac",
            Codec::Opus => "opus",
        }
    }

    /// Parse a wire codec name, returning `None` for anything unrecognized.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "pcm" => Some(Codec::Pcm),
            "flac" => Some(Codec::Flac),
            "opus" => Some(Codec::Opus),
            _ => None,
        }
    }
}

/// Session-wide configuration, constructed once per connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity string sent in `client/hello`; generated if not set explicitly.
    pub player_id: String,
    /// Human label sent in `client/hello`.
    pub client_name: String,
    /// Server base URL (http(s)://host); converted to ws(s)://host/sendspin at connect time.
    pub base_url: String,
    /// Advertised codec priority, most preferred first.
    pub codecs: Vec<Codec>,
    /// Advertised accepted buffer size, in bytes.
    pub buffer_capacity: u32,
    /// Signed static offset (ms) added to every scheduled time.
    pub sync_delay_ms: i64,
    /// If true, fold raw sink latency into time-filter measurements instead of
    /// subtracting the smoothed estimate from each scheduled target inline.
    pub use_output_latency_compensation: bool,
    /// If true, software gain stays at unity and volume/mute are delegated externally.
    pub use_hardware_volume: bool,
    /// Selects the correction-tier threshold table.
    pub correction_mode: CorrectionMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player_id: Uuid::new_v4().to_string(),
            client_name: "Sendspin-Sync Player".to_string(),
            base_url: "http://localhost:8927".to_string(),
            codecs: vec![Codec::Pcm, Codec::Flac, Codec::Opus],
            buffer_capacity: 100,
            sync_delay_ms: 0,
            use_output_latency_compensation: false,
            use_hardware_volume: false,
            correction_mode: CorrectionMode::Sync,
        }
    }
}

impl Config {
    /// Build the `ws(s)://host/sendspin` connection URL from `base_url`.
    pub fn websocket_url(&self) -> crate::error::Result<String> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| crate::error::Error::Connection(format!("invalid base_url: {e}")))?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            "ws" => "ws",
            "wss" => "wss",
            other => {
                return Err(crate::error::Error::Connection(format!(
                    "unsupported scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| crate::error::Error::Connection("failed to set scheme".to_string()))?;
        url.set_path("/sendspin");
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_becomes_ws() {
        let cfg = Config {
            base_url: "http://example.com:8927".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.websocket_url().unwrap(), "ws://example.com:8927/sendspin");
    }

    #[test]
    fn https_becomes_wss() {
        let cfg = Config {
            base_url: "https://example.com".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.websocket_url().unwrap(), "wss://example.com/sendspin");
    }

    #[test]
    fn quality_local_has_no_rate_tier() {
        let t = CorrectionMode::QualityLocal.thresholds();
        assert!(t.rate_correct_ms.is_none());
        assert_eq!(t.deadband_ms, 5.0);
    }
}
