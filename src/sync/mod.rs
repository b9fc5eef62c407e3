// ABOUTME: Time synchronization: the recursive offset/drift estimator and its NTP sample math

mod filter;

pub use filter::{TimeFilter, TimeFilterConfig};

/// One NTP-style four-timestamp exchange, reduced to the measurement pair
/// the filter consumes.
#[derive(Debug, Clone, Copy)]
pub struct NtpSample {
    /// Symmetric offset estimate, in microseconds.
    pub measurement_us: f64,
    /// Half the round-trip residual, a non-negative upper bound on error.
    pub max_error_us: f64,
}

impl NtpSample {
    /// Reduce the four raw timestamps (µs) into a measurement/error pair.
    ///
    /// `t1` = client send, `t2` = server receive, `t3` = server send,
    /// `t4` = client receive.
    pub fn from_timestamps(t1: i64, t2: i64, t3: i64, t4: i64) -> Self {
        let measurement_us = (((t2 - t1) + (t3 - t4)) as f64) / 2.0;
        let max_error_us = (((t4 - t1) - (t3 - t2)) as f64) / 2.0;
        Self {
            measurement_us,
            max_error_us: max_error_us.max(0.0),
        }
    }
}

/// Coarse-grained sync quality, derived from the filter's current error bound.
/// Used to populate the `player.state` field of outbound `client/state` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncQuality {
    /// Synchronized and within normal error bounds.
    Good,
    /// Synchronized but the error bound is elevated.
    Degraded,
    /// Not yet synchronized, or synchronization has been lost.
    Lost,
}

impl TimeFilter {
    /// Coarse sync-quality classification for reporting purposes.
    pub fn quality(&self) -> SyncQuality {
        if !self.is_synchronized() {
            return SyncQuality::Lost;
        }
        if self.error_us() < 5_000.0 {
            SyncQuality::Good
        } else {
            SyncQuality::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntp_sample_reduces_four_timestamps_to_offset_and_error() {
        let s = NtpSample::from_timestamps(1_000_000, 500_000, 500_010, 1_000_050);
        // measurement = ((500_000-1_000_000)+(500_010-1_000_050))/2 = (-500_000 + -500_040)/2 = -500_020
        assert_eq!(s.measurement_us, -500_020.0);
        // max_error = ((1_000_050-1_000_000)-(500_010-500_000))/2 = (50-10)/2 = 20
        assert_eq!(s.max_error_us, 20.0);
    }

    #[test]
    fn quality_lost_before_sync() {
        let filter = TimeFilter::new();
        assert_eq!(filter.quality(), SyncQuality::Lost);
    }
}
