// ABOUTME: Recursive offset/drift estimator fusing NTP-style four-timestamp exchanges
// ABOUTME: compute_client_time is monotone in t_server for any fixed filter state (see tests)

/// Tunable constants for the recursive estimator.
///
/// These are chosen so that (a) the second accepted measurement flips
/// `is_synchronized` to true, (b) steady-state `error` settles to the
/// low hundreds of microseconds on a well-behaved LAN, and (c) a single
/// large outlier measurement cannot snap the offset.
#[derive(Debug, Clone, Copy)]
pub struct TimeFilterConfig {
    /// Measurements whose `max_error` exceeds this (µs) are rejected outright.
    pub outlier_cap_us: f64,
    /// `error` must be at or below this (µs) before `is_synchronized` flips true.
    pub confidence_cap_us: f64,
    /// Variance growth per second of elapsed time since the last update (µs²/s).
    pub process_noise_variance_per_sec: f64,
    /// Damping gain applied when folding the observed drift into the running estimate.
    pub drift_gain: f64,
    /// Measurements whose innovation exceeds this many std-deviations of the
    /// prior are rejected as outliers (ignored until the second measurement,
    /// since there is no prior to compare against yet).
    pub outlier_innovation_sigmas: f64,
}

impl Default for TimeFilterConfig {
    fn default() -> Self {
        Self {
            outlier_cap_us: 500_000.0,
            confidence_cap_us: 50_000.0,
            process_noise_variance_per_sec: 50.0,
            drift_gain: 0.02,
            outlier_innovation_sigmas: 6.0,
        }
    }
}

/// Recursive estimator of (offset, drift) between the local monotonic clock
/// and the server clock, with an associated 1-sigma error bound.
#[derive(Debug, Clone)]
pub struct TimeFilter {
    config: TimeFilterConfig,
    offset_us: f64,
    drift: f64,
    error_us: f64,
    anchor_us: i64,
    initialized: bool,
    measurement_count: u32,
    is_synchronized: bool,
}

impl TimeFilter {
    /// Construct a filter with the default tuning.
    pub fn new() -> Self {
        Self::with_config(TimeFilterConfig::default())
    }

    /// Construct a filter with explicit tuning.
    pub fn with_config(config: TimeFilterConfig) -> Self {
        Self {
            config,
            offset_us: 0.0,
            drift: 0.0,
            error_us: 0.0,
            anchor_us: 0,
            initialized: false,
            measurement_count: 0,
            is_synchronized: false,
        }
    }

    /// Discard all estimator state. Called on reconnect or explicit reset.
    pub fn reset(&mut self) {
        *self = Self::with_config(self.config);
    }

    /// Absorb one NTP-style measurement.
    ///
    /// `measurement_us` is the symmetric offset estimate
    /// `((T2 - T1) + (T3 - T4)) / 2`; `max_error_us` is the non-negative
    /// round-trip-residual bound `((T4 - T1) - (T3 - T2)) / 2`;
    /// `t_local_now_us` is `T4`. Returns `true` if the measurement was
    /// accepted, `false` if rejected as an outlier.
    pub fn update(&mut self, measurement_us: f64, max_error_us: f64, t_local_now_us: i64) -> bool {
        let max_error_us = max_error_us.max(0.0);
        if max_error_us > self.config.outlier_cap_us {
            log::warn!("time filter: rejecting sample, max_error={max_error_us}us exceeds cap");
            return false;
        }

        if !self.initialized {
            self.offset_us = measurement_us;
            self.drift = 0.0;
            self.error_us = max_error_us;
            self.anchor_us = t_local_now_us;
            self.initialized = true;
            self.measurement_count = 1;
            return true;
        }

        let elapsed_us = (t_local_now_us - self.anchor_us).max(0) as f64;
        let elapsed_s = elapsed_us / 1_000_000.0;

        let predicted_offset = self.offset_us + self.drift * elapsed_us;
        let prior_variance =
            self.error_us.powi(2) + self.config.process_noise_variance_per_sec * elapsed_s;

        let innovation = measurement_us - predicted_offset;

        if self.measurement_count >= 2 {
            let prior_std = prior_variance.sqrt().max(1.0);
            if innovation.abs() > self.config.outlier_innovation_sigmas * prior_std {
                log::warn!(
                    "time filter: rejecting sample, innovation={innovation}us exceeds {}x prior std {prior_std}us",
                    self.config.outlier_innovation_sigmas
                );
                return false;
            }
        }

        let measurement_variance = max_error_us.powi(2).max(1.0);
        let gain = prior_variance / (prior_variance + measurement_variance);

        let new_offset = predicted_offset + gain * innovation;

        if elapsed_us > 0.0 {
            let observed_drift = (new_offset - self.offset_us) / elapsed_us;
            self.drift += self.config.drift_gain * (observed_drift - self.drift);
        }

        self.offset_us = new_offset;
        self.error_us = ((1.0 - gain) * prior_variance).sqrt();
        self.anchor_us = t_local_now_us;
        self.measurement_count += 1;

        if !self.is_synchronized
            && self.measurement_count >= 2
            && self.error_us <= self.config.confidence_cap_us
        {
            self.is_synchronized = true;
        }

        true
    }

    /// Convert a server timestamp (µs) to the corresponding local time (µs)
    /// using the current filter state, evaluated "now" at `t_local_now_us`.
    pub fn compute_client_time(&self, t_server_us: i64, t_local_now_us: i64) -> i64 {
        let predicted_offset =
            self.offset_us + self.drift * (t_local_now_us - self.anchor_us) as f64;
        (t_server_us as f64 - predicted_offset).round() as i64
    }

    /// Current 1-sigma uncertainty bound, in microseconds.
    pub fn error_us(&self) -> f64 {
        self.error_us
    }

    /// Whether at least two measurements have been absorbed and `error` is
    /// within the configured confidence bound.
    pub fn is_synchronized(&self) -> bool {
        self.is_synchronized
    }

    /// Current offset estimate, in microseconds (`T_server - T_local` at `anchor`).
    pub fn offset_us(&self) -> f64 {
        self.offset_us
    }

    /// Current drift estimate (dimensionless, d(offset)/d(local_time)).
    pub fn drift(&self) -> f64 {
        self.drift
    }
}

impl Default for TimeFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_measurement_can_flip_synchronized() {
        let mut filter = TimeFilter::new();
        assert!(!filter.is_synchronized());
        filter.update(1000.0, 500.0, 0);
        assert!(!filter.is_synchronized());
        filter.update(1010.0, 500.0, 1_000_000);
        assert!(filter.is_synchronized());
    }

    #[test]
    fn compute_client_time_is_monotone_in_server_time() {
        let mut filter = TimeFilter::new();
        filter.update(5000.0, 200.0, 0);
        filter.update(5010.0, 200.0, 1_000_000);

        let t_local_now = 2_000_000;
        let a = filter.compute_client_time(10_000_000, t_local_now);
        let b = filter.compute_client_time(10_000_001, t_local_now);
        let c = filter.compute_client_time(20_000_000, t_local_now);
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn large_outlier_does_not_snap_offset() {
        let mut filter = TimeFilter::new();
        filter.update(1000.0, 200.0, 0);
        filter.update(1005.0, 200.0, 1_000_000);
        filter.update(1010.0, 200.0, 2_000_000);
        let offset_before = filter.offset_us();

        // A wild outlier measurement, far beyond plausible given recent history.
        let accepted = filter.update(5_000_000.0, 100.0, 3_000_000);
        assert!(!accepted);
        assert_eq!(filter.offset_us(), offset_before);
    }

    #[test]
    fn measurement_with_excessive_max_error_is_rejected() {
        let mut filter = TimeFilter::new();
        filter.update(1000.0, 200.0, 0);
        let accepted = filter.update(1000.0, 10_000_000.0, 1_000_000);
        assert!(!accepted);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut filter = TimeFilter::new();
        filter.update(1000.0, 200.0, 0);
        filter.update(1010.0, 200.0, 1_000_000);
        assert!(filter.is_synchronized());
        filter.reset();
        assert!(!filter.is_synchronized());
        assert_eq!(filter.offset_us(), 0.0);
    }

    #[test]
    fn steady_state_error_settles_small_on_well_behaved_samples() {
        let mut filter = TimeFilter::new();
        let mut t = 0i64;
        for _ in 0..60 {
            filter.update(10_000.0, 300.0, t);
            t += 1_000_000;
        }
        assert!(filter.is_synchronized());
        assert!(filter.error_us() < 1_000.0, "error_us={}", filter.error_us());
    }
}
