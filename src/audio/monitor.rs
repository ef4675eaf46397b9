//! Real-time audio level monitoring.
//!
//! Converts raw PCM frames into a smoothed loudness percentage used by the
//! chunk boundary planner to find quiet moments.

use crate::defaults;

/// Monitors instantaneous audio energy as a percentage (0-100).
///
/// Fed every capture tick; degrades gracefully by holding its last-known
/// value when the stream yields no samples.
#[derive(Debug, Clone)]
pub struct AudioLevelMonitor {
    full_scale_rms: f32,
    smoothing: f32,
    level_pct: f32,
    primed: bool,
}

impl AudioLevelMonitor {
    /// Creates a monitor with default scaling and smoothing.
    pub fn new() -> Self {
        Self {
            full_scale_rms: defaults::LEVEL_FULL_SCALE_RMS,
            smoothing: defaults::LEVEL_SMOOTHING,
            level_pct: 0.0,
            primed: false,
        }
    }

    /// Sets the RMS level that maps to 100% loudness.
    pub fn with_full_scale_rms(mut self, rms: f32) -> Self {
        self.full_scale_rms = rms.max(f32::EPSILON);
        self
    }

    /// Sets the smoothing factor (weight of the newest reading, 0.0-1.0).
    pub fn with_smoothing(mut self, smoothing: f32) -> Self {
        self.smoothing = smoothing.clamp(0.0, 1.0);
        self
    }

    /// Records a frame of samples, updating the current level.
    ///
    /// Empty frames leave the last-known level untouched so a stalled or
    /// unavailable stream reads as a degraded signal, never an error.
    pub fn record(&mut self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }
        let rms = calculate_rms(samples);
        let instantaneous = (rms / self.full_scale_rms * 100.0).clamp(0.0, 100.0);
        if self.primed {
            self.level_pct =
                self.smoothing * instantaneous + (1.0 - self.smoothing) * self.level_pct;
        } else {
            self.level_pct = instantaneous;
            self.primed = true;
        }
    }

    /// Returns the current loudness percentage (0-100).
    pub fn current_level(&self) -> f32 {
        self.level_pct
    }
}

impl Default for AudioLevelMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Returns a normalized value (0.0 to 1.0), where 0.0 is silence and
/// 1.0 is maximum amplitude.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&vec![0i16; 1000]), 0.0);
    }

    #[test]
    fn test_rms_max_amplitude() {
        let rms = calculate_rms(&vec![i16::MAX; 1000]);
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn test_rms_empty_samples() {
        let empty: Vec<i16> = vec![];
        assert_eq!(calculate_rms(&empty), 0.0);
    }

    #[test]
    fn test_monitor_starts_silent() {
        let monitor = AudioLevelMonitor::new();
        assert_eq!(monitor.current_level(), 0.0);
    }

    #[test]
    fn test_monitor_loud_frame_reads_loud() {
        let mut monitor = AudioLevelMonitor::new().with_smoothing(1.0);
        monitor.record(&vec![10000i16; 1000]);
        // 10000/32767 ≈ 0.305 RMS ≈ full scale
        assert!(
            monitor.current_level() > 90.0,
            "expected near 100, got {}",
            monitor.current_level()
        );
    }

    #[test]
    fn test_monitor_quiet_frame_reads_quiet() {
        let mut monitor = AudioLevelMonitor::new().with_smoothing(1.0);
        monitor.record(&vec![300i16; 1000]);
        assert!(
            monitor.current_level() < 15.0,
            "expected quiet, got {}",
            monitor.current_level()
        );
    }

    #[test]
    fn test_monitor_holds_last_value_on_empty_read() {
        let mut monitor = AudioLevelMonitor::new().with_smoothing(1.0);
        monitor.record(&vec![10000i16; 1000]);
        let before = monitor.current_level();
        monitor.record(&[]);
        assert_eq!(monitor.current_level(), before);
    }

    #[test]
    fn test_monitor_smoothing_dampens_single_quiet_frame() {
        let mut monitor = AudioLevelMonitor::new().with_smoothing(0.5);
        monitor.record(&vec![10000i16; 1000]);
        let loud = monitor.current_level();
        monitor.record(&vec![0i16; 1000]);
        // One silent frame halves the level instead of zeroing it.
        let after = monitor.current_level();
        assert!(after > 0.0 && after < loud);
        assert!((after - loud / 2.0).abs() < 1.0);
    }

    #[test]
    fn test_monitor_level_clamped_to_100() {
        let mut monitor = AudioLevelMonitor::new().with_smoothing(1.0);
        monitor.record(&vec![i16::MAX; 1000]);
        assert!(monitor.current_level() <= 100.0);
    }
}
