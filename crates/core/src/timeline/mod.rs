use serde::{Deserialize, Serialize};

use crate::{MixerError, Result};

pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Musical grid used to bucket timestamps into bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarTiming {
    bpm: f64,
    beats_per_bar: u32,
    offset_seconds: f64,
}

impl BarTiming {
    /// `offset_seconds` is where bar 1 starts and may be negative.
    pub fn new(bpm: f64, beats_per_bar: u32, offset_seconds: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(MixerError::invalid(format!("bpm must be positive, got {bpm}")));
        }
        if beats_per_bar == 0 {
            return Err(MixerError::invalid("beats_per_bar must be positive"));
        }
        if !offset_seconds.is_finite() {
            return Err(MixerError::invalid("offset must be a finite number"));
        }

        Ok(Self {
            bpm,
            beats_per_bar,
            offset_seconds,
        })
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    pub fn beat_duration(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn bar_duration(&self) -> f64 {
        self.beat_duration() * self.beats_per_bar as f64
    }

    /// 1-based bar containing `timestamp_seconds`. Lines before the offset
    /// land in bar 0 or below.
    pub fn bar_index(&self, timestamp_seconds: f64) -> i64 {
        ((timestamp_seconds - self.offset_seconds) / self.bar_duration()).floor() as i64 + 1
    }

    /// Mapping key such as `bar_0002_00003.00`. Bar index and timestamp are
    /// zero padded so keys of equal width sort chronologically.
    pub fn key(&self, timestamp_seconds: f64) -> String {
        format!(
            "bar_{}_{:08.2}",
            bar_label(self.bar_index(timestamp_seconds)),
            timestamp_seconds
        )
    }
}

/// Renders a bar index so that labels of equal width sort in bar order.
///
/// Non-negative bars are zero padded to four digits. Negative bars are
/// written as `-` followed by the nines complement of their magnitude, so
/// bar -1 is `-9998` and bar -14 is `-9985`; `-` sorts before any digit.
fn bar_label(index: i64) -> String {
    if index >= 0 {
        return format!("{index:04}");
    }

    let magnitude = index.unsigned_abs();
    let digits = magnitude.to_string().len().max(4) as u32;
    let complement = 10_u64.pow(digits) - 1 - magnitude;
    format!("-{complement:0width$}", width = digits as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_durations() {
        let timing = BarTiming::new(120.0, 4, 0.0).unwrap();
        assert_eq!(timing.beat_duration(), 0.5);
        assert_eq!(timing.bar_duration(), 2.0);
    }

    #[test]
    fn buckets_timestamps_into_bars() {
        let timing = BarTiming::new(120.0, 4, 0.0).unwrap();
        assert_eq!(timing.bar_index(0.0), 1);
        assert_eq!(timing.bar_index(1.5), 1);
        assert_eq!(timing.bar_index(2.0), 2);
        assert_eq!(timing.bar_index(3.0), 2);
    }

    #[test]
    fn offset_can_push_bars_below_one() {
        let timing = BarTiming::new(120.0, 4, 5.0).unwrap();
        assert_eq!(timing.bar_index(4.0), 0);
        assert_eq!(timing.bar_index(0.5), -2);

        let early = BarTiming::new(120.0, 4, -1.0).unwrap();
        assert_eq!(early.bar_index(0.5), 1);
        assert_eq!(early.bar_index(1.0), 2);
    }

    #[test]
    fn formats_sortable_keys() {
        let timing = BarTiming::new(120.0, 3, 0.0).unwrap();
        assert_eq!(timing.key(1.4), "bar_0001_00001.40");
        assert_eq!(timing.key(1.5), "bar_0002_00001.50");
        assert_eq!(timing.key(75.3), "bar_0051_00075.30");
        assert!(timing.key(9.0) < timing.key(10.0));
    }

    #[test]
    fn keys_before_the_offset_still_sort_chronologically() {
        let timing = BarTiming::new(120.0, 4, 30.0).unwrap();
        let early = timing.key(0.0);
        let later = timing.key(20.0);
        let last_negative = timing.key(27.5);
        let zero = timing.key(29.0);
        let first = timing.key(30.0);

        assert_eq!(early, "bar_-9985_00000.00");
        assert_eq!(later, "bar_-9995_00020.00");
        assert_eq!(last_negative, "bar_-9998_00027.50");
        assert_eq!(zero, "bar_0000_00029.00");
        assert_eq!(first, "bar_0001_00030.00");
        assert!(early < later);
        assert!(later < last_negative);
        assert!(last_negative < zero);
        assert!(zero < first);
    }

    #[test]
    fn labels_wide_negative_bars() {
        assert_eq!(bar_label(-9999), "-0000");
        assert_eq!(bar_label(-12_345), "-87654");
        assert!(bar_label(-12_346) < bar_label(-12_345));
    }

    #[test]
    fn rejects_invalid_grids() {
        assert!(BarTiming::new(0.0, 4, 0.0).is_err());
        assert!(BarTiming::new(-90.0, 4, 0.0).is_err());
        assert!(BarTiming::new(f64::NAN, 4, 0.0).is_err());
        assert!(BarTiming::new(120.0, 0, 0.0).is_err());
        assert!(BarTiming::new(120.0, 4, f64::INFINITY).is_err());
    }
}
