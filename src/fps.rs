//! Refresh-rate value type and rate arithmetic.
//!
//! All rate comparisons in the crate go through the approximate equality
//! defined here: two rates are the same if they differ by at most
//! 0.001 Hz. This is what lets 59.94 Hz and 60 Hz stay distinct while
//! absorbing rounding noise from period-derived rates.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance below which two rates are considered equal, in Hz.
pub const FPS_EPSILON: f32 = 0.001;

/// The NTSC pull-down ratio linking fractional cinema rates to their
/// integer counterparts (23.976 = 24 * 1000/1001, etc).
const FRACTIONAL_COEF: f32 = 1000.0 / 1001.0;

/// Ratio-to-integer tolerance for divider detection. Must be below
/// `FPS_EPSILON` so fractional pairs (59.94 vs 60) do not register as
/// integer dividers of each other.
const DIVIDER_THRESHOLD: f32 = 0.0009;

const NANOS_PER_SECOND: f64 = 1e9;

/// A display refresh rate: frequency in Hz plus the derived vsync period
/// in nanoseconds.
///
/// Equality is approximate (see [`FPS_EPSILON`]); ordering via
/// [`Fps::total_cmp`] is strict numeric.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Fps {
    hz: f32,
    period_ns: i64,
}

impl Fps {
    /// Rate from a frequency in Hz. Non-positive input yields the zero
    /// (unspecified) rate.
    pub fn from_hz(hz: f32) -> Self {
        if hz > 0.0 {
            Self { hz, period_ns: (NANOS_PER_SECOND / f64::from(hz)).round() as i64 }
        } else {
            Self::default()
        }
    }

    /// Rate from a vsync period in nanoseconds.
    pub fn from_period_ns(period_ns: i64) -> Self {
        if period_ns > 0 {
            Self { hz: (NANOS_PER_SECOND / period_ns as f64) as f32, period_ns }
        } else {
            Self::default()
        }
    }

    /// Frequency in Hz.
    pub fn hz(self) -> f32 {
        self.hz
    }

    /// Frequency rounded to the nearest integer Hz.
    pub fn int_hz(self) -> u32 {
        self.hz.round() as u32
    }

    /// Vsync period in nanoseconds.
    pub fn period_ns(self) -> i64 {
        self.period_ns
    }

    /// Whether this is a real rate rather than the zero placeholder.
    pub fn is_valid(self) -> bool {
        self.hz > 0.0
    }

    /// Approximate equality within [`FPS_EPSILON`].
    pub fn approx_eq(self, other: Fps) -> bool {
        (self.hz - other.hz).abs() <= FPS_EPSILON
    }

    /// Strictly greater, beyond the tolerance.
    pub fn approx_gt(self, other: Fps) -> bool {
        self.hz > other.hz + FPS_EPSILON
    }

    /// Strictly less, beyond the tolerance.
    pub fn approx_lt(self, other: Fps) -> bool {
        self.hz + FPS_EPSILON < other.hz
    }

    /// `lo <= self <= hi`, each bound taken with the tolerance.
    pub fn in_range(self, lo: Fps, hi: Fps) -> bool {
        lo.hz <= self.hz + FPS_EPSILON && self.hz <= hi.hz + FPS_EPSILON
    }

    /// Strict numeric ordering on the frequency.
    pub fn total_cmp(self, other: Fps) -> Ordering {
        self.hz.total_cmp(&other.hz)
    }
}

impl PartialEq for Fps {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(*other)
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} Hz", self.hz)
    }
}

/// An inclusive band of refresh rates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FpsRange {
    pub min: Fps,
    pub max: Fps,
}

impl FpsRange {
    pub fn new(min: Fps, max: Fps) -> Self {
        Self { min, max }
    }

    /// The widest possible band; accepts every valid rate.
    pub fn unbounded() -> Self {
        Self { min: Fps::default(), max: Fps::from_hz(f32::MAX) }
    }

    pub fn includes(&self, fps: Fps) -> bool {
        fps.in_range(self.min, self.max)
    }

    /// A band that pins a single rate, leaving no room to arbitrate.
    pub fn is_single_rate(&self) -> bool {
        self.min.approx_eq(self.max)
    }

    /// Whether `self` contains `inner` entirely.
    pub fn contains_range(&self, inner: &FpsRange) -> bool {
        self.min.hz() <= inner.min.hz() && self.max.hz() >= inner.max.hz()
    }
}

impl fmt::Display for FpsRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.min, self.max)
    }
}

/// Integer divider `k >= 1` such that `rate ~= display / k`, or 0 when no
/// such integer exists. Fractional cinema pairs deliberately do not
/// count: 59.94 Hz is not a divider of 60 Hz.
pub fn frame_rate_divider(display: Fps, rate: Fps) -> u32 {
    if !display.is_valid() || !rate.is_valid() {
        return 0;
    }
    let periods = display.hz() / rate.hz();
    let rounded = periods.round();
    if (periods - rounded).abs() > DIVIDER_THRESHOLD {
        return 0;
    }
    rounded as u32
}

/// True iff `a` and `b` are linked by the 1000/1001 NTSC pull-down, up to
/// an integer multiple: 23.976 vs 24, 29.97 vs 60, and so on. A rate is
/// never its own fractional pair.
pub fn is_fractional_pair_or_multiple(a: Fps, b: Fps) -> bool {
    let (smaller, bigger) = if a.hz() < b.hz() { (a, b) } else { (b, a) };
    let multiplier = (bigger.hz() / smaller.hz()).round();
    let pulled_down = Fps::from_hz(smaller.hz() * multiplier * FRACTIONAL_COEF);
    let pulled_up = Fps::from_hz(smaller.hz() * multiplier / FRACTIONAL_COEF);
    bigger.approx_eq(pulled_down) || bigger.approx_eq(pulled_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn hz(v: f32) -> Fps {
        Fps::from_hz(v)
    }

    #[test]
    fn test_period_round_trips() {
        assert_eq!(hz(60.0).period_ns(), 16_666_667);
        assert_eq!(hz(90.0).period_ns(), 11_111_111);
        let from_period = Fps::from_period_ns(16_666_667);
        assert!(from_period.approx_eq(hz(60.0)));
        assert_eq!(from_period.int_hz(), 60);
    }

    #[test]
    fn test_approx_equality_tolerance() {
        assert!(hz(60.0).approx_eq(hz(60.0009)));
        assert!(!hz(60.0).approx_eq(hz(60.0011)));
        assert!(!hz(60.0).approx_eq(hz(59.94)));
        assert!(hz(59.94).approx_eq(hz(59.94)));
    }

    #[test]
    fn test_in_range_uses_tolerance() {
        // Period-derived rate slightly above 60.
        let rate = Fps::from_period_ns(16_666_665);

        assert!(rate.in_range(hz(60.000_004), hz(60.000_004)));
        assert!(rate.in_range(hz(59.0), hz(60.1)));
        assert!(!rate.in_range(hz(75.0), hz(90.0)));
        assert!(!rate.in_range(hz(60.0011), hz(90.0)));
        assert!(!rate.in_range(hz(50.0), hz(59.998)));
    }

    #[test]
    fn test_invalid_rates() {
        assert!(!Fps::default().is_valid());
        assert!(!Fps::from_hz(0.0).is_valid());
        assert!(!Fps::from_hz(-24.0).is_valid());
        assert!(!Fps::from_period_ns(0).is_valid());
    }

    #[test]
    fn test_frame_rate_divider() {
        assert_eq!(frame_rate_divider(hz(30.0), hz(30.0)), 1);
        assert_eq!(frame_rate_divider(hz(60.0), hz(30.0)), 2);
        assert_eq!(frame_rate_divider(hz(72.0), hz(30.0)), 0);
        assert_eq!(frame_rate_divider(hz(90.0), hz(30.0)), 3);
        assert_eq!(frame_rate_divider(hz(120.0), hz(30.0)), 4);
        assert_eq!(frame_rate_divider(hz(90.0), hz(22.5)), 4);

        assert_eq!(frame_rate_divider(hz(24.0), hz(25.0)), 0);
        assert_eq!(frame_rate_divider(hz(24.0), hz(23.976)), 0);
        assert_eq!(frame_rate_divider(hz(30.0), hz(29.97)), 0);
        assert_eq!(frame_rate_divider(hz(60.0), hz(59.94)), 0);
    }

    #[test]
    fn test_fractional_pairs() {
        assert!(is_fractional_pair_or_multiple(hz(23.976), hz(24.0)));
        assert!(is_fractional_pair_or_multiple(hz(24.0), hz(23.976)));
        assert!(is_fractional_pair_or_multiple(hz(29.97), hz(30.0)));
        assert!(is_fractional_pair_or_multiple(hz(30.0), hz(29.97)));
        assert!(is_fractional_pair_or_multiple(hz(59.94), hz(60.0)));
        assert!(is_fractional_pair_or_multiple(hz(60.0), hz(59.94)));
        assert!(is_fractional_pair_or_multiple(hz(29.97), hz(60.0)));
        assert!(is_fractional_pair_or_multiple(hz(60.0), hz(29.97)));
        assert!(is_fractional_pair_or_multiple(hz(59.94), hz(30.0)));
        assert!(is_fractional_pair_or_multiple(hz(30.0), hz(59.94)));

        for rate in [23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0] {
            assert!(
                !is_fractional_pair_or_multiple(hz(rate), hz(rate)),
                "{rate} should not pair with itself"
            );
        }

        assert!(!is_fractional_pair_or_multiple(hz(24.0), hz(25.0)));
        assert!(!is_fractional_pair_or_multiple(hz(23.978), hz(25.0)));
        assert!(!is_fractional_pair_or_multiple(hz(29.97), hz(59.94)));
    }

    #[test]
    fn test_range_queries() {
        let range = FpsRange::new(hz(60.0), hz(90.0));
        assert!(range.includes(hz(60.0)));
        assert!(range.includes(hz(72.0)));
        assert!(!range.includes(hz(120.0)));
        assert!(!range.is_single_rate());
        assert!(FpsRange::new(hz(60.0), hz(60.0)).is_single_rate());
        assert!(range.contains_range(&FpsRange::new(hz(60.0), hz(72.0))));
        assert!(!FpsRange::new(hz(60.0), hz(72.0)).contains_range(&range));
        assert!(FpsRange::unbounded().includes(hz(240.0)));
    }

    proptest! {
        #[test]
        fn prop_fractional_pair_is_symmetric(a in 1.0f32..=240.0, b in 1.0f32..=240.0) {
            prop_assert_eq!(
                is_fractional_pair_or_multiple(hz(a), hz(b)),
                is_fractional_pair_or_multiple(hz(b), hz(a))
            );
        }

        #[test]
        fn prop_rate_never_pairs_with_itself(a in 1.0f32..=240.0) {
            prop_assert!(!is_fractional_pair_or_multiple(hz(a), hz(a)));
        }

        #[test]
        fn prop_exact_dividers_detected(rate in 10.0f32..=60.0, k in 1u32..=4) {
            let display = hz(rate * k as f32);
            prop_assert_eq!(frame_rate_divider(display, hz(rate)), k);
        }
    }
}
