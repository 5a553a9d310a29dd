//! Interval arithmetic.
//!
//! Every quantity the engine compares is uncertain: the moment a status was
//! sampled is only known to lie inside its request window, and positions are
//! reported with limited granularity. [`Range`] carries that uncertainty
//! through additions, differences and scaling.

use bridge_traits::TimeRange;
use core_async::time::Instant;
use std::fmt;

/// Closed interval `[min, max]` of seconds (or normalized positions).
/// Bounds may be negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max, "range bounds reversed: [{min}, {max}]");
        Self { min, max }
    }

    /// Builds a range from two values in either order.
    pub fn unordered(a: f64, b: f64) -> Self {
        if a <= b {
            Self { min: a, max: b }
        } else {
            Self { min: b, max: a }
        }
    }

    pub fn with_len(min: f64, length: f64) -> Self {
        Self::unordered(min, min + length)
    }

    pub fn point(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    pub fn center(&self) -> f64 {
        self.min + self.length() / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.intersects(other) {
            return None;
        }
        Some(Range {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// `[a.min + b.min, a.max + b.max]`
    pub fn add(&self, other: &Range) -> Range {
        Range {
            min: self.min + other.min,
            max: self.max + other.max,
        }
    }

    /// Range of `a - b` for any `a` in self and `b` in other.
    pub fn sub(&self, other: &Range) -> Range {
        Range {
            min: self.min - other.max,
            max: self.max - other.min,
        }
    }

    pub fn scale(&self, factor: f64) -> Range {
        Range::unordered(self.min * factor, self.max * factor)
    }

    /// Scales the lower bound by `factors.min` and the upper by `factors.max`.
    pub fn scale_by_range(&self, factors: &Range) -> Range {
        Range::unordered(self.min * factors.min, self.max * factors.max)
    }

    pub fn div(&self, divisor: f64) -> Range {
        Range::unordered(self.min / divisor, self.max / divisor)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}, {:.3}]", self.min, self.max)
    }
}

/// `a - b` in seconds, negative when `a` is earlier.
pub fn signed_secs(a: Instant, b: Instant) -> f64 {
    if a >= b {
        (a - b).as_secs_f64()
    } else {
        -(b - a).as_secs_f64()
    }
}

/// Seconds elapsed from `earlier` to `later`, as a range covering every pair
/// of instants inside the two windows.
pub fn elapsed(later: &TimeRange, earlier: &TimeRange) -> Range {
    Range::unordered(
        signed_secs(later.start, earlier.end),
        signed_secs(later.end, earlier.start),
    )
}
