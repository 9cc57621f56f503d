//! Streaming rolling mean for one series.
//!
//! A series keeps the last `window` observations in a circular buffer with
//! a running sum of the non-missing ones and a count of the missing (NaN)
//! ones. Each `update` is O(1).
//!
//! Until `window` observations have been seen the series is *expanding*;
//! what it reports then is governed by [`ExpandingPolicy`]. Afterwards each
//! observation evicts the oldest one (*rolling*).
//!
//! A window holding only missing values reports the incoming value.

use std::fmt;
use std::str::FromStr;

use num_traits::{Float, NumCast};
use serde::{Deserialize, Serialize};

use super::error::KernelError;

/// Element types a series can be computed in (`f32`, `f64`).
pub trait SeriesElement: Float + NumCast + Default + fmt::Debug + Send + Sync + 'static {
    /// `n` as this type. Counts never exceed the window, so the conversion
    /// only fails for windows beyond the type's integer range.
    fn from_count(n: usize) -> Self {
        <Self as NumCast>::from(n).unwrap_or_else(Self::nan)
    }
}

impl SeriesElement for f32 {}
impl SeriesElement for f64 {}

/// What a series reports before its window is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandingPolicy {
    /// Mean of the observations seen so far.
    #[default]
    PartialMean,
    /// NaN until the window is full.
    Missing,
}

impl ExpandingPolicy {
    pub fn name(self) -> &'static str {
        match self {
            ExpandingPolicy::PartialMean => "partial_mean",
            ExpandingPolicy::Missing => "missing",
        }
    }
}

impl fmt::Display for ExpandingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExpandingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partial" | "partial_mean" | "partial-mean" => Ok(ExpandingPolicy::PartialMean),
            "missing" | "nan" => Ok(ExpandingPolicy::Missing),
            other => Err(format!(
                "unknown expanding policy '{}' (expected 'partial' or 'missing')",
                other
            )),
        }
    }
}

/// Window state of one series.
#[derive(Clone, Debug)]
pub struct SeriesState<T> {
    window: usize,
    buffer: Vec<T>,
    cursor: usize,
    sum: T,
    missing: usize,
    seen: usize,
    policy: ExpandingPolicy,
}

impl<T: SeriesElement> SeriesState<T> {
    pub fn new(window: usize, policy: ExpandingPolicy) -> Result<Self, KernelError> {
        if window == 0 {
            return Err(KernelError::InvalidWindow { window: 0 });
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(window)
            .map_err(|_| KernelError::AllocationFailed { window })?;
        buffer.resize(window, T::zero());
        Ok(Self {
            window,
            buffer,
            cursor: 0,
            sum: T::zero(),
            missing: 0,
            seen: 0,
            policy,
        })
    }

    /// Feed one observation and return the current statistic.
    pub fn update(&mut self, value: T) -> T {
        if self.seen < self.window {
            self.admit(value);
            self.buffer[self.cursor] = value;
            self.advance();
            self.seen += 1;
            if self.seen < self.window && self.policy == ExpandingPolicy::Missing {
                return T::nan();
            }
            return self.mean_over(self.seen, value);
        }

        let evicted = self.buffer[self.cursor];
        self.admit(value);
        if evicted.is_nan() {
            self.missing -= 1;
        } else {
            self.sum = self.sum - evicted;
        }
        self.buffer[self.cursor] = value;
        self.advance();
        self.mean_over(self.window, value)
    }

    fn admit(&mut self, value: T) {
        if value.is_nan() {
            self.missing += 1;
        } else {
            self.sum = self.sum + value;
        }
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.window;
    }

    /// Mean of the non-missing values among the `resident` newest slots,
    /// or `value` when every one of them is missing.
    fn mean_over(&self, resident: usize, value: T) -> T {
        if self.missing == resident {
            return value;
        }
        self.sum / T::from_count(resident - self.missing)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn policy(&self) -> ExpandingPolicy {
        self.policy
    }

    /// Observations seen, capped at the window.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Missing values currently in the window.
    pub fn missing(&self) -> usize {
        self.missing
    }

    pub fn sum(&self) -> T {
        self.sum
    }

    pub fn is_expanding(&self) -> bool {
        self.seen < self.window
    }

    /// Resident observations, oldest first.
    pub fn resident(&self) -> Vec<T> {
        if self.is_expanding() {
            return self.buffer[..self.seen].to_vec();
        }
        let mut out = Vec::with_capacity(self.window);
        out.extend_from_slice(&self.buffer[self.cursor..]);
        out.extend_from_slice(&self.buffer[..self.cursor]);
        out
    }
}
