// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Streaming timing statistics.

use std::time::Duration;

/// Online accumulator of count, sum and sum of squares.
///
/// Single writer, no internal synchronization.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JitterAccumulator {
    count: u64,
    sum: f64,
    sum_of_squares: f64,
}

impl JitterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_of_squares += value * value;
    }

    /// Record a duration measured in seconds.
    pub fn add_duration(&mut self, value: Duration) {
        self.add(value.as_secs_f64());
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the samples, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Population variance `E[x²] - E[x]²`.
    ///
    /// Returns `0.0` with fewer than two samples. Clamped at zero since the
    /// single-pass formula can go slightly negative from rounding.
    pub fn variance(&self) -> f64 {
        if self.count <= 1 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum / n;
        (self.sum_of_squares / n - mean * mean).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
