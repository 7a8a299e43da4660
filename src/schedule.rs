// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Drift-corrected periodic scheduling.
//!
//! Each deadline is the previous deadline plus one interval, never "now" plus
//! one interval, so wake latency and work duration do not accumulate. The
//! `k`-th deadline is always `anchor + k * interval`.

use crate::cancel::CancelToken;
use std::time::{Duration, Instant};

/// Result of waiting for one scheduled deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    /// Cycle number, starting at zero.
    pub cycle: u64,
    /// How long after the deadline the thread actually resumed.
    pub lateness: Duration,
    /// The deadline had already passed before the wait began, i.e. the
    /// previous cycle took longer than the period.
    pub overrun: bool,
}

#[derive(Clone, Debug)]
pub struct Schedule {
    anchor: Instant,
    interval: Duration,
    deadline: Instant,
    cycle: u64,
}

impl Schedule {
    /// Schedule with the first deadline one interval from now.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now() + interval, interval)
    }

    /// Schedule with the first deadline at `anchor`.
    pub fn starting_at(anchor: Instant, interval: Duration) -> Self {
        Self {
            anchor,
            interval,
            deadline: anchor,
            cycle: 0,
        }
    }

    #[inline]
    pub fn anchor(&self) -> Instant {
        self.anchor
    }

    /// The absolute time of the current cycle's wake-up.
    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    #[inline]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Move to the next cycle and return its deadline.
    pub fn advance(&mut self) -> Instant {
        self.deadline += self.interval;
        self.cycle += 1;
        self.deadline
    }

    /// Block until the current deadline.
    ///
    /// Returns `None` if `cancel` fires first.
    pub fn wait(&self, cancel: &CancelToken) -> Option<Tick> {
        let overrun = Instant::now() > self.deadline;
        if !cancel.sleep_until(self.deadline) {
            return None;
        }
        Some(Tick {
            cycle: self.cycle,
            lateness: Instant::now().saturating_duration_since(self.deadline),
            overrun,
        })
    }
}
