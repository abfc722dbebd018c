// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! GPU memory accounting.

use serde::{Deserialize, Serialize};

/// How close the cache is to its GPU memory budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemoryPressure {
    /// Below 50% of the budget.
    Low,
    /// Between 50% and 75% of the budget.
    Moderate,
    /// Between 75% and 90% of the budget.
    High,
    /// Above 90% of the budget, or over it.
    Critical,
}

impl MemoryPressure {
    /// Classifies a utilization ratio (usage divided by budget).
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            Self::Low
        } else if utilization < 0.75 {
            Self::Moderate
        } else if utilization < 0.9 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

/// Current GPU usage against a maximum budget, both in bytes.
///
/// The budget is a soft limit: charging past it is allowed, and it is up to
/// the owner to evict until [`is_over`](GpuBudget::is_over) turns false again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuBudget {
    current: usize,
    max: usize,
}

impl GpuBudget {
    /// Creates a budget of `max` bytes with nothing charged.
    pub fn new(max: usize) -> Self {
        Self { current: 0, max }
    }

    /// Bytes currently charged.
    pub fn current(&self) -> usize {
        self.current
    }

    /// The budget, in bytes.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Replaces the budget. Does not evict anything by itself.
    pub fn set_max(&mut self, max: usize) {
        self.max = max;
    }

    /// Whether charging `extra` more bytes would go past the budget.
    pub fn would_exceed(&self, extra: usize) -> bool {
        self.current.saturating_add(extra) > self.max
    }

    /// Whether usage is already past the budget.
    pub fn is_over(&self) -> bool {
        self.current > self.max
    }

    /// Bytes left before the budget is reached.
    pub fn headroom(&self) -> usize {
        self.max.saturating_sub(self.current)
    }

    /// Adds `bytes` to the usage.
    pub fn charge(&mut self, bytes: usize) {
        self.current = self.current.saturating_add(bytes);
    }

    /// Removes `bytes` from the usage, clamping at zero.
    pub fn release(&mut self, bytes: usize) {
        self.current = self.current.saturating_sub(bytes);
    }

    /// Replaces a charge of `old` bytes with one of `new` bytes, returning the signed delta.
    pub fn apply_resize(&mut self, old: usize, new: usize) -> isize {
        self.release(old);
        self.charge(new);
        new as isize - old as isize
    }

    /// Resets the usage to zero.
    pub fn reset(&mut self) {
        self.current = 0;
    }

    /// Usage as a fraction of the budget.
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return if self.current == 0 { 0.0 } else { 1.0 };
        }
        self.current as f64 / self.max as f64
    }

    /// The pressure level matching the current utilization.
    pub fn pressure(&self) -> MemoryPressure {
        MemoryPressure::from_utilization(self.utilization())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[test]
    fn charge_and_release() {
        let mut budget = GpuBudget::new(10 * MB);
        budget.charge(4 * MB);
        assert_eq!(budget.current(), 4 * MB);
        assert!(!budget.would_exceed(6 * MB));
        assert!(budget.would_exceed(6 * MB + 1));
        budget.release(10 * MB);
        assert_eq!(budget.current(), 0);
    }

    #[test]
    fn resize_reports_signed_delta() {
        let mut budget = GpuBudget::new(100 * MB);
        budget.charge(10 * MB);
        assert_eq!(budget.apply_resize(10 * MB, 4 * MB), -6 * MB as isize);
        assert_eq!(budget.current(), 4 * MB);
        assert_eq!(budget.apply_resize(4 * MB, 12 * MB), 8 * MB as isize);
        assert_eq!(budget.current(), 12 * MB);
    }

    #[test]
    fn over_budget_and_pressure() {
        let mut budget = GpuBudget::new(100);
        assert_eq!(budget.pressure(), MemoryPressure::Low);
        budget.charge(60);
        assert_eq!(budget.pressure(), MemoryPressure::Moderate);
        budget.charge(20);
        assert_eq!(budget.pressure(), MemoryPressure::High);
        budget.charge(30);
        assert!(budget.is_over());
        assert_eq!(budget.headroom(), 0);
        assert_eq!(budget.pressure(), MemoryPressure::Critical);
    }

    #[test]
    fn zero_budget_utilization() {
        let mut budget = GpuBudget::new(0);
        assert_eq!(budget.utilization(), 0.0);
        budget.charge(1);
        assert_eq!(budget.utilization(), 1.0);
    }
}
