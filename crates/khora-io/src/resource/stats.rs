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

use khora_data::resources::{GpuBudget, MemoryPressure};
use serde::{Deserialize, Serialize};
use std::fmt;

const MB: f64 = 1024.0 * 1024.0;

/// Running counters kept by the cache between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CacheCounters {
    pub hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub load_failures: u64,
}

/// A point-in-time snapshot of the cache, as returned by
/// [`ResourceCache::stats`](super::ResourceCache::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries in the cache, loaded or not.
    pub cached: usize,
    /// Cached entries that are pinned.
    pub pinned: usize,
    /// GPU bytes currently charged.
    pub current_gpu_usage: usize,
    /// The GPU budget in bytes.
    pub max_gpu_memory: usize,
    /// Loads served from the cache.
    pub hits: u64,
    /// Hits on entries that had been explicitly unloaded.
    pub cold_hits: u64,
    /// Loads that had to construct the resource.
    pub misses: u64,
    /// Entries dropped by budget pressure.
    pub evictions: u64,
    /// Loads that ended with a stub or an absent handle.
    pub load_failures: u64,
    /// Background requests waiting for, or running, their decode.
    pub pending_decodes: usize,
    /// Decoded requests waiting for `process_async_uploads`.
    pub pending_uploads: usize,
}

impl CacheStats {
    /// Fraction of loads served from the cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of the budget in use, following [`GpuBudget::utilization`] for a zero budget.
    pub fn utilization(&self) -> f64 {
        self.budget().utilization()
    }

    /// Pressure level derived from [`utilization`](CacheStats::utilization).
    pub fn pressure(&self) -> MemoryPressure {
        self.budget().pressure()
    }

    fn budget(&self) -> GpuBudget {
        let mut budget = GpuBudget::new(self.max_gpu_memory);
        budget.charge(self.current_gpu_usage);
        budget
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== ResourceCache Statistics ===")?;
        writeln!(f, "  Cached Resources: {} ({} pinned)", self.cached, self.pinned)?;
        writeln!(
            f,
            "  GPU Memory: {:.2}MB / {:.2}MB ({:.1}%)",
            self.current_gpu_usage as f64 / MB,
            self.max_gpu_memory as f64 / MB,
            self.utilization() * 100.0
        )?;
        writeln!(
            f,
            "  Hits: {}  Misses: {}  HitRate: {:.1}%",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0
        )?;
        writeln!(
            f,
            "  Cold hits: {}  Evictions: {}  Failures: {}",
            self.cold_hits, self.evictions, self.load_failures
        )?;
        writeln!(
            f,
            "  Async: {} decoding, {} awaiting upload",
            self.pending_decodes, self.pending_uploads
        )?;
        write!(f, "================================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn utilization_and_pressure() {
        let stats = CacheStats {
            current_gpu_usage: 95,
            max_gpu_memory: 100,
            ..Default::default()
        };
        assert_eq!(stats.utilization(), 0.95);
        assert_eq!(stats.pressure(), MemoryPressure::Critical);
        assert_eq!(CacheStats::default().utilization(), 0.0);
    }

    #[test]
    fn zero_budget_matches_the_tracker() {
        let stats = CacheStats {
            current_gpu_usage: 1,
            max_gpu_memory: 0,
            ..Default::default()
        };
        let mut budget = GpuBudget::new(0);
        budget.charge(1);
        assert_eq!(stats.utilization(), 1.0);
        assert_eq!(stats.pressure(), budget.pressure());
        assert_eq!(stats.pressure(), MemoryPressure::Critical);
    }

    #[test]
    fn report_lists_budget_and_hit_rate() {
        let stats = CacheStats {
            cached: 2,
            current_gpu_usage: 512 * 1024,
            max_gpu_memory: 1024 * 1024,
            hits: 1,
            misses: 1,
            ..Default::default()
        };
        let report = stats.to_string();
        assert!(report.contains("Cached Resources: 2"));
        assert!(report.contains("GPU Memory: 0.50MB / 1.00MB (50.0%)"));
        assert!(report.contains("HitRate: 50.0%"));
    }
}
