// Execution Statistics
//
// Per-stage counters and the pipeline-wide total they merge into.
// All merges are plain sums, so they are associative and commutative.

use std::fmt::Debug;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Counter record returned by one stage call
pub trait ExecutorStats: Debug + Default + Copy + AddAssign {
    /// Fold this record into the pipeline total
    fn merge_into(self, total: &mut ExecutionStats);
}

/// Stats of the limit stage: rows counted towards the full count
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LimitStats {
    full_count: usize,
}

impl LimitStats {
    pub fn incr_counter(&mut self) {
        self.full_count += 1;
    }

    pub fn incr_counter_by(&mut self, amount: usize) {
        self.full_count += amount;
    }

    pub fn full_count(&self) -> usize {
        self.full_count
    }
}

impl AddAssign for LimitStats {
    fn add_assign(&mut self, other: Self) {
        self.full_count += other.full_count;
    }
}

impl ExecutorStats for LimitStats {
    fn merge_into(self, total: &mut ExecutionStats) {
        total.full_count += self.full_count;
    }
}

/// Stats of the enumeration stage: documents read from storage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnumerateCollectionStats {
    scanned_full: usize,
    scanned_index: usize,
}

impl EnumerateCollectionStats {
    pub fn incr_scanned(&mut self, amount: usize) {
        self.scanned_full += amount;
    }

    pub fn incr_scanned_index(&mut self, amount: usize) {
        self.scanned_index += amount;
    }

    pub fn scanned(&self) -> usize {
        self.scanned_full + self.scanned_index
    }

    pub fn scanned_full(&self) -> usize {
        self.scanned_full
    }

    pub fn scanned_index(&self) -> usize {
        self.scanned_index
    }
}

impl AddAssign for EnumerateCollectionStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned_full += other.scanned_full;
        self.scanned_index += other.scanned_index;
    }
}

impl ExecutorStats for EnumerateCollectionStats {
    fn merge_into(self, total: &mut ExecutionStats) {
        total.scanned_full += self.scanned_full;
        total.scanned_index += self.scanned_index;
    }
}

/// Pipeline-wide totals
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub scanned_full: usize,
    pub scanned_index: usize,
    pub full_count: usize,
}

impl ExecutionStats {
    pub fn merge<S: ExecutorStats>(&mut self, stats: S) {
        stats.merge_into(self);
    }
}

impl AddAssign for ExecutionStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned_full += other.scanned_full;
        self.scanned_index += other.scanned_index;
        self.full_count += other.full_count;
    }
}

impl Add for ExecutionStats {
    type Output = ExecutionStats;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}
