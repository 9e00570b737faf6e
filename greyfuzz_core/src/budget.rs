use crate::fuzzer::FuzzerStats;
use std::time::{Duration, Instant};

/// Stop condition polled by [`crate::Fuzzer::run`] before every iteration.
pub trait Budget {
    fn exhausted(&self, stats: &FuzzerStats) -> bool;
}

/// Stops after a fixed number of iterations, initial seed runs included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBudget(pub u64);

impl Budget for IterationBudget {
    fn exhausted(&self, stats: &FuzzerStats) -> bool {
        stats.iterations >= self.0
    }
}

/// Stops once a wall-clock deadline has passed.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    deadline: Instant,
}

impl TimeBudget {
    /// A budget that expires `limit` from now.
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }

    /// A budget that expires at `deadline`.
    pub fn until(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Budget for TimeBudget {
    fn exhausted(&self, _stats: &FuzzerStats) -> bool {
        Instant::now() >= self.deadline
    }
}

impl<B: Budget + ?Sized> Budget for &B {
    fn exhausted(&self, stats: &FuzzerStats) -> bool {
        (**self).exhausted(stats)
    }
}
