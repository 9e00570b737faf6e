pub mod budget;
pub mod config;
pub mod corpus;
pub mod coverage;
pub mod executor;
pub mod feedback;
pub mod fuzzer;
pub mod input;
pub mod mutator;
pub mod oracle;
pub mod scheduler;

pub use budget::{Budget, IterationBudget, TimeBudget};
pub use config::GreyfuzzConfig;
pub use corpus::{Corpus, CorpusError, InMemoryCorpus, Seed, SeedOrigin};
pub use coverage::{
    CoveragePolicy, CoverageTracker, Fingerprint, FingerprintHash, Granularity, Location,
    NGramPolicy, Trace, TraceLimits,
};
pub use executor::{ExecutionStatus, Executor, InProcessExecutor};
pub use feedback::{CoverageNoveltyFeedback, Feedback};
pub use fuzzer::{Fuzzer, FuzzerError, FuzzerState, FuzzerStats, IterationReport, RunSummary};
pub use input::{Input, Unit};
pub use mutator::{MutationKind, Mutator, UnitMutator};
pub use oracle::{BugReport, FailureKind, FailureOracle, Oracle};
pub use scheduler::{
    AflFastSchedule, PathFrequencyTable, PathObserver, PowerSchedule, PowerScheduler, Scheduler,
    SchedulerError, UniformSchedule,
};
