use crate::budget::Budget;
use crate::config::GreyfuzzConfig;
use crate::corpus::{Corpus, CorpusError, InMemoryCorpus, Seed, SeedOrigin};
use crate::coverage::{FingerprintHash, Trace};
use crate::executor::{ExecutionStatus, Executor, InProcessExecutor};
use crate::feedback::{CoverageNoveltyFeedback, Feedback};
use crate::input::Input;
use crate::mutator::Mutator;
use crate::oracle::{BugReport, FailureOracle, Oracle};
use crate::scheduler::{
    PathFrequencyTable, PowerSchedule, PowerScheduler, Scheduler, SchedulerError,
};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FuzzerError {
    #[error("Initial corpus is empty, nothing to fuzz from")]
    EmptyInitialCorpus,
    #[error("Invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),
    #[error("Fuzzer is stopped")]
    Stopped,
    #[error("Scheduler failed: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Corpus operation failed: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Mutation failed: {0:#}")]
    Mutation(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzerState {
    Running,
    /// Terminal.
    Stopped,
}

/// Counters over the lifetime of one [`Fuzzer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzerStats {
    /// Iterations started, including skipped ones and initial seed runs.
    pub iterations: u64,
    /// Iterations that executed an initial seed.
    pub seed_runs: u64,
    pub executions: u64,
    /// Mutated candidates added because their coverage was new.
    pub novel: u64,
    pub passes: u64,
    pub fails: u64,
    pub errors: u64,
    /// Iterations abandoned on an internal fault.
    pub skipped: u64,
}

impl FuzzerStats {
    fn record_status(&mut self, status: &ExecutionStatus) {
        self.executions += 1;
        match status {
            ExecutionStatus::Pass => self.passes += 1,
            ExecutionStatus::Fail(_) => self.fails += 1,
            ExecutionStatus::Error(_) => self.errors += 1,
        }
    }
}

/// What happened in one iteration.
#[derive(Debug, Clone)]
pub struct IterationReport<I: Input> {
    /// 1-based. The initial seeds take the first iterations.
    pub iteration: u64,
    /// Corpus entry the candidate was mutated from, or the new entry of an initial seed.
    pub seed_id: usize,
    pub origin: SeedOrigin,
    pub candidate: I,
    pub status: ExecutionStatus,
    pub fingerprint_hash: FingerprintHash,
    /// The fingerprint had not been seen before this execution.
    pub novel: bool,
    pub added_id: Option<usize>,
    pub bug: Option<BugReport<I>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Iterations performed by this run.
    pub iterations: u64,
    pub stats: FuzzerStats,
    pub corpus_size: usize,
    pub distinct_paths: usize,
    pub elapsed: Duration,
}

/// Drives the select, mutate, execute and triage cycle.
///
/// The initial seeds are executed unmutated as the first iterations, each one entering
/// the corpus with the coverage of its run. Only then does selection start.
///
/// The fuzzer owns its corpus, frequency statistics and random source. With the same
/// configuration, target and initial corpus, two fuzzers make identical choices.
pub struct Fuzzer<I, E, M, S>
where
    I: Input,
    E: Executor<I>,
    M: Mutator<I, ChaCha8Rng>,
    S: Scheduler<I>,
{
    config: GreyfuzzConfig,
    executor: E,
    mutator: M,
    scheduler: S,
    oracle: Box<dyn Oracle<I>>,
    corpus: InMemoryCorpus<I>,
    pending: VecDeque<(usize, I)>,
    feedback: CoverageNoveltyFeedback,
    rng: ChaCha8Rng,
    state: FuzzerState,
    stats: FuzzerStats,
}

impl<I, E, M, S> Fuzzer<I, E, M, S>
where
    I: Input,
    E: Executor<I>,
    M: Mutator<I, ChaCha8Rng>,
    S: Scheduler<I>,
{
    /// Builds the fuzzer around an existing executor and scheduler. Nothing runs yet.
    ///
    /// `executor` and `scheduler` are used as given. `config` is validated and supplies
    /// the random seed. See [`Fuzzer::from_config`] to build both from `config` too.
    pub fn new<C>(
        config: GreyfuzzConfig,
        executor: E,
        mutator: M,
        scheduler: S,
        initial_corpus: C,
    ) -> Result<Self, FuzzerError>
    where
        C: IntoIterator<Item = I>,
    {
        config.validate().map_err(FuzzerError::InvalidConfig)?;
        let pending: VecDeque<(usize, I)> = initial_corpus.into_iter().enumerate().collect();
        if pending.is_empty() {
            return Err(FuzzerError::EmptyInitialCorpus);
        }
        tracing::debug!("queued {} initial seeds", pending.len());

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.fuzzer.rng_seed),
            config,
            executor,
            mutator,
            scheduler,
            oracle: Box::new(FailureOracle::new()),
            corpus: InMemoryCorpus::new(),
            pending,
            feedback: CoverageNoveltyFeedback::new(),
            state: FuzzerState::Running,
            stats: FuzzerStats::default(),
        })
    }

    /// Replaces the default [`FailureOracle`].
    pub fn with_oracle(mut self, oracle: Box<dyn Oracle<I>>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Performs one iteration.
    ///
    /// An internal fault abandons the iteration and is counted in
    /// [`FuzzerStats::skipped`]. The iteration still counts toward the budget.
    pub fn fuzz_one(&mut self) -> Result<IterationReport<I>, FuzzerError> {
        if self.state == FuzzerState::Stopped {
            return Err(FuzzerError::Stopped);
        }
        self.stats.iterations += 1;
        let iteration = self.stats.iterations;

        let result = self.iterate(iteration);
        if result.is_err() {
            self.stats.skipped += 1;
        }
        result
    }

    fn iterate(&mut self, iteration: u64) -> Result<IterationReport<I>, FuzzerError> {
        let (seed_id, candidate, origin) = match self.pending.pop_front() {
            Some((index, data)) => {
                self.stats.seed_runs += 1;
                (self.corpus.len(), data, SeedOrigin::Initial { index })
            }
            None => {
                let seed_id = self.scheduler.next(&self.corpus, &mut self.rng)?;
                let seed = self
                    .corpus
                    .get(seed_id)
                    .ok_or(CorpusError::InputNotFound(seed_id))?;
                let candidate = self
                    .mutator
                    .mutate(seed.data(), &mut self.rng)
                    .map_err(FuzzerError::Mutation)?;
                let origin = SeedOrigin::Discovered {
                    parent: seed_id,
                    iteration,
                };
                (seed_id, candidate, origin)
            }
        };

        let (status, fingerprint) = self.executor.run(&candidate);
        self.stats.record_status(&status);
        self.scheduler.observe(&fingerprint);
        let fingerprint_hash = fingerprint.hash();

        let novel = self.feedback.is_interesting(&fingerprint);
        let added_id = match origin {
            SeedOrigin::Initial { index } => {
                self.feedback.report_interesting(&fingerprint);
                let id = self
                    .corpus
                    .add(Seed::new(candidate.clone(), fingerprint, origin))?;
                tracing::debug!(
                    "iteration {iteration}: initial seed {index} took path {fingerprint_hash}"
                );
                if self.pending.is_empty() {
                    tracing::info!(
                        "initial seeds ran into {} distinct paths",
                        self.feedback.len()
                    );
                }
                Some(id)
            }
            SeedOrigin::Discovered { .. } if novel => {
                self.feedback.report_interesting(&fingerprint);
                let id = self
                    .corpus
                    .add(Seed::new(candidate.clone(), fingerprint, origin))?;
                self.stats.novel += 1;
                tracing::info!(
                    "iteration {iteration}: new path {fingerprint_hash} from seed {seed_id}, corpus size {}",
                    self.corpus.len()
                );
                Some(id)
            }
            SeedOrigin::Discovered { .. } => None,
        };

        let bug = self.oracle.examine(&candidate, &status);
        if let Some(bug) = &bug {
            tracing::warn!(
                "iteration {iteration} {}: {} (input {})",
                bug.kind,
                bug.description,
                bug.input_hash
            );
        }
        tracing::trace!("iteration {iteration}: seed {seed_id} -> {candidate:?}, {status:?}");

        Ok(IterationReport {
            iteration,
            seed_id,
            origin,
            candidate,
            status,
            fingerprint_hash,
            novel,
            added_id,
            bug,
        })
    }

    /// Runs until `budget` is exhausted, then stops.
    pub fn run(&mut self, budget: &dyn Budget) -> RunSummary {
        self.run_with(budget, |_| {})
    }

    /// Like [`Fuzzer::run`], handing every completed iteration to `on_iteration`.
    pub fn run_with<B, F>(&mut self, budget: &B, mut on_iteration: F) -> RunSummary
    where
        B: Budget + ?Sized,
        F: FnMut(&IterationReport<I>),
    {
        let started = Instant::now();
        let start_iterations = self.stats.iterations;
        tracing::info!(
            "Starting fuzzer: {} seeds, {} initial pending, {} feedback, rng seed {:#x}",
            self.corpus.len(),
            self.pending.len(),
            self.feedback.name(),
            self.config.fuzzer.rng_seed
        );

        while self.state == FuzzerState::Running && !budget.exhausted(&self.stats) {
            match self.fuzz_one() {
                Ok(report) => on_iteration(&report),
                Err(FuzzerError::Stopped) => break,
                Err(e) => tracing::warn!("skipping iteration {}: {e}", self.stats.iterations),
            }
        }
        self.stop();

        let summary = RunSummary {
            iterations: self.stats.iterations - start_iterations,
            stats: self.stats,
            corpus_size: self.corpus.len(),
            distinct_paths: self.scheduler.path_frequency().len(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            "Fuzzer stopped after {} iterations: {} seeds, {} paths, {} fails, {} errors, {} skipped",
            summary.iterations,
            summary.corpus_size,
            summary.distinct_paths,
            summary.stats.fails,
            summary.stats.errors,
            summary.stats.skipped
        );
        summary
    }

    /// Moves the fuzzer to its terminal state.
    pub fn stop(&mut self) {
        self.state = FuzzerState::Stopped;
    }

    pub fn state(&self) -> FuzzerState {
        self.state
    }

    pub fn stats(&self) -> &FuzzerStats {
        &self.stats
    }

    pub fn corpus(&self) -> &InMemoryCorpus<I> {
        &self.corpus
    }

    pub fn path_frequency(&self) -> &PathFrequencyTable {
        self.scheduler.path_frequency()
    }

    pub fn coverages_seen(&self) -> &HashSet<FingerprintHash> {
        self.feedback.known_hashes()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &GreyfuzzConfig {
        &self.config
    }
}

impl<I, F, M> Fuzzer<I, InProcessExecutor<I, F>, M, PowerScheduler<Box<dyn PowerSchedule>>>
where
    I: Input,
    F: FnMut(&I, &mut Trace) -> anyhow::Result<()>,
    M: Mutator<I, ChaCha8Rng>,
{
    /// Builds an in-process fuzzer whose coverage policy, trace limits and power
    /// schedule all come from `config`.
    pub fn from_config<C>(
        config: GreyfuzzConfig,
        harness_fn: F,
        mutator: M,
        initial_corpus: C,
    ) -> Result<Self, FuzzerError>
    where
        C: IntoIterator<Item = I>,
    {
        config.validate().map_err(FuzzerError::InvalidConfig)?;
        let executor = InProcessExecutor::new(harness_fn, config.coverage_tracker());
        let scheduler = config.scheduler();
        Self::new(config, executor, mutator, scheduler, initial_corpus)
    }
}
