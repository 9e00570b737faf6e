use crate::corpus::{Corpus, Seed};
use crate::coverage::{Fingerprint, FingerprintHash};
use crate::input::Input;
use rand_core::RngCore;
use std::collections::BTreeMap;
use thiserror::Error;

/// Lowest energy any seed can be assigned.
pub const DEFAULT_MIN_ENERGY: f64 = 1e-9;
/// Exponent used by [`AflFastSchedule::default`].
pub const DEFAULT_AFL_FAST_EXPONENT: f64 = 5.0;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Indicates that the corpus is empty, and therefore no input can be scheduled.
    #[error("Corpus is empty, cannot schedule next input")]
    CorpusEmpty,
    /// Wraps an error originating from the corpus during a scheduler operation.
    #[error("Corpus interaction failed within scheduler: {0}")]
    CorpusInteractionError(#[from] crate::corpus::CorpusError),
}

/// Number of executions observed per fingerprint hash.
///
/// Every execution is recorded, whether or not its coverage was new.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFrequencyTable {
    counts: BTreeMap<FingerprintHash, u64>,
    total: u64,
}

impl PathFrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more execution of `hash` and returns the updated count.
    pub fn record(&mut self, hash: FingerprintHash) -> u64 {
        self.total += 1;
        let count = self.counts.entry(hash).or_insert(0);
        *count += 1;
        *count
    }

    pub fn frequency(&self, hash: &FingerprintHash) -> u64 {
        self.counts.get(hash).copied().unwrap_or(0)
    }

    /// Sum of all counts, i.e. the number of recorded executions.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct paths seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates `(hash, count)` in hash order.
    pub fn iter(&self) -> impl Iterator<Item = (&FingerprintHash, u64)> {
        self.counts.iter().map(|(hash, count)| (hash, *count))
    }
}

/// Maps how often a seed's path has been exercised to a raw energy value.
///
/// Implementations must be non-increasing in `frequency`.
pub trait PowerSchedule: Send + Sync {
    fn name(&self) -> &'static str;
    fn assign_energy(&self, frequency: u64) -> f64;
}

/// AFLFast-style exponential schedule: `1 / frequency^exponent`.
///
/// Unexercised paths (frequency 0) get the same energy as frequency 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AflFastSchedule {
    exponent: f64,
}

impl AflFastSchedule {
    pub fn new(exponent: f64) -> Self {
        Self { exponent }
    }

    pub fn exponent(&self) -> f64 {
        self.exponent
    }
}

impl Default for AflFastSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_AFL_FAST_EXPONENT)
    }
}

impl PowerSchedule for AflFastSchedule {
    fn name(&self) -> &'static str {
        "afl-fast"
    }

    fn assign_energy(&self, frequency: u64) -> f64 {
        1.0 / (frequency.max(1) as f64).powf(self.exponent)
    }
}

/// Every seed gets the same energy.
#[derive(Default, Debug, Clone, Copy)]
pub struct UniformSchedule;

impl PowerSchedule for UniformSchedule {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn assign_energy(&self, _frequency: u64) -> f64 {
        1.0
    }
}

impl PowerSchedule for Box<dyn PowerSchedule> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn assign_energy(&self, frequency: u64) -> f64 {
        (**self).assign_energy(frequency)
    }
}

/// Learns from every execution the fuzzer performs, independent of the input type.
pub trait PathObserver {
    /// Records one execution that produced `fingerprint`.
    fn observe(&mut self, fingerprint: &Fingerprint);

    fn path_frequency(&self) -> &PathFrequencyTable;
}

/// A `Scheduler` selects the next seed from the `Corpus` to be mutated.
pub trait Scheduler<I: Input>: PathObserver + Send + Sync {
    /// Selects and returns the ID of the next seed to mutate.
    fn next(
        &mut self,
        corpus: &dyn Corpus<I>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError>;

    /// Current selection weight of `seed`.
    fn energy(&self, seed: &Seed<I>) -> f64;
}

/// Energy-weighted selection driven by a [`PowerSchedule`].
///
/// Energies are derived on demand from the frequency table, floored at
/// `min_energy` so that no seed is starved, and drawn from in corpus order.
#[derive(Debug, Clone)]
pub struct PowerScheduler<P: PowerSchedule> {
    schedule: P,
    path_frequency: PathFrequencyTable,
    min_energy: f64,
}

impl<P: PowerSchedule> PowerScheduler<P> {
    pub fn new(schedule: P) -> Self {
        Self {
            schedule,
            path_frequency: PathFrequencyTable::new(),
            min_energy: DEFAULT_MIN_ENERGY,
        }
    }

    /// Sets the energy floor. Values that are not strictly positive and finite are
    /// replaced with [`DEFAULT_MIN_ENERGY`].
    pub fn with_min_energy(mut self, min_energy: f64) -> Self {
        self.min_energy = if min_energy.is_finite() && min_energy > 0.0 {
            min_energy
        } else {
            DEFAULT_MIN_ENERGY
        };
        self
    }

    pub fn min_energy(&self) -> f64 {
        self.min_energy
    }

    pub fn schedule(&self) -> &P {
        &self.schedule
    }

    /// Energy for a path executed `frequency` times.
    pub fn energy_for_frequency(&self, frequency: u64) -> f64 {
        let raw = self.schedule.assign_energy(frequency);
        if raw.is_finite() {
            raw.max(self.min_energy)
        } else {
            self.min_energy
        }
    }

    /// Energies of all seeds, in corpus order.
    pub fn energies<I: Input, C: Corpus<I> + ?Sized>(&self, corpus: &C) -> Vec<f64> {
        corpus.iter().map(|seed| self.seed_energy(seed)).collect()
    }

    /// Energies normalized to sum to one, in corpus order.
    pub fn normalized_energies<I: Input, C: Corpus<I> + ?Sized>(&self, corpus: &C) -> Vec<f64> {
        let energies = self.energies::<I, C>(corpus);
        let total: f64 = energies.iter().sum();
        energies.into_iter().map(|e| e / total).collect()
    }

    fn seed_energy<I: Input>(&self, seed: &Seed<I>) -> f64 {
        self.energy_for_frequency(self.path_frequency.frequency(&seed.coverage().hash()))
    }
}

impl<I: Input, P: PowerSchedule> Scheduler<I> for PowerScheduler<P> {
    fn next(
        &mut self,
        corpus: &dyn Corpus<I>,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError> {
        if corpus.is_empty() {
            return Err(SchedulerError::CorpusEmpty);
        }
        let energies = self.energies::<I, _>(corpus);
        let (id, _seed) = corpus.select_weighted(&energies, rng)?;
        Ok(id)
    }

    fn energy(&self, seed: &Seed<I>) -> f64 {
        self.seed_energy(seed)
    }
}

impl<P: PowerSchedule> PathObserver for PowerScheduler<P> {
    fn observe(&mut self, fingerprint: &Fingerprint) {
        self.path_frequency.record(fingerprint.hash());
    }

    fn path_frequency(&self) -> &PathFrequencyTable {
        &self.path_frequency
    }
}
