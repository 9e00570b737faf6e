use crate::coverage::Fingerprint;
use crate::input::Input;
use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Defines errors that can arise during corpus operations.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The requested seed ID was not found within the corpus.
    #[error("Seed ID {0} not found in corpus")]
    InputNotFound(usize),

    /// An operation could not be performed because the corpus is empty
    /// (e.g., attempting to select a seed).
    #[error("Corpus is empty, cannot select an input")]
    CorpusIsEmpty,

    /// Selection weights did not match the corpus or were not usable as weights.
    #[error("Invalid selection weights: {0}")]
    InvalidWeights(String),
}

/// Where a seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOrigin {
    /// Position in the initial corpus list.
    Initial { index: usize },
    /// Mutated from corpus entry `parent` during fuzzing iteration `iteration`.
    Discovered { parent: usize, iteration: u64 },
}

/// A retained input together with the coverage it produced when first executed.
///
/// Seeds are immutable once created; mutation always yields a new seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed<I: Input> {
    data: I,
    coverage: Fingerprint,
    origin: SeedOrigin,
}

impl<I: Input> Seed<I> {
    pub fn new(data: I, coverage: Fingerprint, origin: SeedOrigin) -> Self {
        Self {
            data,
            coverage,
            origin,
        }
    }

    pub fn data(&self) -> &I {
        &self.data
    }

    pub fn coverage(&self) -> &Fingerprint {
        &self.coverage
    }

    pub fn origin(&self) -> SeedOrigin {
        self.origin
    }
}

/// Defines the common interface for an append-only collection of seeds.
///
/// IDs are insertion positions, so iteration order is discovery order. No entry is
/// removed or modified after it has been added.
pub trait Corpus<I: Input>: Send + Sync {
    /// Appends a seed and returns its ID.
    fn add(&mut self, seed: Seed<I>) -> Result<usize, CorpusError>;

    fn get(&self, id: usize) -> Option<&Seed<I>>;

    /// Iterates seeds in insertion order.
    fn iter(&self) -> Box<dyn Iterator<Item = &Seed<I>> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks a seed with probability proportional to `weights[id]`.
    ///
    /// `weights` must hold one finite, non-negative value per seed, in insertion
    /// order, with a positive sum. The scan walks the cumulative weights in insertion
    /// order, so the same draw always resolves to the same seed.
    fn select_weighted(
        &self,
        weights: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<(usize, &Seed<I>), CorpusError> {
        if self.is_empty() {
            return Err(CorpusError::CorpusIsEmpty);
        }
        if weights.len() != self.len() {
            return Err(CorpusError::InvalidWeights(format!(
                "expected {} weights, got {}",
                self.len(),
                weights.len()
            )));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(CorpusError::InvalidWeights(format!(
                "weight {bad} is not a finite non-negative number"
            )));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(CorpusError::InvalidWeights(format!(
                "weights sum to {total}"
            )));
        }

        let draw = rng.random::<f64>() * total;
        let mut cumulative = 0.0;
        let mut last_positive = 0;
        for (id, weight) in weights.iter().enumerate() {
            if *weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_positive = id;
            if draw < cumulative {
                break;
            }
        }
        // Rounding can leave `draw` at the very top of the range; the last positive
        // weight owns that edge.
        self.get(last_positive)
            .map(|seed| (last_positive, seed))
            .ok_or(CorpusError::InputNotFound(last_positive))
    }
}

/// An in-memory implementation of the `Corpus` trait.
///
/// This corpus stores all seeds directly in a `Vec`. It is not persistent across runs.
#[derive(Debug, Clone)]
pub struct InMemoryCorpus<I: Input> {
    entries: Vec<Seed<I>>,
}

impl<I: Input> InMemoryCorpus<I> {
    /// Creates a new, empty `InMemoryCorpus`.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<I: Input> Default for InMemoryCorpus<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Input> Corpus<I> for InMemoryCorpus<I> {
    fn add(&mut self, seed: Seed<I>) -> Result<usize, CorpusError> {
        let id = self.entries.len();
        self.entries.push(seed);
        Ok(id)
    }

    fn get(&self, id: usize) -> Option<&Seed<I>> {
        self.entries.get(id)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Seed<I>> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{CoveragePolicy, Location, NGramPolicy};
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::collections::HashMap;

    fn seed(data: &[u8], line: u32) -> Seed<Vec<u8>> {
        let coverage = NGramPolicy::new(1).reduce(&[Location::new("corpus", line)]);
        Seed::new(data.to_vec(), coverage, SeedOrigin::Initial { index: 0 })
    }

    #[test]
    fn in_memory_corpus_add_get_len_is_empty() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        assert!(corpus.is_empty());
        assert_eq!(corpus.len(), 0);

        let id1 = corpus.add(seed(&[1, 2, 3], 1)).unwrap();
        assert_eq!(id1, 0);
        assert!(!corpus.is_empty());
        let id2 = corpus.add(seed(&[4, 5], 2)).unwrap();
        assert_eq!(id2, 1);
        assert_eq!(corpus.len(), 2);

        let first = corpus.get(id1).expect("first seed");
        assert_eq!(first.data(), &vec![1, 2, 3]);
        assert_eq!(first.origin(), SeedOrigin::Initial { index: 0 });
        assert!(corpus.get(99).is_none());
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        for (i, byte) in [b'C', b'A', b'B'].into_iter().enumerate() {
            corpus.add(seed(&[byte], i as u32)).unwrap();
        }
        let order: Vec<u8> = corpus.iter().map(|s| s.data()[0]).collect();
        assert_eq!(order, vec![b'C', b'A', b'B']);
    }

    #[test]
    fn select_weighted_on_empty_corpus_fails() {
        let corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        assert!(matches!(
            corpus.select_weighted(&[], &mut rng),
            Err(CorpusError::CorpusIsEmpty)
        ));
    }

    #[test]
    fn select_weighted_rejects_bad_weights() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        corpus.add(seed(b"a", 1)).unwrap();
        corpus.add(seed(b"b", 2)).unwrap();
        let mut rng = ChaCha8Rng::from_seed([42; 32]);

        for weights in [
            vec![1.0],
            vec![1.0, -0.5],
            vec![f64::NAN, 1.0],
            vec![0.0, 0.0],
            vec![f64::INFINITY, 1.0],
        ] {
            assert!(
                matches!(
                    corpus.select_weighted(&weights, &mut rng),
                    Err(CorpusError::InvalidWeights(_))
                ),
                "weights {weights:?} should be rejected"
            );
        }
    }

    #[test]
    fn select_weighted_never_picks_zero_weight() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        for (i, byte) in [b'A', b'B', b'C'].into_iter().enumerate() {
            corpus.add(seed(&[byte], i as u32)).unwrap();
        }
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        for _ in 0..200 {
            let (id, _) = corpus.select_weighted(&[0.0, 1.0, 0.0], &mut rng).unwrap();
            assert_eq!(id, 1);
        }
    }

    #[test]
    fn select_weighted_is_roughly_proportional() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        corpus.add(seed(b"heavy", 1)).unwrap();
        corpus.add(seed(b"light", 2)).unwrap();
        let mut rng = ChaCha8Rng::from_seed([3; 32]);

        let mut counts: HashMap<usize, usize> = HashMap::new();
        for _ in 0..4_000 {
            let (id, _) = corpus.select_weighted(&[3.0, 1.0], &mut rng).unwrap();
            *counts.entry(id).or_insert(0) += 1;
        }
        let heavy = counts[&0] as f64 / 4_000.0;
        assert!((0.70..0.80).contains(&heavy), "heavy share was {heavy}");
    }

    #[test]
    fn select_weighted_is_reproducible_for_a_fixed_rng_seed() {
        let mut corpus: InMemoryCorpus<Vec<u8>> = InMemoryCorpus::new();
        for i in 0..5u8 {
            corpus.add(seed(&[i], i as u32)).unwrap();
        }
        let weights = [1.0, 1.0, 2.0, 0.5, 1.0];
        let picks = |seed_byte: u8| {
            let mut rng = ChaCha8Rng::from_seed([seed_byte; 32]);
            (0..50)
                .map(|_| corpus.select_weighted(&weights, &mut rng).unwrap().0)
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(11), picks(11));
    }

    /// Returns the same word forever, so the unit draw is `(word >> 11) * 2^-53`.
    struct FixedRng(u64);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(self.0 as u8);
        }
    }

    fn corpus_of(count: u8) -> InMemoryCorpus<Vec<u8>> {
        let mut corpus = InMemoryCorpus::new();
        for i in 0..count {
            corpus.add(seed(&[i], i as u32)).unwrap();
        }
        corpus
    }

    #[test]
    fn equal_weights_resolve_in_insertion_order() {
        let corpus = corpus_of(3);
        let (id, chosen) = corpus
            .select_weighted(&[1.0, 1.0, 1.0], &mut FixedRng(0))
            .unwrap();
        assert_eq!(id, 0);
        assert_eq!(chosen.data(), &vec![0]);

        let (id, _) = corpus
            .select_weighted(&[1.0, 1.0, 1.0], &mut FixedRng(u64::MAX))
            .unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn draw_on_a_boundary_belongs_to_the_next_seed() {
        let corpus = corpus_of(2);
        // 1 << 63 draws exactly 0.5, which lands on the cumulative 1.0 of the first seed.
        let (id, _) = corpus
            .select_weighted(&[1.0, 1.0], &mut FixedRng(1 << 63))
            .unwrap();
        assert_eq!(id, 1);

        let (id, _) = corpus
            .select_weighted(&[1.0, 1.0], &mut FixedRng((1 << 63) - (1 << 11)))
            .unwrap();
        assert_eq!(id, 0);
    }

    #[test]
    fn leading_zero_weights_are_skipped() {
        let corpus = corpus_of(3);
        let (id, _) = corpus
            .select_weighted(&[0.0, 1.0, 1.0], &mut FixedRng(0))
            .unwrap();
        assert_eq!(id, 1);

        let (id, _) = corpus
            .select_weighted(&[1.0, 1.0, 0.0], &mut FixedRng(u64::MAX))
            .unwrap();
        assert_eq!(id, 1);
    }
}
