use crate::input::{Input, Unit};
use rand::Rng;
use rand_core::RngCore;

/// A `Mutator` is responsible for transforming an `Input` into a new, potentially modified `Input`.
///
/// Mutators are stateless between calls and never modify the input they are given:
/// the seed it came from must stay valid in the corpus.
///
/// # Type Parameters
/// * `I`: The type of `Input` this mutator operates on.
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<I: Input, R: Rng + ?Sized> {
    /// Produces a new input derived from `input`.
    ///
    /// # Returns
    /// `Result<I, anyhow::Error>`:
    ///   - `Ok(new_input)`: The mutated input.
    ///   - `Err(error)`: The mutation could not be applied to this input.
    fn mutate(&self, input: &I, rng: &mut R) -> Result<I, anyhow::Error>;
}

/// One elementary edit on a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Insert a random unit at a random position (including the end).
    Insert,
    /// Remove the unit at a random position.
    Delete,
    /// Flip one bit of the unit at a random position.
    Flip,
    /// Repeat the unit at a random position right after itself.
    Duplicate,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::Insert,
        MutationKind::Delete,
        MutationKind::Flip,
        MutationKind::Duplicate,
    ];

    /// Applies this edit to a copy of `input`.
    ///
    /// Delete, flip and duplicate leave an empty input unchanged.
    pub fn apply<I: Input>(self, input: &I, rng: &mut dyn RngCore) -> Result<I, anyhow::Error> {
        let mut units = input.units();

        match self {
            MutationKind::Insert => {
                let pos = rng.random_range(0..=units.len());
                units.insert(pos, I::Unit::random(rng));
            }
            MutationKind::Delete => {
                if !units.is_empty() {
                    let pos = rng.random_range(0..units.len());
                    units.remove(pos);
                }
            }
            MutationKind::Flip => {
                if !units.is_empty() {
                    let pos = rng.random_range(0..units.len());
                    let bit = rng.random_range(0..I::Unit::FLIPPABLE_BITS);
                    let unit = units[pos];
                    units[pos] = unit.flip_bit(bit).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Flipping bit {bit} of {unit:?} at position {pos} does not yield a valid unit"
                        )
                    })?;
                }
            }
            MutationKind::Duplicate => {
                if !units.is_empty() {
                    let pos = rng.random_range(0..units.len());
                    let unit = units[pos];
                    units.insert(pos + 1, unit);
                }
            }
        }

        Ok(I::from_units(units))
    }
}

/// Applies one randomly chosen [`MutationKind`] per call.
#[derive(Debug, Clone)]
pub struct UnitMutator {
    kinds: Vec<MutationKind>,
}

impl UnitMutator {
    pub fn new() -> Self {
        Self {
            kinds: MutationKind::ALL.to_vec(),
        }
    }

    /// Restricts the mutator to `kinds`. An empty list falls back to all kinds.
    pub fn with_kinds(kinds: &[MutationKind]) -> Self {
        if kinds.is_empty() {
            return Self::new();
        }
        Self {
            kinds: kinds.to_vec(),
        }
    }

    pub fn kinds(&self) -> &[MutationKind] {
        &self.kinds
    }
}

impl Default for UnitMutator {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, R> Mutator<I, R> for UnitMutator
where
    I: Input,
    R: RngCore + ?Sized,
{
    fn mutate(&self, input: &I, rng: &mut R) -> Result<I, anyhow::Error> {
        let mut adapter = RngAdapter(rng);
        let rng: &mut dyn RngCore = &mut adapter;
        let kind = self.kinds[rng.random_range(0..self.kinds.len())];
        kind.apply(input, rng)
    }
}

/// Lets a possibly unsized generic RNG be used where `&mut dyn RngCore` is expected.
struct RngAdapter<'a, R: RngCore + ?Sized>(&'a mut R);

impl<R: RngCore + ?Sized> RngCore for RngAdapter<'_, R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.0.fill_bytes(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn insert_adds_one_unit() {
        let mut rng = ChaCha8Rng::from_seed([0u8; 32]);
        let original = String::from("abc");
        let mutated = MutationKind::Insert.apply(&original, &mut rng).unwrap();
        assert_eq!(mutated.chars().count(), 4);
        assert_eq!(original, "abc", "input must not be modified in place");
    }

    #[test]
    fn delete_removes_one_unit() {
        let mut rng = ChaCha8Rng::from_seed([1u8; 32]);
        let original: Vec<u8> = vec![10, 20, 30];
        let mutated = MutationKind::Delete.apply(&original, &mut rng).unwrap();
        assert_eq!(mutated.len(), 2);
        assert!(mutated.iter().all(|b| original.contains(b)));
    }

    #[test]
    fn flip_changes_exactly_one_bit() {
        let mut rng = ChaCha8Rng::from_seed([2u8; 32]);
        let original: Vec<u8> = vec![0b1010_1010, 0b0101_0101];
        let mutated = MutationKind::Flip.apply(&original, &mut rng).unwrap();
        let differing_bits: u32 = original
            .iter()
            .zip(&mutated)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(differing_bits, 1);
    }

    #[test]
    fn duplicate_repeats_a_neighbouring_unit() {
        let mut rng = ChaCha8Rng::from_seed([3u8; 32]);
        let original = String::from("xyz");
        let mutated = MutationKind::Duplicate.apply(&original, &mut rng).unwrap();
        assert_eq!(mutated.chars().count(), 4);
        let chars: Vec<char> = mutated.chars().collect();
        assert!(chars.windows(2).any(|w| w[0] == w[1]));
    }

    #[test]
    fn edits_on_empty_input_are_no_ops_except_insert() {
        let mut rng = ChaCha8Rng::from_seed([4u8; 32]);
        let empty: Vec<u8> = vec![];
        for kind in [MutationKind::Delete, MutationKind::Flip, MutationKind::Duplicate] {
            assert!(kind.apply(&empty, &mut rng).unwrap().is_empty(), "{kind:?}");
        }
        assert_eq!(MutationKind::Insert.apply(&empty, &mut rng).unwrap().len(), 1);
    }

    #[test]
    fn unit_mutator_is_deterministic_for_a_fixed_seed() {
        let mutator = UnitMutator::new();
        let input = String::from("good input");
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(99);
            (0..20)
                .map(|_| mutator.mutate(&input, &mut rng).unwrap())
                .collect::<Vec<String>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn unit_mutator_respects_kind_restriction() {
        let mutator = UnitMutator::with_kinds(&[MutationKind::Insert]);
        let mut rng = ChaCha8Rng::from_seed([5u8; 32]);
        let mut current: Vec<u8> = vec![];
        for expected_len in 1..=10 {
            current = mutator.mutate(&current, &mut rng).unwrap();
            assert_eq!(current.len(), expected_len);
        }
        assert_eq!(UnitMutator::with_kinds(&[]).kinds(), &MutationKind::ALL);
    }

    #[test]
    fn text_mutations_stay_valid_strings() {
        let mutator = UnitMutator::new();
        let mut rng = ChaCha8Rng::from_seed([6u8; 32]);
        let mut current = String::from("a");
        for _ in 0..500 {
            current = mutator.mutate(&current, &mut rng).unwrap();
            assert!(current.chars().all(|c| c.is_ascii()));
        }
    }
}
