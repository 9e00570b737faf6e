use rand::Rng;
use rand_core::RngCore;

/// The smallest element a mutation inserts, deletes, flips or duplicates.
pub trait Unit: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// Draws a fresh unit for insertion.
    fn random(rng: &mut dyn RngCore) -> Self;

    /// Number of low bits `flip_bit` may target.
    const FLIPPABLE_BITS: u32;

    /// Flips bit `bit` (0-based, below `FLIPPABLE_BITS`).
    ///
    /// Returns `None` when the flipped value is not representable as a unit.
    fn flip_bit(self, bit: u32) -> Option<Self>;
}

impl Unit for u8 {
    const FLIPPABLE_BITS: u32 = 8;

    fn random(rng: &mut dyn RngCore) -> Self {
        rng.random()
    }

    fn flip_bit(self, bit: u32) -> Option<Self> {
        1u8.checked_shl(bit).map(|mask| self ^ mask)
    }
}

impl Unit for char {
    const FLIPPABLE_BITS: u32 = 7;

    /// Printable ASCII only.
    fn random(rng: &mut dyn RngCore) -> Self {
        char::from(rng.random_range(32u8..127u8))
    }

    fn flip_bit(self, bit: u32) -> Option<Self> {
        let mask = 1u32.checked_shl(bit)?;
        char::from_u32(self as u32 ^ mask)
    }
}

pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    type Unit: Unit;

    fn as_bytes(&self) -> &[u8];
    /// Length in units, not bytes.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn units(&self) -> Vec<Self::Unit>;
    fn from_units(units: Vec<Self::Unit>) -> Self;
}

impl Input for Vec<u8> {
    type Unit = u8;

    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
    fn len(&self) -> usize {
        self.len()
    }
    fn is_empty(&self) -> bool {
        self.is_empty()
    }
    fn units(&self) -> Vec<u8> {
        self.clone()
    }
    fn from_units(units: Vec<u8>) -> Self {
        units
    }
}

impl Input for String {
    type Unit = char;

    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }
    fn len(&self) -> usize {
        self.chars().count()
    }
    fn is_empty(&self) -> bool {
        str::is_empty(self)
    }
    fn units(&self) -> Vec<char> {
        self.chars().collect()
    }
    fn from_units(units: Vec<char>) -> Self {
        units.into_iter().collect()
    }
}
