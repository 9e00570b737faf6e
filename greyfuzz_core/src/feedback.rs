use crate::coverage::{Fingerprint, FingerprintHash};
use std::collections::HashSet;

/// Decides whether an execution's coverage is worth keeping as a new seed.
pub trait Feedback: Send + Sync {
    fn name(&self) -> &'static str;

    /// `true` if `fingerprint` has not been reported before.
    fn is_interesting(&self, fingerprint: &Fingerprint) -> bool;

    /// Remembers `fingerprint`. Returns `true` if it was not already known.
    fn report_interesting(&mut self, fingerprint: &Fingerprint) -> bool;
}

/// Keeps a seed iff its fingerprint hash has never been observed before.
#[derive(Debug, Default, Clone)]
pub struct CoverageNoveltyFeedback {
    known_hashes: HashSet<FingerprintHash>,
}

impl CoverageNoveltyFeedback {
    pub fn new() -> Self {
        Self {
            known_hashes: HashSet::new(),
        }
    }

    pub fn known_hashes(&self) -> &HashSet<FingerprintHash> {
        &self.known_hashes
    }

    pub fn len(&self) -> usize {
        self.known_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_hashes.is_empty()
    }
}

impl Feedback for CoverageNoveltyFeedback {
    fn name(&self) -> &'static str {
        "CoverageNoveltyFeedback"
    }

    fn is_interesting(&self, fingerprint: &Fingerprint) -> bool {
        !self.known_hashes.contains(&fingerprint.hash())
    }

    fn report_interesting(&mut self, fingerprint: &Fingerprint) -> bool {
        self.known_hashes.insert(fingerprint.hash())
    }
}
