use crate::executor::ExecutionStatus;
use crate::input::Input;
use std::fmt;

/// Which non-passing outcome a report was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The target reported an error or panicked.
    Fail,
    /// The execution did not complete, e.g. it ran past its trace limits.
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Fail => write!(f, "fail"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// Represents a potential bug identified by an `Oracle`.
///
/// Reports are handed to the caller and never stored by the fuzzer.
#[derive(Debug, Clone, PartialEq)]
pub struct BugReport<I: Input> {
    /// The specific input that triggered this bug report.
    pub input: I,
    /// A human-readable description of the failure, taken from the execution status.
    pub description: String,
    pub kind: FailureKind,
    /// MD5 hex digest of the input bytes, useful for deduplication by the caller.
    pub input_hash: String,
}

/// An `Oracle` examines the outcome of a target's execution to determine if a bug has occurred.
pub trait Oracle<I: Input>: Send + Sync {
    /// Returns `Some(BugReport)` if `status` for `input` should be surfaced, otherwise `None`.
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>>;
}

/// Reports every `Fail` and `Error` outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureOracle;

impl FailureOracle {
    pub fn new() -> Self {
        FailureOracle
    }
}

impl<I: Input> Oracle<I> for FailureOracle {
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>> {
        let (kind, description) = match status {
            ExecutionStatus::Pass => return None,
            ExecutionStatus::Fail(description) => (FailureKind::Fail, description),
            ExecutionStatus::Error(description) => (FailureKind::Error, description),
        };
        let input_digest = md5::compute(input.as_bytes());
        Some(BugReport {
            input: input.clone(),
            description: description.clone(),
            kind,
            input_hash: format!("{input_digest:x}"),
        })
    }
}
