use crate::coverage::{CoverageTracker, Fingerprint, LimitExceeded, Trace};
use crate::input::Input;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Tagged result of one target execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The target returned normally.
    Pass,
    /// The target reported an error or panicked.
    Fail(String),
    /// The execution could not be completed, e.g. it crossed its trace limits.
    Error(String),
}

impl ExecutionStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, ExecutionStatus::Pass)
    }

    /// `true` for both `Fail` and `Error`.
    pub fn is_failure(&self) -> bool {
        !self.is_pass()
    }
}

pub trait Executor<I: Input> {
    /// Runs the target once on `input` under coverage capture.
    ///
    /// Never propagates a target failure: the status and the fingerprint gathered
    /// up to the point of completion or failure are always returned.
    fn run(&mut self, input: &I) -> (ExecutionStatus, Fingerprint);
}

/// Executes a harness closure in the current process.
///
/// The harness receives the input and an explicit [`Trace`] handle.
pub struct InProcessExecutor<I, F>
where
    I: Input,
    F: FnMut(&I, &mut Trace) -> anyhow::Result<()>,
{
    harness_fn: F,
    tracker: CoverageTracker,
    _marker: PhantomData<fn(&I)>,
}

impl<I, F> InProcessExecutor<I, F>
where
    I: Input,
    F: FnMut(&I, &mut Trace) -> anyhow::Result<()>,
{
    pub fn new(harness_fn: F, tracker: CoverageTracker) -> Self {
        Self {
            harness_fn,
            tracker,
            _marker: PhantomData,
        }
    }

    pub fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic type".to_string()
    }
}

impl<I, F> Executor<I> for InProcessExecutor<I, F>
where
    I: Input,
    F: FnMut(&I, &mut Trace) -> anyhow::Result<()>,
{
    fn run(&mut self, input: &I) -> (ExecutionStatus, Fingerprint) {
        let Self {
            harness_fn,
            tracker,
            ..
        } = self;

        let result = {
            let mut session = tracker.begin();
            catch_unwind(AssertUnwindSafe(|| harness_fn(input, &mut *session)))
        };

        let mut status = match result {
            Ok(Ok(())) => ExecutionStatus::Pass,
            Ok(Err(e)) => ExecutionStatus::Fail(format!("{e:#}")),
            Err(payload) => match payload.downcast_ref::<LimitExceeded>() {
                Some(limit) => ExecutionStatus::Error(limit.to_string()),
                None => ExecutionStatus::Fail(panic_message(payload.as_ref())),
            },
        };
        let already_error = matches!(status, ExecutionStatus::Error(_));
        if let Some(limit) = tracker.timed_out().filter(|_| !already_error) {
            status = ExecutionStatus::Error(LimitExceeded::Timeout(limit).to_string());
        }

        (status, tracker.fingerprint())
    }
}
