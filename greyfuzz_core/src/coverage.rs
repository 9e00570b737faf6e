use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// One instrumented point in the target, identified by module path and line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub scope: &'static str,
    pub line: u32,
}

impl Location {
    pub const fn new(scope: &'static str, line: u32) -> Self {
        Self { scope, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.line)
    }
}

/// Records the current source position on a [`Trace`].
///
/// ```
/// use greyfuzz_core::{trace_point, coverage::Trace};
///
/// fn target(input: &str, trace: &mut Trace) {
///     trace_point!(trace);
///     if input.starts_with('x') {
///         trace_point!(trace);
///     }
/// }
/// ```
#[macro_export]
macro_rules! trace_point {
    ($trace:expr) => {
        $trace.hit($crate::coverage::Location::new(module_path!(), line!()))
    };
}

/// Limits applied to a single traced execution.
///
/// When either limit is crossed, the next `hit` aborts the target. The executor reports
/// the abort as an error outcome, and also reports a run that finished past its timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceLimits {
    pub max_events: Option<usize>,
    pub timeout: Option<Duration>,
}

/// Unwind payload used to abort a target that crossed its [`TraceLimits`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LimitExceeded {
    Events(usize),
    Timeout(Duration),
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitExceeded::Events(max) => write!(f, "trace exceeded {max} events"),
            LimitExceeded::Timeout(limit) => write!(f, "execution timed out after {limit:?}"),
        }
    }
}

/// The ordered event log of one execution.
///
/// Targets receive `&mut Trace` and call [`Trace::hit`] (usually through
/// [`trace_point!`]). Events outside an active [`TraceSession`] are dropped.
#[derive(Debug, Default)]
pub struct Trace {
    events: Vec<Location>,
    limits: TraceLimits,
    started_at: Option<Instant>,
    finished_in: Option<Duration>,
    active: bool,
}

impl Trace {
    pub fn hit(&mut self, location: Location) {
        if !self.active {
            return;
        }
        if let Some(max) = self.limits.max_events {
            if self.events.len() >= max {
                self.abort(LimitExceeded::Events(max));
            }
        }
        if let (Some(limit), Some(started_at)) = (self.limits.timeout, self.started_at) {
            if started_at.elapsed() > limit {
                self.abort(LimitExceeded::Timeout(limit));
            }
        }
        self.events.push(location);
    }

    pub fn events(&self) -> &[Location] {
        &self.events
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn abort(&mut self, reason: LimitExceeded) -> ! {
        self.active = false;
        // resume_unwind skips the panic hook, so limit aborts stay quiet.
        std::panic::resume_unwind(Box::new(reason))
    }
}

/// Scoped capture of exactly one execution. Capture stops when the guard drops,
/// including while unwinding out of the target.
pub struct TraceSession<'a> {
    trace: &'a mut Trace,
}

impl Deref for TraceSession<'_> {
    type Target = Trace;

    fn deref(&self) -> &Trace {
        &*self.trace
    }
}

impl DerefMut for TraceSession<'_> {
    fn deref_mut(&mut self) -> &mut Trace {
        &mut *self.trace
    }
}

impl Drop for TraceSession<'_> {
    fn drop(&mut self) {
        self.trace.active = false;
        self.trace.finished_in = self.trace.started_at.take().map(|s| s.elapsed());
    }
}

/// MD5 digest of a fingerprint's canonical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FingerprintHash(pub [u8; 16]);

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Order-insensitive summary of one execution's trace: a set of location n-grams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    grams: BTreeSet<Vec<Location>>,
    hash: FingerprintHash,
}

impl Fingerprint {
    pub fn from_grams<G>(grams: G) -> Self
    where
        G: IntoIterator<Item = Vec<Location>>,
    {
        let grams: BTreeSet<Vec<Location>> = grams.into_iter().collect();
        let hash = Self::digest(&grams);
        Self { grams, hash }
    }

    pub fn empty() -> Self {
        Self::from_grams(std::iter::empty())
    }

    pub fn hash(&self) -> FingerprintHash {
        self.hash
    }

    pub fn grams(&self) -> impl Iterator<Item = &[Location]> {
        self.grams.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Length-prefixed little-endian encoding of the sorted gram set.
    fn digest(grams: &BTreeSet<Vec<Location>>) -> FingerprintHash {
        let mut ctx = md5::Context::new();
        ctx.consume((grams.len() as u64).to_le_bytes());
        for gram in grams {
            ctx.consume((gram.len() as u32).to_le_bytes());
            for location in gram {
                ctx.consume((location.scope.len() as u32).to_le_bytes());
                ctx.consume(location.scope.as_bytes());
                ctx.consume(location.line.to_le_bytes());
            }
        }
        FingerprintHash(ctx.compute().0)
    }
}

/// Reduces an ordered trace to a [`Fingerprint`].
pub trait CoveragePolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn reduce(&self, events: &[Location]) -> Fingerprint;
}

/// How much path order a fingerprint keeps.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// Distinct locations visited.
    Locations,
    /// Consecutive location pairs.
    #[default]
    Pairs,
    /// Consecutive location triples.
    Triples,
}

impl Granularity {
    pub fn order(self) -> usize {
        match self {
            Granularity::Locations => 1,
            Granularity::Pairs => 2,
            Granularity::Triples => 3,
        }
    }

    pub fn policy(self) -> NGramPolicy {
        NGramPolicy::new(self.order())
    }
}

/// Sliding-window n-gram reduction.
///
/// A non-empty trace shorter than `n` yields a single gram holding the whole trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NGramPolicy {
    n: usize,
}

impl NGramPolicy {
    pub fn new(n: usize) -> Self {
        Self { n: n.max(1) }
    }

    pub fn order(&self) -> usize {
        self.n
    }
}

impl Default for NGramPolicy {
    fn default() -> Self {
        Granularity::default().policy()
    }
}

impl CoveragePolicy for NGramPolicy {
    fn name(&self) -> &'static str {
        match self.n {
            1 => "location-set",
            2 => "adjacent-pair",
            3 => "adjacent-triple",
            _ => "n-gram",
        }
    }

    fn reduce(&self, events: &[Location]) -> Fingerprint {
        if events.is_empty() {
            return Fingerprint::empty();
        }
        if events.len() < self.n {
            return Fingerprint::from_grams(std::iter::once(events.to_vec()));
        }
        Fingerprint::from_grams(events.windows(self.n).map(<[Location]>::to_vec))
    }
}

/// Owns the trace buffer and the reduction policy for a runner.
pub struct CoverageTracker {
    trace: Trace,
    policy: Box<dyn CoveragePolicy>,
}

impl CoverageTracker {
    pub fn new(policy: Box<dyn CoveragePolicy>) -> Self {
        Self {
            trace: Trace::default(),
            policy,
        }
    }

    pub fn with_limits(mut self, limits: TraceLimits) -> Self {
        self.trace.limits = limits;
        self
    }

    pub fn limits(&self) -> TraceLimits {
        self.trace.limits
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Starts capturing a new execution, discarding the previous trace.
    pub fn begin(&mut self) -> TraceSession<'_> {
        self.trace.events.clear();
        self.trace.active = true;
        self.trace.finished_in = None;
        self.trace.started_at = self.trace.limits.timeout.map(|_| Instant::now());
        TraceSession {
            trace: &mut self.trace,
        }
    }

    /// Events of the last execution, up to where it completed or failed.
    pub fn events(&self) -> &[Location] {
        self.trace.events()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.policy.reduce(self.trace.events())
    }

    /// The configured timeout, if the last finished execution ran past it.
    ///
    /// Covers targets that overrun after their last trace point, where
    /// [`Trace::hit`] never got the chance to abort.
    pub fn timed_out(&self) -> Option<Duration> {
        let limit = self.trace.limits.timeout?;
        let elapsed = self.trace.finished_in?;
        (elapsed > limit).then_some(limit)
    }
}

impl Default for CoverageTracker {
    fn default() -> Self {
        Self::new(Box::new(NGramPolicy::default()))
    }
}

impl fmt::Debug for CoverageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageTracker")
            .field("policy", &self.policy.name())
            .field("limits", &self.trace.limits)
            .field("events", &self.trace.events.len())
            .finish()
    }
}
