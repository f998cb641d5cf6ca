//! The three-outcome build computation used throughout the evaluator.
//!
//! A build either produces a value, discovers the result is irrelevant, or
//! fails because the strategy doesn't apply. Irrelevance is a value, not an
//! error: callers propagate it, and some deliberately act on it (a store of
//! an irrelevant value still clears the tracked cell).

/// Outcome of a build computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Build<T> {
    /// The build produced a value
    Done(T),
    /// The result is known to be irrelevant; propagate without constructing
    Irrelevant,
    /// This build strategy does not apply; try an alternative
    Fail(String),
}

impl<T> Build<T> {
    pub fn fail(msg: impl Into<String>) -> Self {
        Build::Fail(msg.into())
    }

    /// Ordered alternative: keep `self` unless it failed, in which case take
    /// `alt()`'s outcome. If both fail, the first failure survives.
    pub fn or_else(self, alt: impl FnOnce() -> Build<T>) -> Build<T> {
        match self {
            Build::Fail(first) => match alt() {
                Build::Fail(_) => Build::Fail(first),
                other => other,
            },
            decided => decided,
        }
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Build::Fail(_))
    }
}

/// Unwrap a `Build<T>` inside a function returning `Build<U>`, propagating
/// `Irrelevant` and `Fail` to the caller.
macro_rules! try_build {
    ($b:expr) => {
        match $b {
            $crate::build::Build::Done(x) => x,
            $crate::build::Build::Irrelevant => return $crate::build::Build::Irrelevant,
            $crate::build::Build::Fail(e) => return $crate::build::Build::Fail(e),
        }
    };
}

pub(crate) use try_build;
