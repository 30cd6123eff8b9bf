use std::fmt::Display;

use chrono::{DateTime, Utc};

/// The point in time a fetch is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTime {
    /// The latest data, observed at the given instant.
    Live(DateTime<Utc>),
    /// A fixed historical point chosen by the user.
    Pinned(DateTime<Utc>),
}

impl FetchTime {
    pub fn is_live(&self) -> bool {
        matches!(self, FetchTime::Live(_))
    }
}

impl Display for FetchTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTime::Live(_) => write!(f, "live"),
            FetchTime::Pinned(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSignal {
    /// Invalidate whatever was previously fetched for the feed.
    Clear,
    Fetch(FetchTime),
}

impl Display for FetchSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchSignal::Clear => write!(f, "clear"),
            FetchSignal::Fetch(time) => write!(f, "fetch({})", time),
        }
    }
}

/// Issues a single fetch request when fired.
///
/// Triggers are fire-and-forget: the poller neither waits for nor inspects
/// the outcome, so any failure handling lives inside the implementation.
pub trait FetchTrigger: Send + Sync {
    fn fire(&self, signal: FetchSignal);
}

impl<F> FetchTrigger for F
where
    F: Fn(FetchSignal) + Send + Sync,
{
    fn fire(&self, signal: FetchSignal) {
        self(signal)
    }
}
