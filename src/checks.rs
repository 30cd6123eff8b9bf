use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::{
    clock::Clock,
    dataset::{Action, Dataset, FetchRequest, Timescale},
    dispatch::Dispatcher,
    signal::FetchTime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCheck {
    Requested,
    AlreadyLoaded,
    NoZone,
    /// History cannot be combined with a pinned point in time.
    PinnedTime,
}

/// Requests the history of `zone` unless it is already loaded.
pub fn request_zone_history(
    zone: Option<&str>,
    timescale: Timescale,
    pinned: Option<DateTime<Utc>>,
    loaded: bool,
    clock: &dyn Clock,
    dispatcher: &Dispatcher,
) -> HistoryCheck {
    if let Some(pinned) = pinned {
        error!(%pinned, "Can't fetch zone history when a custom datetime is provided.");
        return HistoryCheck::PinnedTime;
    }

    let Some(zone) = zone else {
        return HistoryCheck::NoZone;
    };

    if loaded {
        debug!(zone, %timescale, "Zone history is already loaded.");
        return HistoryCheck::AlreadyLoaded;
    }

    dispatcher.dispatch(Action::FetchRequested(
        FetchRequest::new(Dataset::ZoneHistory, FetchTime::Live(clock.now()))
            .with_zone(zone)
            .with_timescale(timescale),
    ));
    HistoryCheck::Requested
}
