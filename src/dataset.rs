use std::fmt::Display;

use serde::Deserialize;

use crate::signal::FetchTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Grid,
    Wind,
    Solar,
    ZoneHistory,
    ClientVersion,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dataset::Grid => write!(f, "grid"),
            Dataset::Wind => write!(f, "wind"),
            Dataset::Solar => write!(f, "solar"),
            Dataset::ZoneHistory => write!(f, "zone-history"),
            Dataset::ClientVersion => write!(f, "client-version"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Timescale {
    #[default]
    Hourly,
    Daily,
    Monthly,
    Yearly,
}

impl Display for Timescale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timescale::Hourly => write!(f, "hourly"),
            Timescale::Daily => write!(f, "daily"),
            Timescale::Monthly => write!(f, "monthly"),
            Timescale::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub dataset: Dataset,
    pub zone: Option<String>,
    pub timescale: Option<Timescale>,
    pub time: FetchTime,
}

impl FetchRequest {
    pub fn new(dataset: Dataset, time: FetchTime) -> Self {
        Self {
            dataset,
            zone: None,
            timescale: None,
            time,
        }
    }

    pub fn with_zone<Z: Into<String>>(mut self, zone: Z) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_timescale(mut self, timescale: Timescale) -> Self {
        self.timescale = Some(timescale);
        self
    }
}

impl Display for FetchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dataset)?;
        if let Some(zone) = &self.zone {
            write!(f, " zone={}", zone)?;
        }
        if let Some(timescale) = &self.timescale {
            write!(f, " timescale={}", timescale)?;
        }
        write!(f, " at={}", self.time)
    }
}

/// An intent submitted to the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FetchRequested(FetchRequest),
    /// Previously fetched data for the dataset is no longer valid.
    Invalidated(Dataset),
}

impl Action {
    pub fn dataset(&self) -> Dataset {
        match self {
            Action::FetchRequested(request) => request.dataset,
            Action::Invalidated(dataset) => *dataset,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::FetchRequested(request) => write!(f, "fetch requested: {}", request),
            Action::Invalidated(dataset) => write!(f, "invalidated: {}", dataset),
        }
    }
}
