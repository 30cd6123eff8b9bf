use std::{
    collections::HashSet,
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::{
    checks::{request_zone_history, HistoryCheck},
    clock::{Clock, SystemClock},
    config::Config,
    dataset::{Dataset, Timescale},
    dispatch::{DispatchTrigger, Dispatcher},
    poller::{Activation, Poller},
    policy::PollMode,
};

/// The inputs a feed is reactivated on whenever any of them changes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedDeps {
    activation: Activation,
    timescale: Option<Timescale>,
}

struct Feed {
    dataset: Dataset,
    poller: Poller,
    deps: Option<FeedDeps>,
}

impl Feed {
    fn new(dataset: Dataset, mode: PollMode, clock: Arc<dyn Clock>) -> Self {
        Self {
            dataset,
            poller: Poller::new(dataset.to_string(), mode).with_clock(clock),
            deps: None,
        }
    }

    /// Reactivates the feed if `deps` differ from the current activation's.
    fn sync(&mut self, deps: FeedDeps, dispatcher: &Dispatcher) -> bool {
        if self.deps.as_ref() == Some(&deps) {
            return false;
        }

        let mut trigger = DispatchTrigger::new(self.dataset, dispatcher.clone());
        if let Some(timescale) = deps.timescale {
            trigger = trigger.with_timescale(timescale);
        }

        self.poller.activate(deps.activation, Arc::new(trigger));
        self.deps = Some(deps);
        true
    }

    fn release(&mut self) {
        self.poller.release();
        self.deps = None;
    }
}

/// Keeps every dataset feed in step with the current configuration.
pub struct Session {
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    grid: Feed,
    wind: Feed,
    solar: Feed,
    client_version: Feed,
    requested_histories: HashSet<(String, Timescale)>,
}

impl Session {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::with_clock(dispatcher, Arc::new(SystemClock))
    }

    pub fn with_clock(dispatcher: Dispatcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher,
            clock: clock.clone(),
            grid: Feed::new(Dataset::Grid, PollMode::Pinnable, clock.clone()),
            wind: Feed::new(Dataset::Wind, PollMode::Conditional, clock.clone()),
            solar: Feed::new(Dataset::Solar, PollMode::Conditional, clock.clone()),
            client_version: Feed::new(Dataset::ClientVersion, PollMode::Continuous, clock),
            requested_histories: HashSet::new(),
        }
    }

    /// Applies `config`, reactivating only the feeds whose inputs changed.
    /// Returns the datasets which were reactivated.
    #[tracing::instrument(name = "session.apply", skip(self, config))]
    pub fn apply(&mut self, config: &Config) -> Vec<Dataset> {
        let mut changed = Vec::new();
        let pinned = config.custom_datetime;

        let grid = FeedDeps {
            activation: Activation::live(config.interval).with_pinned(pinned),
            timescale: Some(config.timescale),
        };
        if self.grid.sync(grid, &self.dispatcher) {
            changed.push(Dataset::Grid);
        }

        for (feed, enabled) in [
            (&mut self.wind, config.layers.wind),
            (&mut self.solar, config.layers.solar),
        ] {
            let deps = FeedDeps {
                activation: Activation::live(config.interval)
                    .with_enabled(enabled)
                    .with_pinned(pinned),
                timescale: None,
            };
            if feed.sync(deps, &self.dispatcher) {
                changed.push(feed.dataset);
            }
        }

        if config.client.should_check_version() {
            let deps = FeedDeps {
                activation: Activation::live(config.client.version_check_interval),
                timescale: None,
            };
            if self.client_version.sync(deps, &self.dispatcher) {
                changed.push(Dataset::ClientVersion);
            }
        } else if self.client_version.poller.is_active() {
            self.client_version.release();
            changed.push(Dataset::ClientVersion);
        }

        if self.request_history(config.zone.as_deref(), config.timescale, pinned)
            == HistoryCheck::Requested
        {
            changed.push(Dataset::ZoneHistory);
        }

        debug!(?changed, "Applied configuration.");
        changed
    }

    fn request_history(
        &mut self,
        zone: Option<&str>,
        timescale: Timescale,
        pinned: Option<DateTime<Utc>>,
    ) -> HistoryCheck {
        let loaded = zone
            .map(|zone| {
                self.requested_histories
                    .contains(&(zone.to_string(), timescale))
            })
            .unwrap_or_default();

        let check = request_zone_history(
            zone,
            timescale,
            pinned,
            loaded,
            self.clock.as_ref(),
            &self.dispatcher,
        );
        if let (HistoryCheck::Requested, Some(zone)) = (check, zone) {
            self.requested_histories.insert((zone.to_string(), timescale));
        }

        check
    }

    pub fn is_polling(&self, dataset: Dataset) -> bool {
        match dataset {
            Dataset::Grid => self.grid.poller.is_polling(),
            Dataset::Wind => self.wind.poller.is_polling(),
            Dataset::Solar => self.solar.poller.is_polling(),
            Dataset::ClientVersion => self.client_version.poller.is_polling(),
            Dataset::ZoneHistory => false,
        }
    }

    /// Releases every activation. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for feed in [
            &mut self.grid,
            &mut self.wind,
            &mut self.solar,
            &mut self.client_version,
        ] {
            feed.release();
        }
        info!("All feeds released.");
    }

    /// Runs the session from the configuration at `path`, reloading it when it
    /// changes, until `shutdown` completes.
    #[tracing::instrument(name = "session.run", skip(self, path, config, shutdown), err(Debug))]
    pub async fn run<P, F>(
        &mut self,
        path: P,
        config: Config,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        P: Into<PathBuf>,
        F: Future<Output = ()>,
    {
        let path = path.into();
        let mut last_modified = SystemTime::now();
        let mut reload_interval = config.reload_interval;
        self.apply(&config);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(reload_interval) => {
                    match Config::load_if_modified_since(&path, last_modified).await {
                        Ok(Some((config, modified))) => {
                            info!(path = %path.display(), "Configuration changed, re-applying it.");
                            last_modified = modified;
                            reload_interval = config.reload_interval;
                            self.apply(&config);
                        }
                        Ok(None) => {}
                        Err(err) => error!("Failed to reload config: {}", err),
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }
}
