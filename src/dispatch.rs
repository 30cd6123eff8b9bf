use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    dataset::{Action, Dataset, FetchRequest, Timescale},
    signal::{FetchSignal, FetchTrigger},
};

pub type ActionReceiver = mpsc::UnboundedReceiver<Action>;

/// Creates a dispatcher along with the receiving end the store drains.
pub fn channel() -> (Dispatcher, ActionReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Dispatcher { sender }, receiver)
}

/// Submits actions to the external store without waiting on it.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: mpsc::UnboundedSender<Action>,
}

impl Dispatcher {
    pub fn dispatch(&self, action: Action) {
        if let Err(err) = self.sender.send(action) {
            warn!(action = %err.0, "The store is no longer accepting actions, dropping it.");
        }
    }
}

/// Turns fetch signals for a single dataset into store actions.
#[derive(Debug, Clone)]
pub struct DispatchTrigger {
    dataset: Dataset,
    timescale: Option<Timescale>,
    dispatcher: Dispatcher,
}

impl DispatchTrigger {
    pub fn new(dataset: Dataset, dispatcher: Dispatcher) -> Self {
        Self {
            dataset,
            timescale: None,
            dispatcher,
        }
    }

    pub fn with_timescale(mut self, timescale: Timescale) -> Self {
        self.timescale = Some(timescale);
        self
    }
}

impl FetchTrigger for DispatchTrigger {
    fn fire(&self, signal: FetchSignal) {
        let action = match signal {
            FetchSignal::Clear => Action::Invalidated(self.dataset),
            FetchSignal::Fetch(time) => Action::FetchRequested(FetchRequest {
                dataset: self.dataset,
                zone: None,
                timescale: self.timescale,
                time,
            }),
        };

        self.dispatcher.dispatch(action);
    }
}

/// Drains the action channel into the log until every dispatcher is gone.
pub async fn log_actions(mut receiver: ActionReceiver) {
    while let Some(action) = receiver.recv().await {
        info!(dataset = %action.dataset(), "{}", action);
    }
}

/// Waits for the store task to drain, logging it if the task failed.
pub async fn join_store(store: JoinHandle<()>) {
    if let Err(err) = store.await {
        error!("The action store stopped unexpectedly: {}", err);
    }
}
