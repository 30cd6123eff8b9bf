use clap::Parser;
use tracing::info;

#[macro_use]
mod macros;

mod checks;
mod clock;
mod config;
mod dataset;
mod dispatch;
mod poller;
mod policy;
mod session;
mod signal;
mod telemetry;

pub use config::Config;
pub use dataset::{Action, Dataset, Timescale};
pub use poller::{Activation, ActivationHandle, Poller};
pub use policy::PollMode;
pub use session::Session;
pub use signal::{FetchSignal, FetchTime, FetchTrigger};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    telemetry::setup()?;

    let config = config::load_config(&args.config).await?;
    info!(
        version = version!("v"),
        zone = config.zone.as_deref().unwrap_or("-"),
        interval_ms = config.interval.as_millis() as u64,
        "Starting feed poller..."
    );

    let (dispatcher, actions) = dispatch::channel();
    let store = tokio::spawn(dispatch::log_actions(actions));

    let mut session = Session::new(dispatcher);
    let result = session
        .run(&args.config, config, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", err);
            }
        })
        .await;

    drop(session);
    dispatch::join_store(store).await;

    telemetry::shutdown();

    result
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// The path to the configuration file which describes the feeds to poll.
    #[clap(short, long, value_parser)]
    config: String,
}
