pub mod gateway;
pub mod tendermint;
pub mod types;
pub mod util;

pub use crate::gateway::{TendermintGateway, TendermintProver};
pub use crate::tendermint::TendermintRPCClient;

/// Install the `tracing` subscriber used by the binaries, defaulting to `info`.
pub fn setup_logger() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt::fmt().with_env_filter(filter).init();
}
