//! Prints the genesis parameters for the operator.
//!
//!     `cargo run --release --bin genesis -- --block 1000`
//!
//! Without `--block`, the latest block is used.

use clap::Parser;
use tendermintx_script::util::*;
use tendermintx_script::TendermintRPCClient;
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(about = "Get the genesis parameters from a block.")]
pub struct GenesisArgs {
    #[arg(long)]
    pub block: Option<u64>,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tendermintx_script::setup_logger();

    let data_fetcher = TendermintRPCClient::from_env()?;
    let args = GenesisArgs::parse();

    let block = match args.block {
        Some(block) => block,
        None => get_latest_block_height(&data_fetcher).await?,
    };
    let header_hash = fetch_header_hash(&data_fetcher, block).await?;

    info!(
        "\nGENESIS_HEIGHT={}\nGENESIS_HEADER={:?}\n",
        block, header_hash
    );
    Ok(())
}
