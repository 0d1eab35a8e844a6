//! Keeps a TendermintX light client in sync with a Tendermint chain.
//!
//! Example:
//! ```
//! RUST_LOG=info cargo run --bin operator --release -- --genesis-height=1000 --state-path=state.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures::{stream, StreamExt, TryStreamExt};
use tendermintx::{
    LedgerSnapshot, LightClientConfig, LightClientEvent, LightClientHandle, LightClientService,
    TendermintX,
};
use tendermintx_primitives::{B256, U256};
use tendermintx_script::tendermint::DEFAULT_TENDERMINT_RPC_CONCURRENCY;
use tendermintx_script::util::{
    fetch_header_hash, find_block_to_request, fork_watch_range, get_latest_block_height,
    max_target_height,
};
use tendermintx_script::{TendermintGateway, TendermintRPCClient};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(about = "Keep a TendermintX light client in sync with a Tendermint chain.")]
struct OperatorArgs {
    /// Tendermint RPC endpoint.
    #[arg(long, env = "TENDERMINT_RPC_URL")]
    tendermint_rpc_url: String,

    /// Genesis height, used when there is no persisted state yet.
    #[arg(long, env = "GENESIS_HEIGHT")]
    genesis_height: Option<u64>,

    /// Genesis header hash. Fetched from the RPC node when omitted.
    #[arg(long, env = "GENESIS_HEADER")]
    genesis_header: Option<B256>,

    #[arg(long, env = "STEP_FUNCTION_ID")]
    step_function_id: Option<B256>,

    #[arg(long, env = "SKIP_FUNCTION_ID")]
    skip_function_id: Option<B256>,

    /// Reject every transition once the light client is frozen.
    #[arg(long, env = "HALT_WHEN_FROZEN")]
    halt_when_frozen: bool,

    #[arg(long, env = "LOOP_DELAY_MINS", default_value_t = 5)]
    loop_delay_mins: u64,

    /// How long to wait for a requested proof to be fulfilled.
    #[arg(long, env = "PROOF_TIMEOUT_MINS", default_value_t = 30)]
    proof_timeout_mins: u64,

    /// JSON file the light client state is persisted to and restored from.
    #[arg(long, env = "STATE_PATH")]
    state_path: Option<PathBuf>,
}

async fn load_snapshot(path: &Path) -> anyhow::Result<Option<LedgerSnapshot>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(snapshot))
}

async fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Persist the ledger on startup and after every head update or freeze.
async fn persist_snapshots(client: LightClientHandle, path: PathBuf) {
    let mut events = client.subscribe();
    let mut dirty = true;
    loop {
        if dirty {
            match client.snapshot().await {
                Ok(snapshot) => {
                    if let Err(e) = save_snapshot(&path, &snapshot).await {
                        error!("Failed to persist light client state: {:#}", e);
                    }
                }
                Err(_) => return,
            }
        }

        dirty = match events.recv().await {
            Ok(LightClientEvent::HeadUpdate { .. }) | Ok(LightClientEvent::Freeze { .. }) => true,
            Ok(_) => false,
            Err(RecvError::Lagged(_)) => true,
            Err(RecvError::Closed) => return,
        };
    }
}

/// Wait until the head reaches `target_height` or the client freezes.
async fn wait_for_head(events: &mut broadcast::Receiver<LightClientEvent>, target_height: u64) -> bool {
    loop {
        match events.recv().await {
            Ok(LightClientEvent::HeadUpdate { height, .. }) if height >= target_height => {
                return true
            }
            Ok(LightClientEvent::Freeze { .. }) => return true,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return false,
        }
    }
}

struct TendermintXOperator {
    rpc: TendermintRPCClient,
    client: LightClientHandle,
    proof_timeout: Duration,
    /// Highest recorded height already confirmed against the RPC node.
    last_verified: Option<u64>,
}

impl TendermintXOperator {
    /// Request a step or skip to `target_block` and wait for it to land.
    async fn request_update(&self, current_block: u64, target_block: u64) -> anyhow::Result<()> {
        let mut events = self.client.subscribe();

        if target_block == current_block + 1 {
            info!("Attempting to step to block {}", target_block);
            self.client.request_step(U256::ZERO).await?;
        } else {
            info!("Attempting to skip to block {}", target_block);
            self.client.request_skip(target_block, U256::ZERO).await?;
        }

        match tokio::time::timeout(self.proof_timeout, wait_for_head(&mut events, target_block)).await
        {
            Ok(true) => {}
            Ok(false) => warn!("Light client stopped while waiting for block {}", target_block),
            Err(_) => warn!("Timed out waiting for block {} to be proven", target_block),
        }
        Ok(())
    }

    /// Compare the headers recorded since the last check, within the freeze window,
    /// against the RPC node and request a freeze for the first mismatch.
    async fn check_for_fork(&mut self) -> anyhow::Result<()> {
        let snapshot = self.client.snapshot().await?;
        let ledger = &snapshot.ledger;

        let (range, mut anchor) = fork_watch_range(ledger.latest_height(), self.last_verified);
        let recorded: Vec<(u64, B256)> = ledger.headers_in(range).collect();

        let actual: Vec<B256> = stream::iter(
            recorded
                .iter()
                .map(|(height, _)| fetch_header_hash(&self.rpc, *height)),
        )
        .buffered(DEFAULT_TENDERMINT_RPC_CONCURRENCY)
        .try_collect()
        .await?;

        for ((height, stored), actual) in recorded.into_iter().zip(actual) {
            if stored == actual {
                anchor = Some(height);
                continue;
            }

            warn!(
                "Header mismatch at height {}: recorded {:?}, node reports {:?}",
                height, stored, actual
            );
            match anchor {
                Some(trusted_height) => {
                    self.client
                        .request_freeze(trusted_height, height, U256::ZERO)
                        .await?;
                }
                None => warn!(
                    "No matching header below height {} within the freeze window",
                    height
                ),
            }
            break;
        }

        self.last_verified = anchor;
        Ok(())
    }

    async fn sync_once(&self) -> anyhow::Result<()> {
        let current_block = self.client.latest_height().await?;

        // Subtract 1 block to ensure the block is stable.
        let latest_stable_block = get_latest_block_height(&self.rpc).await?.saturating_sub(1);

        match max_target_height(current_block, latest_stable_block) {
            Some(max_end_block) => {
                info!("Current block: {}", current_block);
                let target_block =
                    find_block_to_request(&self.rpc, current_block, max_end_block).await?;
                self.request_update(current_block, target_block).await
            }
            None => {
                info!(
                    "Light client at block {} is caught up with the chain. Sleeping.",
                    current_block
                );
                Ok(())
            }
        }
    }

    async fn run(&mut self, loop_delay_mins: u64) -> anyhow::Result<()> {
        info!("Starting TendermintX operator");

        loop {
            if self.client.status().await?.frozen {
                error!("Light client is frozen; its headers can no longer be trusted. Stopping.");
                return Ok(());
            }

            if let Err(e) = self.check_for_fork().await {
                warn!("Fork check failed: {:#}", e);
            }

            if let Err(e) = self.sync_once().await {
                error!("Header update failed: {:#}", e);
            }

            tokio::time::sleep(Duration::from_secs(60 * loop_delay_mins)).await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tendermintx_script::setup_logger();

    let args = OperatorArgs::parse();
    let rpc = TendermintRPCClient::new(args.tendermint_rpc_url.clone())?;

    let config = LightClientConfig {
        step_function_id: args.step_function_id.unwrap_or_default(),
        skip_function_id: args.skip_function_id.unwrap_or_default(),
        halt_when_frozen: args.halt_when_frozen,
        ..Default::default()
    };
    let (gateway, prover) = TendermintGateway::new(rpc.clone());

    let snapshot = match &args.state_path {
        Some(path) => load_snapshot(path).await?,
        None => None,
    };
    let light_client = match snapshot {
        Some(snapshot) => {
            info!(
                "Restored light client at height {}",
                snapshot.ledger.latest_height()
            );
            TendermintX::from_snapshot(gateway, config, snapshot)
        }
        None => {
            let genesis_height = args
                .genesis_height
                .context("GENESIS_HEIGHT is required when there is no persisted state")?;
            let genesis_header = match args.genesis_header {
                Some(header) => header,
                None => fetch_header_hash(&rpc, genesis_height).await?,
            };
            let mut light_client = TendermintX::new(gateway, config);
            light_client.set_genesis_header(genesis_height, genesis_header);
            light_client
        }
    };

    let (client, _service) = LightClientService::spawn(light_client);
    tokio::spawn(prover.run(client.clone()));
    if let Some(path) = args.state_path.clone() {
        tokio::spawn(persist_snapshots(client.clone(), path));
    }

    let mut operator = TendermintXOperator {
        rpc,
        client,
        proof_timeout: Duration::from_secs(60 * args.proof_timeout_mins),
        last_verified: None,
    };
    operator.run(args.loop_delay_mins).await
}
