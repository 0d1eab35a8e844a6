use crate::types::*;

use anyhow::Context;
use reqwest::Client;
use subtle_encoding::hex;
use tendermint::validator::Info;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::util::retry;

#[derive(Debug, Clone)]
pub struct TendermintRPCClient {
    url: String,
    client: Arc<Client>,
}

/// The default timeout for Tendermint RPC requests in seconds.
pub const DEFAULT_TENDERMINT_RPC_TIMEOUT_SECS: u64 = 20;

/// The default concurrency for Tendermint RPC requests.
pub const DEFAULT_TENDERMINT_RPC_CONCURRENCY: usize = 20;

/// The default sleep duration for Tendermint RPC requests in milliseconds.
pub const DEFAULT_TENDERMINT_RPC_SLEEP_MS: Duration = Duration::from_millis(500);

/// The maximum number of failures allowed when retrying a Tendermint RPC request.
pub const DEFAULT_FAILURES_ALLOWED: u32 = 20;

impl TendermintRPCClient {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TENDERMINT_RPC_TIMEOUT_SECS))
            .build()
            .context("Failed to build Tendermint RPC client")?;
        Ok(TendermintRPCClient {
            url: url.trim_end_matches('/').to_string(),
            client: Arc::new(client),
        })
    }

    /// Create a client for the `TENDERMINT_RPC_URL` environment variable.
    pub fn from_env() -> anyhow::Result<Self> {
        let url = env::var("TENDERMINT_RPC_URL").context("TENDERMINT_RPC_URL not set")?;
        Self::new(url)
    }

    /// Fetches the peer ID from the Tendermint node.
    pub async fn fetch_peer_id(&self) -> anyhow::Result<[u8; 20]> {
        pub async fn inner(client: &TendermintRPCClient) -> anyhow::Result<[u8; 20]> {
            let fetch_peer_id_url = format!("{}/status", client.url);

            let response: PeerIdResponse = client
                .client
                .get(fetch_peer_id_url)
                .send()
                .await
                .context("Failed to fetch peer ID")?
                .json::<PeerIdResponse>()
                .await
                .context("Failed to parse peer ID response")?;

            hex::decode(response.result.node_info.id)
                .map_err(|e| anyhow::anyhow!("Peer ID is not valid hex: {:?}", e))?
                .try_into()
                .map_err(|id: Vec<u8>| anyhow::anyhow!("Peer ID has {} bytes, expected 20", id.len()))
        }

        retry(
            || inner(self),
            DEFAULT_FAILURES_ALLOWED,
            DEFAULT_TENDERMINT_RPC_SLEEP_MS,
        )
        .await
    }

    /// Fetches the latest commit from the Tendermint node.
    pub async fn fetch_latest_commit(&self) -> anyhow::Result<CommitResponse> {
        pub async fn inner(client: &TendermintRPCClient) -> anyhow::Result<CommitResponse> {
            let url = format!("{}/commit", client.url);

            client
                .client
                .get(url)
                .send()
                .await
                .context("Failed to call latest commit endpoint")?
                .json::<CommitResponse>()
                .await
                .context("Failed to parse latest commit response")
        }

        retry(
            || inner(self),
            DEFAULT_FAILURES_ALLOWED,
            DEFAULT_TENDERMINT_RPC_SLEEP_MS,
        )
        .await
    }

    /// Fetches a commit for a specific block height.
    pub async fn fetch_commit(&self, block_height: u64) -> anyhow::Result<CommitResponse> {
        pub async fn inner(
            client: &TendermintRPCClient,
            block_height: u64,
        ) -> anyhow::Result<CommitResponse> {
            let url = format!("{}/commit", client.url);

            client
                .client
                .get(url)
                .query(&[("height", block_height.to_string().as_str())])
                .send()
                .await
                .context("Failed to fetch commit")?
                .json::<CommitResponse>()
                .await
                .context("Failed to parse commit response")
        }

        retry(
            || inner(self, block_height),
            DEFAULT_FAILURES_ALLOWED,
            DEFAULT_TENDERMINT_RPC_SLEEP_MS,
        )
        .await
    }

    /// Fetches one page of validators for a specific block height.
    pub async fn fetch_validators_page(
        &self,
        block_height: u64,
        page: u32,
    ) -> anyhow::Result<ValidatorSetResponse> {
        pub async fn inner(
            client: &TendermintRPCClient,
            block_height: u64,
            page: u32,
        ) -> anyhow::Result<ValidatorSetResponse> {
            let url = format!("{}/validators", client.url);

            client
                .client
                .get(url)
                .query(&[
                    ("height", block_height.to_string().as_str()),
                    ("per_page", "100"),
                    ("page", page.to_string().as_str()),
                ])
                .send()
                .await
                .context("Failed to fetch validators")?
                .json::<ValidatorSetResponse>()
                .await
                .context("Failed to parse validators response")
        }

        retry(
            || inner(self, block_height, page),
            DEFAULT_FAILURES_ALLOWED,
            DEFAULT_TENDERMINT_RPC_SLEEP_MS,
        )
        .await
    }

    /// Fetches validators for a specific block height, following pagination.
    pub async fn fetch_validators(&self, block_height: u64) -> anyhow::Result<Vec<Info>> {
        let mut validators = vec![];
        let mut collected_validators = 0;
        let mut page_index = 1;
        loop {
            let response = self.fetch_validators_page(block_height, page_index).await?;

            let block_validator_set: BlockValidatorSet = response.result;
            let count = block_validator_set
                .count
                .parse::<usize>()
                .context("Invalid validator count")?;
            let total = block_validator_set
                .total
                .parse::<usize>()
                .context("Invalid validator total")?;

            validators.extend(block_validator_set.validators);
            collected_validators += count;

            if count == 0 || collected_validators >= total {
                break;
            }
            page_index += 1;
        }

        Ok(validators)
    }
}
