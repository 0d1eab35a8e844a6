use std::collections::HashSet;
use std::ops::RangeInclusive;

use anyhow::Context;
use tendermint::account;
use tendermint::block::{Commit, Header};
use tendermint::node::Id;
use tendermint::validator::Set;
use tendermint_light_client_verifier::types::LightBlock;
use tendermintx_primitives::{B256, FREEZE_GAP_MAX, SKIP_MAX};

use crate::tendermint::TendermintRPCClient;

mod retry;
pub use retry::retry;

/// Header hash of `header` as a `B256`.
pub fn header_hash(header: &Header) -> anyhow::Result<B256> {
    let hash = header.hash();
    B256::try_from(hash.as_bytes()).context("Header hash is not 32 bytes")
}

/// Retrieves the latest block height from the Tendermint node.
pub async fn get_latest_block_height(client: &TendermintRPCClient) -> anyhow::Result<u64> {
    let latest_commit = client.fetch_latest_commit().await?;
    Ok(latest_commit.result.signed_header.header.height.value())
}

/// Fetches a header hash for a specific block height.
pub async fn fetch_header_hash(
    client: &TendermintRPCClient,
    block_height: u64,
) -> anyhow::Result<B256> {
    let commit = client
        .fetch_commit(block_height)
        .await
        .with_context(|| format!("Failed to fetch commit at height {}", block_height))?;
    header_hash(&commit.result.signed_header.header)
}

/// Fetches a light block for a specific block height and peer ID.
pub async fn fetch_light_block(
    client: &TendermintRPCClient,
    block_height: u64,
    peer_id: [u8; 20],
) -> anyhow::Result<LightBlock> {
    let commit_response = client.fetch_commit(block_height).await?;
    let signed_header = commit_response.result.signed_header;

    let validators = Set::new(client.fetch_validators(block_height).await?, None);
    let next_validators = Set::new(client.fetch_validators(block_height + 1).await?, None);

    Ok(LightBlock::new(
        signed_header,
        validators,
        next_validators,
        Id::new(peer_id),
    ))
}

/// Retrieves light blocks for the trusted and target block heights.
pub async fn get_light_blocks(
    client: &TendermintRPCClient,
    trusted_block_height: u64,
    target_block_height: u64,
) -> anyhow::Result<(LightBlock, LightBlock)> {
    let peer_id = client.fetch_peer_id().await?;

    let trusted_light_block = fetch_light_block(client, trusted_block_height, peer_id)
        .await
        .context("Failed to fetch trusted light block")?;

    let target_light_block = fetch_light_block(client, target_block_height, peer_id)
        .await
        .context("Failed to fetch target light block")?;

    Ok((trusted_light_block, target_light_block))
}

/// Highest height the next request may target from `current_height`: the stable chain
/// head, capped by `SKIP_MAX`. `None` when the light client is caught up.
pub fn max_target_height(current_height: u64, latest_stable_height: u64) -> Option<u64> {
    let max_block = latest_stable_height.min(current_height.saturating_add(SKIP_MAX));
    (max_block > current_height).then_some(max_block)
}

/// Heights the fork watch still has to compare against the node, and the height a freeze
/// can be anchored at. `last_verified` is the highest recorded height already confirmed to
/// match the node; it is only reused while it is inside the freeze window.
pub fn fork_watch_range(
    latest_height: u64,
    last_verified: Option<u64>,
) -> (RangeInclusive<u64>, Option<u64>) {
    let window_start = latest_height.saturating_sub(FREEZE_GAP_MAX - 1);
    match last_verified.filter(|verified| (window_start..=latest_height).contains(verified)) {
        Some(verified) => (verified.saturating_add(1)..=latest_height, Some(verified)),
        None => (window_start..=latest_height, None),
    }
}

/// Whether `shared_voting_power` is more than 1/3 of `total_voting_power`, the threshold
/// the skip verifier enforces.
pub fn exceeds_one_third(shared_voting_power: u64, total_voting_power: u64) -> bool {
    shared_voting_power as u128 * 3 > total_voting_power as u128
}

/// Determines if a valid skip is possible from the start validator set to a target block:
/// the start validators that signed the target commit must hold more than 1/3 of the start
/// set's voting power.
pub fn is_valid_skip(start_validator_set: &Set, target_block_commit: &Commit) -> bool {
    let signers: HashSet<account::Id> = target_block_commit
        .signatures
        .iter()
        .filter_map(|sig| sig.validator_address())
        .collect();

    let shared_voting_power: u64 = start_validator_set
        .validators()
        .iter()
        .filter(|validator| signers.contains(&validator.address))
        .map(|validator| validator.power.value())
        .sum();

    exceeds_one_third(
        shared_voting_power,
        start_validator_set.total_voting_power().value(),
    )
}

/// Search to find the greatest block number to request, bisecting down from
/// `max_end_block` until a valid skip from `start_block` is found.
pub async fn find_block_to_request(
    client: &TendermintRPCClient,
    start_block: u64,
    max_end_block: u64,
) -> anyhow::Result<u64> {
    let start_validator_set = Set::new(client.fetch_validators(start_block).await?, None);

    let mut curr_end_block = max_end_block;
    loop {
        if curr_end_block - start_block <= 1 {
            return Ok(start_block + 1);
        }
        let target_block_commit = client.fetch_commit(curr_end_block).await?;
        if is_valid_skip(
            &start_validator_set,
            &target_block_commit.result.signed_header.commit,
        ) {
            return Ok(curr_end_block);
        }
        curr_end_block = start_block + (curr_end_block - start_block) / 2;
    }
}
