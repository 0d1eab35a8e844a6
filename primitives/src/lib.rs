use std::time::Duration;

use tendermint_light_client_verifier::{
    options::Options,
    types::{LightBlock, TrustThreshold},
    ProdVerifier, Verdict, Verifier,
};

pub mod types;

pub use alloy_primitives::{Bytes, B256, U256};

/// Nominal block time of the tracked chain, used to size the skip window.
pub const BLOCK_TIME_SECS: u64 = 12;

/// Maximum number of heights a single skip may advance the light client by.
///
/// Two weeks of blocks at `BLOCK_TIME_SECS`, which keeps every skip inside the trusting
/// period of a chain with a 21 day unbonding period.
pub const SKIP_MAX: u64 = 100_800;

/// How far behind the latest height the trusted block of a freeze proof may be.
pub const FREEZE_GAP_MAX: u64 = SKIP_MAX / 2;

/// Trusting period handed to the Tendermint verifier.
pub const TRUSTING_PERIOD: Duration = Duration::from_secs(SKIP_MAX * BLOCK_TIME_SECS);

/// Get the verdict for the header update from trusted_block to target_block.
///
/// Adjacent blocks are checked through the trusted block's next validator set; any larger
/// gap requires at least 1/3 of the trusted voting power to have signed the target.
pub fn get_header_update_verdict(trusted_block: &LightBlock, target_block: &LightBlock) -> Verdict {
    let opt = Options {
        trust_threshold: TrustThreshold::ONE_THIRD,
        trusting_period: TRUSTING_PERIOD,
        clock_drift: Default::default(),
    };

    let vp = ProdVerifier::default();
    // Note: Verification happens at the target block's own time, so no header is rejected
    // for being too old. The skip window bound is what keeps the trusted block inside the
    // trusting period.
    let verify_time = target_block.time();
    vp.verify_update_header(
        target_block.as_untrusted_state(),
        trusted_block.as_trusted_state(),
        &opt,
        verify_time,
    )
}
