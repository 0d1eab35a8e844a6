use serde::{Deserialize, Serialize};
use tendermintx_primitives::B256;

/// Observable outcome of an accepted request or fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightClientEvent {
    StepRequested {
        trusted_height: u64,
        trusted_header: B256,
    },
    SkipRequested {
        trusted_height: u64,
        trusted_header: B256,
        target_height: u64,
    },
    FreezeRequested {
        trusted_height: u64,
        trusted_header: B256,
        conflict_height: u64,
    },
    HeadUpdate {
        height: u64,
        header: B256,
    },
    Freeze {
        conflict_height: u64,
        stored_header: B256,
        proven_header: B256,
    },
}
