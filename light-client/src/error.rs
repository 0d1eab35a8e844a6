use tendermintx_primitives::types::CodecError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that abort a light client transition. None of them leave partial state behind.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LightClientError {
    #[error("No header recorded at height {height}")]
    UnknownTrustedHeader { height: u64 },

    #[error("Height {height} is out of range for latest height {latest}")]
    TargetOutOfRange { height: u64, latest: u64 },

    #[error("Proven header at height {height} matches the stored header")]
    InvalidConflictBlock { height: u64 },

    #[error("Light client is frozen")]
    Frozen,

    #[error("Proof gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Malformed proof output: {0}")]
    MalformedOutput(#[from] CodecError),

    #[error("Light client service has stopped")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, LightClientError>;
