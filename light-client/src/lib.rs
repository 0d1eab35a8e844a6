//! # TendermintX
//!
//! Light client for a Tendermint chain that stores only header hashes and advances its
//! latest trusted header when a proof gateway delivers a verified proof.
//!
//! Every advance is a two-phase exchange. A request (`request_step`, `request_skip`,
//! `request_freeze`) submits the packed proof input to the gateway together with a
//! [`Callback`] capturing the trusted height it was anchored at. The gateway later invokes
//! the matching fulfillment (`step`, `skip`, `freeze`), which re-validates that context
//! against the current state, reads the verified output and applies it.
//!
//! - **Step** proves the block right after the latest height.
//! - **Skip** proves a block up to [`SKIP_MAX`] heights ahead, backed by at least 1/3 of
//!   the trusted validator set's voting power.
//! - **Freeze** reuses the skip proof to show that a recorded header differs from the one
//!   a validator quorum actually signed, and permanently sets `frozen`.
//!
//! [`TendermintX`] is the synchronous state machine; [`LightClientService`] wraps it in a
//! single-writer task for concurrent callers.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod service;

pub use client::TendermintX;
pub use config::{LightClientConfig, DEFAULT_CALLBACK_GAS_LIMIT};
pub use error::{LightClientError, Result};
pub use events::LightClientEvent;
pub use gateway::{
    Callback, FunctionId, GatewayError, InMemoryGateway, ProofGateway, ProofRequest,
};
pub use ledger::{HeaderLedger, LedgerSnapshot};
pub use service::{Fulfillment, LightClientHandle, LightClientService, LightClientStatus, Request};
pub use tendermintx_primitives::{FREEZE_GAP_MAX, SKIP_MAX};
