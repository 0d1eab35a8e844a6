//! The proof gateway seam.
//!
//! A request is handed to the gateway together with the [`Callback`] that must be invoked
//! once a proof for it has been verified. While that fulfillment runs, the light client
//! reads the verified output back through [`ProofGateway::verified_call`].

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tendermintx_primitives::{Bytes, B256, U256};
use thiserror::Error;

/// Identifier of the circuit the gateway should run.
pub type FunctionId = B256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("No verified proof for function {function_id} and the given input")]
    ProofNotVerified { function_id: FunctionId },

    #[error("Gateway rejected request: {0}")]
    RequestRejected(String),
}

/// Parameters captured at request time and handed back on fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callback {
    Step {
        trusted_height: u64,
    },
    Skip {
        trusted_height: u64,
        target_height: u64,
    },
    Freeze {
        trusted_height: u64,
        conflict_height: u64,
    },
}

/// An asynchronous proof request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub function_id: FunctionId,
    /// Packed proof input, see [`tendermintx_primitives::types`].
    pub input: Bytes,
    pub callback: Callback,
    pub gas_limit: u64,
    /// Fee attached by the requester, forwarded as is.
    pub value: U256,
}

pub trait ProofGateway: Send + Sync {
    /// Submit a request. Fire-and-forget: the fulfillment, if any, arrives later through
    /// the light client's callback entry point.
    fn request_call(&self, request: ProofRequest) -> Result<(), GatewayError>;

    /// Output of the verified proof for exactly this function and input.
    fn verified_call(&self, function_id: FunctionId, input: &[u8]) -> Result<Bytes, GatewayError>;
}

/// Gateway that records submitted requests and serves outputs registered with
/// [`InMemoryGateway::set_verified`].
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    requests: Mutex<Vec<ProofRequest>>,
    verified: Mutex<HashMap<(FunctionId, Bytes), Bytes>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verified(
        &self,
        function_id: FunctionId,
        input: impl Into<Bytes>,
        output: impl Into<Bytes>,
    ) {
        self.verified
            .lock()
            .insert((function_id, input.into()), output.into());
    }

    /// Requests submitted so far, oldest first.
    pub fn requests(&self) -> Vec<ProofRequest> {
        self.requests.lock().clone()
    }

    pub fn take_requests(&self) -> Vec<ProofRequest> {
        std::mem::take(&mut *self.requests.lock())
    }
}

impl ProofGateway for InMemoryGateway {
    fn request_call(&self, request: ProofRequest) -> Result<(), GatewayError> {
        self.requests.lock().push(request);
        Ok(())
    }

    fn verified_call(&self, function_id: FunctionId, input: &[u8]) -> Result<Bytes, GatewayError> {
        self.verified
            .lock()
            .get(&(function_id, Bytes::copy_from_slice(input)))
            .cloned()
            .ok_or(GatewayError::ProofNotVerified { function_id })
    }
}
