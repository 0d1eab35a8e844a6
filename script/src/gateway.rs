//! Proof gateway backed by a Tendermint RPC node.
//!
//! Submitted requests are queued for a [`TendermintProver`], which fetches the trusted and
//! target light blocks, runs the Tendermint verifier and, on success, records the target
//! header hash as the verified output before delivering the fulfillment. The output only
//! stays readable through [`ProofGateway::verified_call`] while that fulfillment runs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use tendermint_light_client_verifier::Verdict;
use tendermintx::{Callback, FunctionId, GatewayError, LightClientHandle, ProofGateway, ProofRequest};
use tendermintx_primitives::get_header_update_verdict;
use tendermintx_primitives::types::{SkipInput, StepInput};
use tendermintx_primitives::{Bytes, B256};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::tendermint::TendermintRPCClient;
use crate::util::{get_light_blocks, header_hash};

type VerifiedOutputs = Arc<Mutex<HashMap<(FunctionId, Bytes), Bytes>>>;

pub struct TendermintGateway {
    jobs: mpsc::UnboundedSender<ProofRequest>,
    verified: VerifiedOutputs,
}

impl TendermintGateway {
    /// Create the gateway and the prover that serves its queue.
    pub fn new(rpc: TendermintRPCClient) -> (Arc<Self>, TendermintProver) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let verified = VerifiedOutputs::default();

        let gateway = Arc::new(Self {
            jobs: jobs_tx,
            verified: Arc::clone(&verified),
        });
        let prover = TendermintProver {
            rpc,
            jobs: jobs_rx,
            verified,
        };
        (gateway, prover)
    }
}

impl ProofGateway for TendermintGateway {
    fn request_call(&self, request: ProofRequest) -> Result<(), GatewayError> {
        debug!("Queueing proof request {:?}", request.callback);
        self.jobs
            .send(request)
            .map_err(|_| GatewayError::RequestRejected("prover is not running".to_string()))
    }

    fn verified_call(&self, function_id: FunctionId, input: &[u8]) -> Result<Bytes, GatewayError> {
        self.verified
            .lock()
            .get(&(function_id, Bytes::copy_from_slice(input)))
            .cloned()
            .ok_or(GatewayError::ProofNotVerified { function_id })
    }
}

/// The proof statement a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofTarget {
    pub trusted_height: u64,
    pub trusted_header: B256,
    pub target_height: u64,
}

impl ProofTarget {
    /// Decode the packed input of `request` according to its callback kind.
    pub fn from_request(request: &ProofRequest) -> anyhow::Result<Self> {
        match request.callback {
            Callback::Step { .. } => {
                let input = StepInput::decode(&request.input).context("Invalid step input")?;
                let target_height = input
                    .trusted_height
                    .checked_add(1)
                    .context("Step from the maximum height")?;
                Ok(Self {
                    trusted_height: input.trusted_height,
                    trusted_header: input.trusted_header,
                    target_height,
                })
            }
            Callback::Skip { .. } | Callback::Freeze { .. } => {
                let input = SkipInput::decode(&request.input).context("Invalid skip input")?;
                Ok(Self {
                    trusted_height: input.trusted_height,
                    trusted_header: input.trusted_header,
                    target_height: input.target_height,
                })
            }
        }
    }
}

pub struct TendermintProver {
    rpc: TendermintRPCClient,
    jobs: mpsc::UnboundedReceiver<ProofRequest>,
    verified: VerifiedOutputs,
}

impl TendermintProver {
    /// Verify the header update a request asks for and return the target header hash.
    pub async fn prove(&self, request: &ProofRequest) -> anyhow::Result<B256> {
        let target = ProofTarget::from_request(request)?;
        if target.target_height <= target.trusted_height {
            bail!(
                "Target height {} is not above trusted height {}",
                target.target_height,
                target.trusted_height
            );
        }

        let (trusted_block, target_block) =
            get_light_blocks(&self.rpc, target.trusted_height, target.target_height).await?;

        let trusted_header = header_hash(&trusted_block.signed_header.header)?;
        if trusted_header != target.trusted_header {
            bail!(
                "Trusted header mismatch at height {}: requested {}, node has {}",
                target.trusted_height,
                target.trusted_header,
                trusted_header
            );
        }

        match get_header_update_verdict(&trusted_block, &target_block) {
            Verdict::Success => header_hash(&target_block.signed_header.header),
            v => bail!(
                "Could not verify updating to block {}, error: {:?}",
                target.target_height,
                v
            ),
        }
    }

    /// Serve queued requests one at a time until the gateway is dropped.
    pub async fn run(mut self, client: LightClientHandle) {
        info!("Starting Tendermint prover");
        while let Some(request) = self.jobs.recv().await {
            let output = match self.prove(&request).await {
                Ok(output) => output,
                Err(e) => {
                    // The request is abandoned; the operator resubmits on its next pass.
                    error!("Failed to prove {:?}: {:#}", request.callback, e);
                    continue;
                }
            };

            let key = (request.function_id, request.input.clone());
            self.verified
                .lock()
                .insert(key.clone(), Bytes::copy_from_slice(output.as_slice()));

            match client.fulfill(request.callback).await {
                Ok(event) => info!("Fulfilled {:?}: {:?}", request.callback, event),
                Err(e) => warn!("Fulfillment of {:?} failed: {}", request.callback, e),
            }

            self.verified.lock().remove(&key);
        }
        info!("Tendermint prover stopped");
    }
}
