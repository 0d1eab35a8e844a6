//! Header-tracking state machine.
//!
//! Every public mutator is one atomic transition: all validation happens before the first
//! write, so an `Err` leaves the client exactly as it was.

use std::fmt;
use std::sync::Arc;

use tendermintx_primitives::types::{decode_header_output, SkipInput, StepInput};
use tendermintx_primitives::{B256, FREEZE_GAP_MAX, SKIP_MAX, U256};
use tracing::{debug, info, warn};

use crate::config::LightClientConfig;
use crate::error::{LightClientError, Result};
use crate::events::LightClientEvent;
use crate::gateway::{Callback, FunctionId, ProofGateway, ProofRequest};
use crate::ledger::{HeaderLedger, LedgerSnapshot};

/// A skip to `target_height` is admissible iff `latest < target <= latest + SKIP_MAX`.
fn check_skip_window(latest_height: u64, target_height: u64) -> Result<()> {
    if target_height <= latest_height || target_height > latest_height.saturating_add(SKIP_MAX) {
        return Err(LightClientError::TargetOutOfRange {
            height: target_height,
            latest: latest_height,
        });
    }
    Ok(())
}

/// A freeze needs `trusted > latest - FREEZE_GAP_MAX` and `conflict <= latest`. The first
/// bound is evaluated as `trusted + FREEZE_GAP_MAX > latest` so that it cannot underflow
/// while `latest < FREEZE_GAP_MAX`.
fn check_freeze_window(latest_height: u64, trusted_height: u64, conflict_height: u64) -> Result<()> {
    if trusted_height.saturating_add(FREEZE_GAP_MAX) <= latest_height {
        return Err(LightClientError::TargetOutOfRange {
            height: trusted_height,
            latest: latest_height,
        });
    }
    if conflict_height > latest_height {
        return Err(LightClientError::TargetOutOfRange {
            height: conflict_height,
            latest: latest_height,
        });
    }
    Ok(())
}

pub struct TendermintX {
    config: LightClientConfig,
    gateway: Arc<dyn ProofGateway>,
    ledger: HeaderLedger,
    frozen: bool,
}

impl fmt::Debug for TendermintX {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TendermintX")
            .field("config", &self.config)
            .field("latest_height", &self.ledger.latest_height())
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

impl TendermintX {
    pub fn new(gateway: Arc<dyn ProofGateway>, config: LightClientConfig) -> Self {
        Self::from_snapshot(gateway, config, LedgerSnapshot::default())
    }

    /// Restore a client from persisted state.
    pub fn from_snapshot(
        gateway: Arc<dyn ProofGateway>,
        config: LightClientConfig,
        snapshot: LedgerSnapshot,
    ) -> Self {
        Self {
            config,
            gateway,
            ledger: snapshot.ledger,
            frozen: snapshot.frozen,
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            ledger: self.ledger.clone(),
            frozen: self.frozen,
        }
    }

    pub fn latest_height(&self) -> u64 {
        self.ledger.latest_height()
    }

    pub fn header_at(&self, height: u64) -> B256 {
        self.ledger.header_at(height)
    }

    pub fn ledger(&self) -> &HeaderLedger {
        &self.ledger
    }

    pub fn frozen(&self) -> bool {
        self.frozen
    }

    pub fn gateway(&self) -> Arc<dyn ProofGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn config(&self) -> &LightClientConfig {
        &self.config
    }

    pub fn step_function_id(&self) -> FunctionId {
        self.config.step_function_id
    }

    pub fn skip_function_id(&self) -> FunctionId {
        self.config.skip_function_id
    }

    pub const fn skip_max() -> u64 {
        SKIP_MAX
    }

    pub const fn freeze_gap_max() -> u64 {
        FREEZE_GAP_MAX
    }

    // Admin. None of these are access controlled: whoever holds the client is trusted.

    /// Inject the trusted genesis header. Callable repeatedly; each call moves
    /// `latest_height` to `height`.
    pub fn set_genesis_header(&mut self, height: u64, header: B256) {
        info!("Genesis header set at height {}: {}", height, header);
        self.ledger.set_genesis(height, header);
    }

    pub fn update_gateway(&mut self, gateway: Arc<dyn ProofGateway>) {
        info!("Proof gateway updated");
        self.gateway = gateway;
    }

    pub fn update_step_function_id(&mut self, function_id: FunctionId) {
        info!("Step function id updated to {}", function_id);
        self.config.step_function_id = function_id;
    }

    pub fn update_skip_function_id(&mut self, function_id: FunctionId) {
        info!("Skip function id updated to {}", function_id);
        self.config.skip_function_id = function_id;
    }

    fn ensure_live(&self) -> Result<()> {
        if self.frozen {
            if self.config.halt_when_frozen {
                return Err(LightClientError::Frozen);
            }
            warn!("Light client is frozen, its headers must not be trusted");
        }
        Ok(())
    }

    fn known_header(&self, height: u64) -> Result<B256> {
        let header = self.ledger.header_at(height);
        if header.is_zero() {
            return Err(LightClientError::UnknownTrustedHeader { height });
        }
        Ok(header)
    }

    fn submit(
        &self,
        function_id: FunctionId,
        input: Vec<u8>,
        callback: Callback,
        value: U256,
    ) -> Result<()> {
        debug!("Submitting proof request {:?} to function {}", callback, function_id);
        self.gateway.request_call(ProofRequest {
            function_id,
            input: input.into(),
            callback,
            gas_limit: self.config.callback_gas_limit,
            value,
        })?;
        Ok(())
    }

    fn verified_header(&self, function_id: FunctionId, input: &[u8]) -> Result<B256> {
        let output = self.gateway.verified_call(function_id, input)?;
        Ok(decode_header_output(&output)?)
    }

    /// Request a proof of the block following the latest height.
    pub fn request_step(&self, value: U256) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_height = self.ledger.latest_height();
        let trusted_header = self.known_header(trusted_height)?;

        let input = StepInput {
            trusted_height,
            trusted_header,
        };
        self.submit(
            self.config.step_function_id,
            input.abi_encode_packed(),
            Callback::Step { trusted_height },
            value,
        )?;

        info!("Step requested from height {}", trusted_height);
        Ok(LightClientEvent::StepRequested {
            trusted_height,
            trusted_header,
        })
    }

    /// Apply a verified step proof anchored at `trusted_height`.
    pub fn step(&mut self, trusted_height: u64) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_header = self.known_header(trusted_height)?;

        let latest_height = self.ledger.latest_height();
        let next_height = trusted_height
            .checked_add(1)
            .filter(|next| *next > latest_height)
            .ok_or(LightClientError::TargetOutOfRange {
                height: trusted_height.saturating_add(1),
                latest: latest_height,
            })?;

        let input = StepInput {
            trusted_height,
            trusted_header,
        };
        let new_header =
            self.verified_header(self.config.step_function_id, &input.abi_encode_packed())?;

        self.ledger.record_header(next_height, new_header);
        info!("Head updated to height {}: {}", next_height, new_header);
        Ok(LightClientEvent::HeadUpdate {
            height: next_height,
            header: new_header,
        })
    }

    /// Request a proof that `target_height` descends from the latest header.
    pub fn request_skip(&self, target_height: u64, value: U256) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_height = self.ledger.latest_height();
        let trusted_header = self.known_header(trusted_height)?;
        check_skip_window(trusted_height, target_height)?;

        let input = SkipInput {
            trusted_height,
            trusted_header,
            target_height,
        };
        self.submit(
            self.config.skip_function_id,
            input.abi_encode_packed(),
            Callback::Skip {
                trusted_height,
                target_height,
            },
            value,
        )?;

        info!("Skip requested from height {} to {}", trusted_height, target_height);
        Ok(LightClientEvent::SkipRequested {
            trusted_height,
            trusted_header,
            target_height,
        })
    }

    /// Apply a verified skip proof from `trusted_height` to `target_height`.
    ///
    /// The window is re-checked against the current latest height, so of two skips
    /// covering the same range only the first one delivered is applied.
    pub fn skip(&mut self, trusted_height: u64, target_height: u64) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_header = self.known_header(trusted_height)?;
        check_skip_window(self.ledger.latest_height(), target_height)?;

        let input = SkipInput {
            trusted_height,
            trusted_header,
            target_height,
        };
        let target_header =
            self.verified_header(self.config.skip_function_id, &input.abi_encode_packed())?;

        self.ledger.record_header(target_height, target_header);
        info!("Head updated to height {}: {}", target_height, target_header);
        Ok(LightClientEvent::HeadUpdate {
            height: target_height,
            header: target_header,
        })
    }

    /// Request a skip proof from `trusted_height` to the already recorded
    /// `conflict_height`, to be checked against the stored header on fulfillment.
    pub fn request_freeze(
        &self,
        trusted_height: u64,
        conflict_height: u64,
        value: U256,
    ) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_header = self.known_header(trusted_height)?;
        self.known_header(conflict_height)?;
        check_freeze_window(self.ledger.latest_height(), trusted_height, conflict_height)?;

        let input = SkipInput {
            trusted_height,
            trusted_header,
            target_height: conflict_height,
        };
        self.submit(
            self.config.skip_function_id,
            input.abi_encode_packed(),
            Callback::Freeze {
                trusted_height,
                conflict_height,
            },
            value,
        )?;

        info!(
            "Freeze requested for height {} from trusted height {}",
            conflict_height, trusted_height
        );
        Ok(LightClientEvent::FreezeRequested {
            trusted_height,
            trusted_header,
            conflict_height,
        })
    }

    /// Compare the proven header at `conflict_height` with the stored one and freeze the
    /// client if they differ. Never rewrites the stored header.
    pub fn freeze(&mut self, trusted_height: u64, conflict_height: u64) -> Result<LightClientEvent> {
        self.ensure_live()?;
        let trusted_header = self.known_header(trusted_height)?;
        let stored_header = self.known_header(conflict_height)?;
        check_freeze_window(self.ledger.latest_height(), trusted_height, conflict_height)?;

        let input = SkipInput {
            trusted_height,
            trusted_header,
            target_height: conflict_height,
        };
        let proven_header =
            self.verified_header(self.config.skip_function_id, &input.abi_encode_packed())?;

        if proven_header == stored_header {
            return Err(LightClientError::InvalidConflictBlock {
                height: conflict_height,
            });
        }

        self.frozen = true;
        warn!(
            "Conflicting header at height {}: stored {}, proven {}. Light client frozen",
            conflict_height, stored_header, proven_header
        );
        Ok(LightClientEvent::Freeze {
            conflict_height,
            stored_header,
            proven_header,
        })
    }

    /// Dispatch a fulfillment to the transition its callback was registered for.
    pub fn fulfill(&mut self, callback: Callback) -> Result<LightClientEvent> {
        match callback {
            Callback::Step { trusted_height } => self.step(trusted_height),
            Callback::Skip {
                trusted_height,
                target_height,
            } => self.skip(trusted_height, target_height),
            Callback::Freeze {
                trusted_height,
                conflict_height,
            } => self.freeze(trusted_height, conflict_height),
        }
    }
}
