use crate::gateway::FunctionId;

/// Gas limit attached to every fulfillment callback.
pub const DEFAULT_CALLBACK_GAS_LIMIT: u64 = 500_000;

/// Configuration for the light client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightClientConfig {
    /// Circuit proving a single-block step.
    pub step_function_id: FunctionId,
    /// Circuit proving a skip; freeze proofs reuse it.
    pub skip_function_id: FunctionId,
    pub callback_gas_limit: u64,
    /// Reject every request and fulfillment with `Frozen` once the client is frozen.
    /// Off by default: a frozen client otherwise keeps accepting transitions and the flag
    /// is only a signal to downstream consumers.
    pub halt_when_frozen: bool,
}

impl Default for LightClientConfig {
    fn default() -> Self {
        Self {
            step_function_id: FunctionId::ZERO,
            skip_function_id: FunctionId::ZERO,
            callback_gas_limit: DEFAULT_CALLBACK_GAS_LIMIT,
            halt_when_frozen: false,
        }
    }
}
