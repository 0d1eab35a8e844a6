use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use tendermintx_primitives::B256;

/// Height -> header hash store plus the latest trusted height.
///
/// Unknown heights read as `B256::ZERO`. Entries are only ever added by genesis and by
/// accepted step/skip transitions, which always write above `latest_height`, so a height
/// that maps to a real hash keeps it as long as genesis is not re-set. Re-setting genesis
/// below recorded heights makes them writable again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderLedger {
    latest_height: u64,
    headers: BTreeMap<u64, B256>,
}

impl HeaderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_height(&self) -> u64 {
        self.latest_height
    }

    /// Header hash recorded at `height`, or the zero sentinel.
    pub fn header_at(&self, height: u64) -> B256 {
        self.headers.get(&height).copied().unwrap_or(B256::ZERO)
    }

    pub fn latest_header(&self) -> B256 {
        self.header_at(self.latest_height)
    }

    pub fn is_known(&self, height: u64) -> bool {
        !self.header_at(height).is_zero()
    }

    /// Number of recorded heights.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Recorded `(height, header)` pairs within `range`, in ascending height order.
    pub fn headers_in(&self, range: RangeInclusive<u64>) -> impl Iterator<Item = (u64, B256)> + '_ {
        self.headers.range(range).map(|(height, header)| (*height, *header))
    }

    /// Record `header` at `height`, advancing `latest_height` when `height` is above it.
    pub(crate) fn record_header(&mut self, height: u64, header: B256) {
        self.headers.insert(height, header);
        if height > self.latest_height {
            self.latest_height = height;
        }
    }

    /// Trusted-by-fiat bootstrap entry. Moves `latest_height` unconditionally.
    pub(crate) fn set_genesis(&mut self, height: u64, header: B256) {
        self.headers.insert(height, header);
        self.latest_height = height;
    }
}

/// Persistable light client state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub ledger: HeaderLedger,
    pub frozen: bool,
}
