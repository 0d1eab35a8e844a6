//! JSON-RPC response shapes of the Tendermint RPC endpoints used here.

use serde::Deserialize;
use tendermint::block::signed_header::SignedHeader;
use tendermint::validator::Info;

#[derive(Debug, Deserialize)]
pub struct PeerIdResponse {
    pub result: PeerIdWrapper,
}

#[derive(Debug, Deserialize)]
pub struct PeerIdWrapper {
    pub node_info: NodeInfoWrapper,
}

#[derive(Debug, Deserialize)]
pub struct NodeInfoWrapper {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommitResponse {
    pub result: SignedHeaderWrapper,
}

#[derive(Debug, Deserialize)]
pub struct SignedHeaderWrapper {
    pub signed_header: SignedHeader,
}

#[derive(Debug, Deserialize)]
pub struct ValidatorSetResponse {
    pub result: BlockValidatorSet,
}

#[derive(Debug, Deserialize)]
pub struct BlockValidatorSet {
    pub block_height: String,
    pub validators: Vec<Info>,
    /// Validators on this page.
    pub count: String,
    pub total: String,
}
