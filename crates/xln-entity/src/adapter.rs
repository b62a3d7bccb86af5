//! The jurisdiction adapter boundary.
//!
//! The core never talks to a chain: reads and writes go through this trait,
//! injected by the operator layer. The trait is synchronous because the core
//! is deterministic and single-threaded per entity; any RPC latency belongs
//! to the operator, which feeds results back in as ordinary inputs.

use xln_core::entity::JBatch;
use xln_core::error::XlnError;
use xln_core::types::{Amount, EntityId, Hanko, Nonce, TokenId};

/// Authoritative per-account facts read from the Depository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Last settlement nonce committed on-chain.
    pub nonce: Nonce,
    /// Jurisdiction block number after which an open dispute may finalize.
    pub dispute_timeout: u64,
}

/// One broadcast-ready batch with its entity nonce and hanko.
#[derive(Clone, Debug)]
pub struct JBatchSubmission {
    pub entity_id: EntityId,
    pub entity_nonce: u64,
    pub batch_hash: [u8; 32],
    pub batch: JBatch,
    pub hanko: Hanko,
}

/// Read/write access to the jurisdiction chain's Depository contract.
pub trait JurisdictionAdapter {
    /// `getAccountInfo(self, counterparty)`: authoritative nonce and dispute
    /// timeout for the pair.
    fn get_account_info(
        &self,
        left: &EntityId,
        right: &EntityId,
    ) -> Result<AccountInfo, XlnError>;

    /// `getCollateral(left, right, tokenId)`.
    fn get_collateral(
        &self,
        left: &EntityId,
        right: &EntityId,
        token_id: TokenId,
    ) -> Result<Amount, XlnError>;

    /// Submit a j-batch. Confirmation arrives later as a
    /// `HankoBatchProcessed` event; until then the batch stays pending.
    fn submit_batch(&mut self, submission: JBatchSubmission) -> Result<(), XlnError>;
}
