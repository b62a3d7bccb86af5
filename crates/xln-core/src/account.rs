//! The bilateral account data model.
//!
//! One [`Account`] exists per ordered pair of entities; the lexicographically
//! smaller entity id is the left side, fixed at creation. Shared fields
//! (deltas, locks, the proof header) only move through counter-signed frames
//! or bilaterally finalized jurisdiction events; everything else is side-local
//! bookkeeping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tx::{AccountFrame, AccountInput, AccountTx, FrameEffect, JBlockFinalized, SettleDiff};
use crate::types::{
    Amount, EntityId, Hanko, Hashlock, LockId, Nonce, ProofHash, Timestamp, TokenId,
};

// ── Delta ────────────────────────────────────────────────────────────────────

/// Raw channel state for one token. Positive `ondelta + offdelta` favors the
/// right entity (see `delta::derive`).
///
/// `collateral` and `ondelta` move only via bilaterally finalized
/// `AccountSettled` events; the rest moves only through counter-signed frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub collateral: Amount,
    pub ondelta: Amount,
    pub offdelta: Amount,
    pub left_credit_limit: Amount,
    pub right_credit_limit: Amount,
    pub left_allowance: Amount,
    pub right_allowance: Amount,
}

impl Delta {
    pub fn new(default_credit_limit: Amount) -> Self {
        Self {
            collateral: 0,
            ondelta: 0,
            offdelta: 0,
            left_credit_limit: default_credit_limit,
            right_credit_limit: default_credit_limit,
            left_allowance: 0,
            right_allowance: 0,
        }
    }

    pub fn total_delta(&self) -> Amount {
        self.ondelta + self.offdelta
    }
}

// ── HTLC locks ───────────────────────────────────────────────────────────────

/// An in-flight hash-time-locked amount frozen on one side of the account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcLock {
    pub lock_id: LockId,
    pub hashlock: Hashlock,
    pub amount: Amount,
    pub token_id: TokenId,
    /// Absolute entity timestamp after which the sender may reclaim.
    pub expiry: Timestamp,
    pub sender_is_left: bool,
}

// ── Dispute proofs ───────────────────────────────────────────────────────────

/// A submittable snapshot: the peer's signature binding a proof body hash to
/// a nonce (our own signature is implicit in the submission).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeProof {
    pub nonce: Nonce,
    pub body_hash: ProofHash,
    pub hanko: Hanko,
}

/// Dispute state while `status == Disputed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDispute {
    pub started_by_left: bool,
    pub initial_proofbody_hash: ProofHash,
    pub initial_nonce: Nonce,
    /// Jurisdiction block number after which the dispute may finalize.
    pub dispute_timeout: u64,
    /// Authoritative settlement nonce read from the chain at dispute start.
    pub on_chain_nonce: Nonce,
    /// Auxiliary data the initiator submitted (revealed HTLC secrets).
    pub initial_arguments: Vec<Vec<u8>>,
}

// ── Settlement workspace ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceStatus {
    Proposed,
    ReadyToSubmit,
    Submitted,
}

/// The pre-signed proof that becomes current the moment the matching
/// `AccountSettled` finalizes bilaterally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSettlementProof {
    pub nonce: Nonce,
    pub body_hash: ProofHash,
    /// Peer's hanko over `body_hash`, once received.
    pub peer_hanko: Option<Hanko>,
}

/// Staged, bilaterally-signed intent to submit an on-chain settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementWorkspace {
    pub diffs: Vec<SettleDiff>,
    pub proposed_by_left: bool,
    pub left_hanko: Option<Hanko>,
    pub right_hanko: Option<Hanko>,
    /// Frame nonce at which the proposal was signed.
    pub nonce_at_sign: Nonce,
    pub status: WorkspaceStatus,
    pub post_settlement_proof: Option<PostSettlementProof>,
}

// ── Rebalance ────────────────────────────────────────────────────────────────

/// An open offer to fulfil the peer's rebalance request for a fee.
/// `quote_id` doubles as the issuance timestamp for expiry checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceQuote {
    pub quote_id: Timestamp,
    pub fee_token_id: TokenId,
    pub fee_amount: Amount,
    pub accepted: bool,
}

/// Side-local progress of a requested rebalance through the j-batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceFeeState {
    pub fee_paid: bool,
    /// Set while the fulfilling deposit sits in a broadcast j-batch; cleared
    /// on batch failure so the operator can retry.
    pub j_batch_submitted_at: Option<Timestamp>,
}

/// Standing rebalance trigger for one side of one token: when that side's
/// inbound collateral falls below the floor, its entity queues a
/// `rebalance_request` for `top_up` on the next tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalancePolicy {
    pub min_in_collateral: Amount,
    pub top_up: Amount,
}

// ── Message log ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogCategory {
    Payment,
    Settlement,
    Dispute,
    Rebalance,
    JEvent,
    System,
}

/// One line of the append-only user-visible account log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: Timestamp,
    pub category: LogCategory,
    pub text: String,
}

// ── Proof header ─────────────────────────────────────────────────────────────

/// Frame sequencing state; `nonce` is the next frame's number minus one
/// (the last committed frame).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofHeader {
    pub nonce: Nonce,
}

// ── Account status ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Disputed,
}

// ── Account ──────────────────────────────────────────────────────────────────

/// Full state of one bilateral account, as held by one of its two entities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub left_entity: EntityId,
    pub right_entity: EntityId,

    pub deltas: BTreeMap<TokenId, Delta>,
    pub locks: BTreeMap<LockId, HtlcLock>,

    /// Account transactions awaiting inclusion in a frame.
    pub mempool: Vec<AccountTx>,
    pub proof_header: ProofHeader,

    /// Frame we proposed but have not seen counter-signed yet.
    pub pending_frame: Option<AccountFrame>,
    /// The input that carried `pending_frame`, kept for replay.
    pub pending_account_input: Option<AccountInput>,
    /// Pre-proposal snapshot for rollback on a lost concurrency tie.
    pub cloned_for_validation: Option<Box<Account>>,
    /// Effects of our applied-but-uncommitted frame, released on commit.
    #[serde(default)]
    pub pending_effects: Vec<FrameEffect>,

    pub status: AccountStatus,

    /// Last settlement nonce committed on-chain.
    pub on_chain_settlement_nonce: Nonce,

    /// Latest proof we can submit in a dispute (peer's hanko).
    pub current_dispute_proof: Option<DisputeProof>,
    /// Latest proof we counter-signed for the peer.
    pub counterparty_dispute_proof: Option<DisputeProof>,

    pub active_dispute: Option<ActiveDispute>,
    pub settlement_workspace: Option<SettlementWorkspace>,

    pub requested_rebalance: BTreeMap<TokenId, Amount>,
    pub requested_rebalance_fee_state: RebalanceFeeState,
    pub active_rebalance_quote: Option<RebalanceQuote>,
    /// Standing triggers for automatic rebalance requests, per side.
    #[serde(default)]
    pub left_rebalance_policy: BTreeMap<TokenId, RebalancePolicy>,
    #[serde(default)]
    pub right_rebalance_policy: BTreeMap<TokenId, RebalancePolicy>,

    /// J-event batches claimed by each side, awaiting the 2-of-2 match.
    pub left_j_observations: Vec<JBlockFinalized>,
    pub right_j_observations: Vec<JBlockFinalized>,
    /// Bilaterally finalized j-event batches.
    pub j_event_chain: Vec<JBlockFinalized>,
    pub last_finalized_j_height: u64,

    pub rollback_count: u32,
    pub last_rollback_frame_hash: Option<ProofHash>,

    pub messages: Vec<LogEntry>,
}

impl Account {
    /// Create a fresh account between two entities. Ids are reordered so the
    /// lexicographically smaller one is left.
    pub fn new(a: EntityId, b: EntityId) -> Self {
        let (left_entity, right_entity) = if a < b { (a, b) } else { (b, a) };
        Self {
            left_entity,
            right_entity,
            deltas: BTreeMap::new(),
            locks: BTreeMap::new(),
            mempool: Vec::new(),
            proof_header: ProofHeader::default(),
            pending_frame: None,
            pending_account_input: None,
            cloned_for_validation: None,
            pending_effects: Vec::new(),
            status: AccountStatus::Active,
            on_chain_settlement_nonce: 0,
            current_dispute_proof: None,
            counterparty_dispute_proof: None,
            active_dispute: None,
            settlement_workspace: None,
            requested_rebalance: BTreeMap::new(),
            requested_rebalance_fee_state: RebalanceFeeState::default(),
            active_rebalance_quote: None,
            left_rebalance_policy: BTreeMap::new(),
            right_rebalance_policy: BTreeMap::new(),
            left_j_observations: Vec::new(),
            right_j_observations: Vec::new(),
            j_event_chain: Vec::new(),
            last_finalized_j_height: 0,
            rollback_count: 0,
            last_rollback_frame_hash: None,
            messages: Vec::new(),
        }
    }

    /// Whether `entity` is the left side of this account.
    pub fn is_left(&self, entity: &EntityId) -> bool {
        *entity == self.left_entity
    }

    /// The other entity of the pair, from `entity`'s point of view.
    pub fn counterparty_of(&self, entity: &EntityId) -> EntityId {
        if self.is_left(entity) {
            self.right_entity
        } else {
            self.left_entity
        }
    }

    /// Delta for `token_id`, creating it with the given default credit limit
    /// on first use.
    pub fn delta_mut(&mut self, token_id: TokenId, default_credit_limit: Amount) -> &mut Delta {
        self.deltas
            .entry(token_id)
            .or_insert_with(|| Delta::new(default_credit_limit))
    }

    /// Sum of lock amounts currently frozen on `sender_is_left`'s side for
    /// one token. Locks are reservations against that side's out-capacity.
    pub fn locked_amount(&self, token_id: TokenId, sender_is_left: bool) -> Amount {
        self.locks
            .values()
            .filter(|l| l.token_id == token_id && l.sender_is_left == sender_is_left)
            .map(|l| l.amount)
            .sum()
    }

    /// Append a line to the account's user-visible log.
    pub fn log(&mut self, at: Timestamp, category: LogCategory, text: impl Into<String>) {
        self.messages.push(LogEntry {
            at,
            category,
            text: text.into(),
        });
    }
}
