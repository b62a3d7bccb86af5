//! The entity data model: reserves, accounts, j-block consensus state and the
//! j-batch accumulator.
//!
//! Entities are the unit of ownership. Each entity runs single-threaded over
//! its inbox; `timestamp` is its logical clock and the only notion of time
//! the deterministic core may read.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::account::{Account, LogCategory, LogEntry};
use crate::constants::{DEFAULT_BATCH_HISTORY_LIMIT, DEFAULT_CREDIT_LIMIT};
use crate::types::{Amount, EntityId, Hashlock, LockId, SignerId, Timestamp, TokenId};
use crate::tx::{JBlockFinalized, JBlockObservation};

// ── Config ───────────────────────────────────────────────────────────────────

fn default_batch_history_limit() -> usize {
    DEFAULT_BATCH_HISTORY_LIMIT
}

fn default_credit_limit() -> Amount {
    DEFAULT_CREDIT_LIMIT
}

/// Per-entity configuration, fixed at creation (governance updates arrive as
/// ordinary entity inputs, out of core scope).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Signers whose j-block observations count toward the threshold.
    pub signers: Vec<SignerId>,
    /// Unique-signer threshold for j-block finalization.
    pub threshold: u32,
    /// Credit limit applied to a token's Delta on first use.
    #[serde(default = "default_credit_limit")]
    pub default_credit_limit: Amount,
    /// Confirmed j-batches retained in `batch_history`.
    #[serde(default = "default_batch_history_limit")]
    pub batch_history_limit: usize,
}

impl EntityConfig {
    /// Single-signer config, the common case for demo entities.
    pub fn single(signer: SignerId) -> Self {
        Self {
            signers: vec![signer],
            threshold: 1,
            default_credit_limit: DEFAULT_CREDIT_LIMIT,
            batch_history_limit: DEFAULT_BATCH_HISTORY_LIMIT,
        }
    }

    pub fn is_signer(&self, signer: &SignerId) -> bool {
        self.signers.contains(signer)
    }
}

// ── J-batch operations ───────────────────────────────────────────────────────

/// Move reserve between two entities on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveToReserveOp {
    pub to: EntityId,
    pub token_id: TokenId,
    pub amount: Amount,
}

/// Move reserve into the collateral of one account, credited to `receiver`'s
/// side of the pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveToCollateralOp {
    pub counterparty: EntityId,
    pub receiver: EntityId,
    pub token_id: TokenId,
    pub amount: Amount,
}

/// A fully-signed cooperative settlement ready for the Depository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleOp {
    pub counterparty: EntityId,
    pub diffs: Vec<crate::tx::SettleDiff>,
    pub left_hanko: crate::types::Hanko,
    pub right_hanko: crate::types::Hanko,
}

/// The accumulating set of on-chain operations, broadcast as one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JBatch {
    pub reserve_to_reserve: Vec<ReserveToReserveOp>,
    pub reserve_to_collateral: Vec<ReserveToCollateralOp>,
    pub settlements: Vec<SettleOp>,
}

impl JBatch {
    pub fn is_empty(&self) -> bool {
        self.reserve_to_reserve.is_empty()
            && self.reserve_to_collateral.is_empty()
            && self.settlements.is_empty()
    }

    pub fn op_count(&self) -> usize {
        self.reserve_to_reserve.len() + self.reserve_to_collateral.len() + self.settlements.len()
    }

    /// Merge `other`'s operations in front of ours (used when a failed
    /// broadcast returns its operations to the live batch).
    pub fn merge_front(&mut self, mut other: JBatch) {
        std::mem::swap(&mut self.reserve_to_reserve, &mut other.reserve_to_reserve);
        self.reserve_to_reserve.extend(other.reserve_to_reserve);
        std::mem::swap(&mut self.reserve_to_collateral, &mut other.reserve_to_collateral);
        self.reserve_to_collateral.extend(other.reserve_to_collateral);
        std::mem::swap(&mut self.settlements, &mut other.settlements);
        self.settlements.extend(other.settlements);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JBatchStatus {
    Empty,
    Accumulating,
    /// Broadcast, awaiting `HankoBatchProcessed`.
    Pending,
}

/// A broadcast batch awaiting its on-chain outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentBatch {
    pub batch: JBatch,
    pub entity_nonce: u64,
    pub batch_hash: [u8; 32],
    pub sent_at: Timestamp,
}

/// Record of a confirmed batch, kept in bounded history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub entity_nonce: u64,
    pub batch_hash: [u8; 32],
    pub op_count: u32,
    pub confirmed_at: Timestamp,
}

/// Full accumulator state: the live batch plus the one awaiting its
/// on-chain outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JBatchState {
    pub batch: JBatch,
    pub status: JBatchStatus,
    pub sent_batch: Option<SentBatch>,
    /// Depository nonce; authoritative value arrives with each
    /// `HankoBatchProcessed` and always wins over local increments.
    pub entity_nonce: u64,
    pub failed_attempts: u32,
}

impl Default for JBatchState {
    fn default() -> Self {
        Self {
            batch: JBatch::default(),
            status: JBatchStatus::Empty,
            sent_batch: None,
            entity_nonce: 0,
            failed_attempts: 0,
        }
    }
}

// ── HTLC routing ─────────────────────────────────────────────────────────────

/// Non-owning reference to a lock inside one of the entity's accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRef {
    pub counterparty: EntityId,
    pub lock_id: LockId,
}

// ── Entity ───────────────────────────────────────────────────────────────────

/// Full state of one entity: its reserves, its bilateral accounts, and the
/// two derived consensus views (j-block chain, per-account j-event chains).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub config: EntityConfig,

    pub reserves: BTreeMap<TokenId, Amount>,
    pub accounts: BTreeMap<EntityId, Account>,

    /// Signer observations not yet folded into the chain.
    pub j_block_observations: Vec<JBlockObservation>,
    /// Finalized j-blocks in finalization order.
    pub j_block_chain: Vec<JBlockFinalized>,
    pub last_finalized_j_height: u64,

    pub j_batch: JBatchState,
    pub batch_history: Vec<BatchRecord>,

    /// Global index: which account holds each known lock.
    pub lock_book: BTreeMap<LockId, EntityId>,
    /// Multi-hop routes: outgoing lock → the prior-hop (incoming) lock whose
    /// secret must be propagated backwards on resolve.
    pub htlc_routes: BTreeMap<LockId, LockRef>,
    /// Secrets learned from resolves, on-chain reveals and dispute arguments.
    pub known_secrets: BTreeMap<Hashlock, crate::types::Secret>,

    /// Entity-logical clock, milliseconds, strictly non-decreasing.
    pub timestamp: Timestamp,

    pub messages: Vec<LogEntry>,
}

impl Entity {
    pub fn new(entity_id: EntityId, config: EntityConfig) -> Self {
        Self {
            entity_id,
            config,
            reserves: BTreeMap::new(),
            accounts: BTreeMap::new(),
            j_block_observations: Vec::new(),
            j_block_chain: Vec::new(),
            last_finalized_j_height: 0,
            j_batch: JBatchState::default(),
            batch_history: Vec::new(),
            lock_book: BTreeMap::new(),
            htlc_routes: BTreeMap::new(),
            known_secrets: BTreeMap::new(),
            timestamp: 0,
            messages: Vec::new(),
        }
    }

    pub fn reserve(&self, token_id: TokenId) -> Amount {
        self.reserves.get(&token_id).copied().unwrap_or(0)
    }

    /// Account with `counterparty`, created on first use.
    pub fn account_mut(&mut self, counterparty: EntityId) -> &mut Account {
        let own = self.entity_id;
        self.accounts
            .entry(counterparty)
            .or_insert_with(|| Account::new(own, counterparty))
    }

    /// Whether this entity is the left side of its account with `counterparty`.
    pub fn is_left_of(&self, counterparty: &EntityId) -> bool {
        self.entity_id < *counterparty
    }

    /// Advance the logical clock; never moves backwards.
    pub fn advance_clock(&mut self, now: Timestamp) {
        if now > self.timestamp {
            self.timestamp = now;
        }
    }

    pub fn log(&mut self, category: LogCategory, text: impl Into<String>) {
        self.messages.push(LogEntry {
            at: self.timestamp,
            category,
            text: text.into(),
        });
    }
}
