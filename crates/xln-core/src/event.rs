//! Jurisdiction (L1) events as delivered by the watcher.
//!
//! Two parties never compare raw adapter output: every equality check,
//! hash and dedup key goes through the canonical normalized form produced
//! by [`JurisdictionEvent::normalize`].

use serde::{Deserialize, Serialize};

use crate::types::{Amount, EntityId, Hashlock, JBlockHash, JTxHash, Nonce, ProofHash, Secret, TokenId};

// ── Event kinds ──────────────────────────────────────────────────────────────

/// Every observable Depository event, tagged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JEventKind {
    /// An entity's reserve balance changed on-chain.
    ReserveUpdated {
        entity: EntityId,
        token_id: TokenId,
        new_balance: Amount,
    },

    /// An account settlement was committed on-chain. One event per token.
    AccountSettled {
        left_entity: EntityId,
        right_entity: EntityId,
        token_id: TokenId,
        left_reserve: Amount,
        right_reserve: Amount,
        collateral: Amount,
        ondelta: Amount,
        nonce: Nonce,
    },

    /// An HTLC pre-image became public on-chain.
    SecretRevealed { hashlock: Hashlock, secret: Secret },

    /// Reserved: uncollateralized debt recorded against an entity.
    DebtCreated,

    /// Reserved: recorded debt enforced against a reserve.
    DebtEnforced,

    /// A party opened a dispute with a signed proof at some nonce.
    DisputeStarted {
        sender: EntityId,
        counterentity: EntityId,
        nonce: Nonce,
        proofbody_hash: ProofHash,
        /// Transformer-encoded auxiliary data (revealed HTLC secrets).
        initial_arguments: Vec<Vec<u8>>,
    },

    /// A dispute closed after its timeout.
    DisputeFinalized {
        sender: EntityId,
        counterentity: EntityId,
        initial_nonce: Nonce,
        initial_proofbody_hash: ProofHash,
        final_proofbody_hash: ProofHash,
    },

    /// The Depository processed (or rejected) an entity's batched transaction.
    HankoBatchProcessed {
        entity_id: EntityId,
        hanko_hash: [u8; 32],
        nonce: u64,
        success: bool,
        /// Number of operations the batch carried; 0 marks a replayed
        /// nonce-only notification.
        op_count: u32,
    },
}

// ── JurisdictionEvent ────────────────────────────────────────────────────────

/// A tagged L1 event with its chain coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionEvent {
    pub block_number: u64,
    pub block_hash: JBlockHash,
    pub tx_hash: JTxHash,
    pub kind: JEventKind,
}

impl JurisdictionEvent {
    /// Canonical normal form.
    ///
    /// Entity ids are raw bytes (already case-free); account pairs are
    /// reordered so the lexicographically smaller entity is left, with the
    /// reserve/delta fields mirrored accordingly.
    pub fn normalize(&self) -> JurisdictionEvent {
        let mut ev = self.clone();
        let swapped = if let JEventKind::AccountSettled {
            left_entity,
            right_entity,
            token_id,
            left_reserve,
            right_reserve,
            collateral,
            ondelta,
            nonce,
        } = ev.kind
        {
            (right_entity < left_entity).then(|| JEventKind::AccountSettled {
                left_entity: right_entity,
                right_entity: left_entity,
                token_id,
                left_reserve: right_reserve,
                right_reserve: left_reserve,
                // Mirroring the pair flips the delta orientation.
                collateral,
                ondelta: collateral - ondelta,
                nonce,
            })
        } else {
            None
        };
        if let Some(kind) = swapped {
            ev.kind = kind;
        }
        ev
    }

    /// Canonical dedup key. Two observations of the same on-chain fact from
    /// different signers map to the same key.
    pub fn canonical_key(&self) -> String {
        let ev = self.normalize();
        match &ev.kind {
            JEventKind::ReserveUpdated { entity, token_id, .. } => {
                format!("reserve:{}:{}:{}", entity, token_id, ev.tx_hash.to_hex())
            }
            JEventKind::AccountSettled { left_entity, right_entity, token_id, nonce, .. } => {
                format!("settled:{}:{}:{}:{}", left_entity, right_entity, token_id, nonce)
            }
            JEventKind::SecretRevealed { hashlock, .. } => {
                format!("secret:{}", hashlock)
            }
            JEventKind::DebtCreated => format!("debt-created:{}", ev.tx_hash.to_hex()),
            JEventKind::DebtEnforced => format!("debt-enforced:{}", ev.tx_hash.to_hex()),
            JEventKind::DisputeStarted { sender, counterentity, nonce, .. } => {
                format!("dispute-started:{}:{}:{}", sender, counterentity, nonce)
            }
            JEventKind::DisputeFinalized { sender, counterentity, initial_nonce, .. } => {
                format!("dispute-finalized:{}:{}:{}", sender, counterentity, initial_nonce)
            }
            JEventKind::HankoBatchProcessed { entity_id, nonce, .. } => {
                format!("batch:{}:{}", entity_id, nonce)
            }
        }
    }

    /// Canonical bytes of the normal form, for cross-party multiset equality.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.normalize()).expect("event serialization is infallible")
    }
}

/// Compare two event batches as multisets of normalized events.
pub fn canonical_multiset_eq(a: &[JurisdictionEvent], b: &[JurisdictionEvent]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut xs: Vec<Vec<u8>> = a.iter().map(|e| e.canonical_bytes()).collect();
    let mut ys: Vec<Vec<u8>> = b.iter().map(|e| e.canonical_bytes()).collect();
    xs.sort();
    ys.sort();
    xs == ys
}
