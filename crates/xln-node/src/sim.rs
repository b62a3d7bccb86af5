//! A tiny in-process jurisdiction: executes j-batches immediately and emits
//! the events a real Depository would, one block per `produce_block`.
//!
//! Demo fidelity only — no signatures are checked and no disputes time out
//! on their own. The entities under test cannot tell the difference: they
//! see the same adapter trait and the same event taxonomy.

use std::collections::BTreeMap;

use tracing::info;

use xln_core::event::{JEventKind, JurisdictionEvent};
use xln_core::types::{Amount, EntityId, JBlockHash, JTxHash, Nonce, TokenId};
use xln_core::XlnError;
use xln_crypto::blake3_hash;
use xln_entity::{AccountInfo, JBatchSubmission, JurisdictionAdapter};

#[derive(Default)]
struct PairState {
    collateral: Amount,
    ondelta: Amount,
    nonce: Nonce,
}

/// The simulated chain.
#[derive(Default)]
pub struct SimJurisdiction {
    height: u64,
    pending: Vec<JurisdictionEvent>,
    reserves: BTreeMap<(EntityId, TokenId), Amount>,
    pairs: BTreeMap<(EntityId, EntityId, TokenId), PairState>,
}

fn pair_key(a: EntityId, b: EntityId, token: TokenId) -> (EntityId, EntityId, TokenId) {
    if a < b {
        (a, b, token)
    } else {
        (b, a, token)
    }
}

impl SimJurisdiction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity's on-chain reserve (the faucet the demo starts from).
    /// Emits the matching `ReserveUpdated` into the next block.
    pub fn fund(&mut self, entity: EntityId, token: TokenId, amount: Amount) {
        *self.reserves.entry((entity, token)).or_insert(0) += amount;
        let new_balance = self.reserve(entity, token);
        self.emit(JEventKind::ReserveUpdated {
            entity,
            token_id: token,
            new_balance,
        });
    }

    pub fn reserve(&self, entity: EntityId, token: TokenId) -> Amount {
        self.reserves.get(&(entity, token)).copied().unwrap_or(0)
    }

    /// Publish an HTLC pre-image on-chain (what a receiver does when it must
    /// claim without counterparty cooperation).
    pub fn reveal_secret(&mut self, hashlock: xln_core::types::Hashlock, secret: xln_core::types::Secret) {
        self.emit(JEventKind::SecretRevealed { hashlock, secret });
    }

    /// Mine the next block: everything accumulated since the last call.
    pub fn produce_block(&mut self) -> (u64, JBlockHash, Vec<JurisdictionEvent>) {
        self.height += 1;
        let hash = JBlockHash(blake3_hash(&self.height.to_be_bytes()));
        let events = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|mut e| {
                e.block_number = self.height;
                e.block_hash = hash;
                e
            })
            .collect();
        (self.height, hash, events)
    }

    fn emit(&mut self, kind: JEventKind) {
        let seq = self.pending.len() as u64;
        let mut seed = self.height.to_be_bytes().to_vec();
        seed.extend_from_slice(&seq.to_be_bytes());
        self.pending.push(JurisdictionEvent {
            block_number: 0,
            block_hash: JBlockHash([0u8; 32]),
            tx_hash: JTxHash(blake3_hash(&seed)),
            kind,
        });
    }

    fn emit_settled(&mut self, left: EntityId, right: EntityId, token: TokenId) {
        let state = self.pairs.entry(pair_key(left, right, token)).or_default();
        let (collateral, ondelta, nonce) = (state.collateral, state.ondelta, state.nonce);
        let left_reserve = self.reserve(left, token);
        let right_reserve = self.reserve(right, token);
        self.emit(JEventKind::AccountSettled {
            left_entity: left,
            right_entity: right,
            token_id: token,
            left_reserve,
            right_reserve,
            collateral,
            ondelta,
            nonce,
        });
    }
}

impl JurisdictionAdapter for SimJurisdiction {
    fn get_account_info(
        &self,
        left: &EntityId,
        right: &EntityId,
    ) -> Result<AccountInfo, XlnError> {
        // Dispute timeout is a chain parameter in the sim.
        let nonce = self
            .pairs
            .iter()
            .filter(|((l, r, _), _)| (l, r) == (left, right) || (l, r) == (right, left))
            .map(|(_, s)| s.nonce)
            .max()
            .unwrap_or(0);
        Ok(AccountInfo {
            nonce,
            dispute_timeout: 100,
        })
    }

    fn get_collateral(
        &self,
        left: &EntityId,
        right: &EntityId,
        token_id: TokenId,
    ) -> Result<Amount, XlnError> {
        Ok(self
            .pairs
            .get(&pair_key(*left, *right, token_id))
            .map(|s| s.collateral)
            .unwrap_or(0))
    }

    fn submit_batch(&mut self, submission: JBatchSubmission) -> Result<(), XlnError> {
        let payer = submission.entity_id;

        // Atomic execution: validate everything before touching state.
        let mut needed: BTreeMap<TokenId, Amount> = BTreeMap::new();
        for op in &submission.batch.reserve_to_reserve {
            *needed.entry(op.token_id).or_insert(0) += op.amount;
        }
        for op in &submission.batch.reserve_to_collateral {
            *needed.entry(op.token_id).or_insert(0) += op.amount;
        }
        let feasible = needed
            .iter()
            .all(|(token, amount)| self.reserve(payer, *token) >= *amount);

        if !feasible {
            info!(entity = %payer, "sim: batch rejected (insufficient reserve)");
            self.emit(JEventKind::HankoBatchProcessed {
                entity_id: payer,
                hanko_hash: submission.batch_hash,
                nonce: submission.entity_nonce,
                success: false,
                op_count: submission.batch.op_count() as u32,
            });
            return Ok(());
        }

        for op in &submission.batch.reserve_to_reserve {
            *self.reserves.entry((payer, op.token_id)).or_insert(0) -= op.amount;
            *self.reserves.entry((op.to, op.token_id)).or_insert(0) += op.amount;
            let payer_balance = self.reserve(payer, op.token_id);
            let to_balance = self.reserve(op.to, op.token_id);
            self.emit(JEventKind::ReserveUpdated {
                entity: payer,
                token_id: op.token_id,
                new_balance: payer_balance,
            });
            self.emit(JEventKind::ReserveUpdated {
                entity: op.to,
                token_id: op.token_id,
                new_balance: to_balance,
            });
        }

        for op in &submission.batch.reserve_to_collateral {
            *self.reserves.entry((payer, op.token_id)).or_insert(0) -= op.amount;
            let (left, right, token) = pair_key(payer, op.counterparty, op.token_id);
            {
                let state = self.pairs.entry((left, right, token)).or_default();
                state.collateral += op.amount;
                // The delta is right-favoring: a deposit credited to the
                // right side shifts ondelta by its amount.
                if op.receiver == right {
                    state.ondelta += op.amount;
                }
                state.nonce += 1;
            }
            let payer_balance = self.reserve(payer, op.token_id);
            self.emit(JEventKind::ReserveUpdated {
                entity: payer,
                token_id: op.token_id,
                new_balance: payer_balance,
            });
            self.emit_settled(left, right, token);
        }

        for op in &submission.batch.settlements {
            let (left, right, _) = pair_key(payer, op.counterparty, 0);
            for diff in &op.diffs {
                {
                    let state = self.pairs.entry((left, right, diff.token_id)).or_default();
                    state.collateral += diff.collateral_delta;
                    state.ondelta += diff.ondelta_delta;
                    state.nonce += 1;
                }
                // Withdrawn collateral returns to the submitter's reserve.
                if diff.collateral_delta < 0 {
                    *self.reserves.entry((payer, diff.token_id)).or_insert(0) +=
                        -diff.collateral_delta;
                } else {
                    *self.reserves.entry((payer, diff.token_id)).or_insert(0) -=
                        diff.collateral_delta;
                }
                let payer_balance = self.reserve(payer, diff.token_id);
                self.emit(JEventKind::ReserveUpdated {
                    entity: payer,
                    token_id: diff.token_id,
                    new_balance: payer_balance,
                });
                self.emit_settled(left, right, diff.token_id);
            }
        }

        self.emit(JEventKind::HankoBatchProcessed {
            entity_id: payer,
            hanko_hash: submission.batch_hash,
            nonce: submission.entity_nonce,
            success: true,
            op_count: submission.batch.op_count() as u32,
        });
        info!(
            entity = %payer,
            nonce = submission.entity_nonce,
            ops = submission.batch.op_count(),
            "sim: batch executed"
        );
        Ok(())
    }
}
