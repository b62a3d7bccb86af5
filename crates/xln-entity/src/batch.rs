//! The j-batch accumulator: entity-local on-chain operations merged into one
//! Depository transaction.
//!
//! Lifecycle: empty → accumulating → pending (broadcast) → confirmed or
//! failed. A failed batch is atomic on-chain — none of its operations
//! applied — so its contents merge back into the live batch for retry. The
//! entity nonce is always resynced from the confirming event; local
//! increments are optimistic bookkeeping only.

use tracing::{info, warn};

use xln_core::entity::{
    BatchRecord, Entity, JBatchStatus, ReserveToCollateralOp, ReserveToReserveOp, SentBatch,
    SettleOp,
};
use xln_core::error::XlnError;
use xln_core::types::ProofHash;
use xln_crypto::{blake3_hash, KeyPair};

use crate::adapter::JBatchSubmission;

pub fn add_reserve_to_reserve(entity: &mut Entity, op: ReserveToReserveOp) {
    entity.j_batch.batch.reserve_to_reserve.push(op);
    entity.j_batch.status = JBatchStatus::Accumulating;
}

pub fn add_reserve_to_collateral(entity: &mut Entity, op: ReserveToCollateralOp) {
    entity.j_batch.batch.reserve_to_collateral.push(op);
    entity.j_batch.status = JBatchStatus::Accumulating;
}

pub fn add_settlement(entity: &mut Entity, op: SettleOp) {
    entity.j_batch.batch.settlements.push(op);
    entity.j_batch.status = JBatchStatus::Accumulating;
}

/// Capture the live batch for broadcast.
///
/// The captured operations move to `sent_batch`; the live batch resets so
/// accumulation continues while the broadcast is in flight.
pub fn broadcast(entity: &mut Entity, signer: &KeyPair) -> Result<JBatchSubmission, XlnError> {
    if entity.j_batch.batch.is_empty() {
        return Err(XlnError::BatchEmpty);
    }
    if entity.j_batch.sent_batch.is_some() {
        return Err(XlnError::BatchPending);
    }

    let batch = std::mem::take(&mut entity.j_batch.batch);
    let entity_nonce = entity.j_batch.entity_nonce + 1;
    let encoded = bincode::serialize(&(&batch, entity_nonce))
        .map_err(|e| XlnError::Serialization(e.to_string()))?;
    let batch_hash = blake3_hash(&encoded);
    let hanko = signer.sign_proof(&ProofHash::from_bytes(batch_hash));

    entity.j_batch.sent_batch = Some(SentBatch {
        batch: batch.clone(),
        entity_nonce,
        batch_hash,
        sent_at: entity.timestamp,
    });
    entity.j_batch.status = JBatchStatus::Pending;

    info!(
        nonce = entity_nonce,
        ops = batch.op_count(),
        "j-batch captured for broadcast"
    );
    Ok(JBatchSubmission {
        entity_id: entity.entity_id,
        entity_nonce,
        batch_hash,
        batch,
        hanko,
    })
}

/// Fold a `HankoBatchProcessed` outcome into the accumulator.
pub fn finalize(entity: &mut Entity, event_nonce: u64, success: bool, op_count: u32) {
    // Replayed nonce-only notification: sync the nonce, nothing else.
    if op_count == 0 && entity.j_batch.sent_batch.is_none() {
        entity.j_batch.entity_nonce = entity.j_batch.entity_nonce.max(event_nonce);
        return;
    }

    let Some(sent) = entity.j_batch.sent_batch.take() else {
        warn!(event_nonce, "batch outcome without a pending batch; syncing nonce only");
        entity.j_batch.entity_nonce = entity.j_batch.entity_nonce.max(event_nonce);
        return;
    };

    // Authoritative sync — never trust the optimistic local increment.
    entity.j_batch.entity_nonce = entity.j_batch.entity_nonce.max(event_nonce);

    if success {
        entity.batch_history.push(BatchRecord {
            entity_nonce: sent.entity_nonce,
            batch_hash: sent.batch_hash,
            op_count: sent.batch.op_count() as u32,
            confirmed_at: entity.timestamp,
        });
        let limit = entity.config.batch_history_limit;
        if entity.batch_history.len() > limit {
            let drop = entity.batch_history.len() - limit;
            entity.batch_history.drain(..drop);
        }
        entity.j_batch.status = if entity.j_batch.batch.is_empty() {
            JBatchStatus::Empty
        } else {
            JBatchStatus::Accumulating
        };
        info!(nonce = sent.entity_nonce, "j-batch confirmed on-chain");
    } else {
        // Atomic on-chain: none of the operations applied. Return them to
        // the live batch, ahead of anything accumulated since.
        let mut live = std::mem::take(&mut entity.j_batch.batch);
        live.merge_front(sent.batch);
        entity.j_batch.batch = live;
        entity.j_batch.failed_attempts += 1;
        entity.j_batch.status = JBatchStatus::Accumulating;

        // Unfreeze in-flight rebalance fee states so deposits can retry.
        for account in entity.accounts.values_mut() {
            if account.requested_rebalance_fee_state.j_batch_submitted_at.is_some() {
                account.requested_rebalance_fee_state.j_batch_submitted_at = None;
            }
        }
        warn!(
            nonce = sent.entity_nonce,
            attempts = entity.j_batch.failed_attempts,
            "j-batch failed on-chain; operations requeued"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_core::entity::{EntityConfig, JBatch};
    use xln_core::types::{EntityId, TokenId};

    const TOKEN: TokenId = 1;

    fn entity_with_signer() -> (Entity, KeyPair) {
        let kp = KeyPair::generate();
        let entity = Entity::new(kp.entity_id, EntityConfig::single(kp.signer_id));
        (entity, kp)
    }

    fn r2c(entity: &Entity, amount: i128) -> ReserveToCollateralOp {
        ReserveToCollateralOp {
            counterparty: EntityId([9u8; 32]),
            receiver: entity.entity_id,
            token_id: TOKEN,
            amount,
        }
    }

    #[test]
    fn broadcast_captures_and_resets() {
        let (mut entity, kp) = entity_with_signer();
        let op = r2c(&entity, 80);
        add_reserve_to_collateral(&mut entity, op);
        assert_eq!(entity.j_batch.status, JBatchStatus::Accumulating);

        let sub = broadcast(&mut entity, &kp).unwrap();
        assert_eq!(sub.entity_nonce, 1);
        assert_eq!(sub.batch.op_count(), 1);
        assert!(entity.j_batch.batch.is_empty());
        assert_eq!(entity.j_batch.status, JBatchStatus::Pending);
        assert!(entity.j_batch.sent_batch.is_some());
    }

    #[test]
    fn empty_broadcast_rejected() {
        let (mut entity, kp) = entity_with_signer();
        assert!(matches!(broadcast(&mut entity, &kp), Err(XlnError::BatchEmpty)));
    }

    #[test]
    fn second_broadcast_while_pending_rejected() {
        let (mut entity, kp) = entity_with_signer();
        let op = r2c(&entity, 80);
        add_reserve_to_collateral(&mut entity, op);
        broadcast(&mut entity, &kp).unwrap();
        let op = r2c(&entity, 10);
        add_reserve_to_collateral(&mut entity, op);
        assert!(matches!(broadcast(&mut entity, &kp), Err(XlnError::BatchPending)));
    }

    #[test]
    fn success_confirms_and_syncs_nonce() {
        let (mut entity, kp) = entity_with_signer();
        let op = r2c(&entity, 80);
        add_reserve_to_collateral(&mut entity, op);
        broadcast(&mut entity, &kp).unwrap();

        finalize(&mut entity, 7, true, 1);
        assert!(entity.j_batch.sent_batch.is_none());
        assert_eq!(entity.j_batch.entity_nonce, 7);
        assert_eq!(entity.j_batch.status, JBatchStatus::Empty);
        assert_eq!(entity.batch_history.len(), 1);
    }

    #[test]
    fn failure_requeues_ops_for_retry() {
        let (mut entity, kp) = entity_with_signer();
        let op = r2c(&entity, 80);
        add_reserve_to_collateral(&mut entity, op);
        let op = r2c(&entity, 10);
        add_reserve_to_collateral(&mut entity, op);
        let op = r2c(&entity, 5);
        add_reserve_to_collateral(&mut entity, op);
        broadcast(&mut entity, &kp).unwrap();
        // New op accumulates while the broadcast is in flight.
        let op = r2c(&entity, 1);
        add_reserve_to_collateral(&mut entity, op);

        finalize(&mut entity, 4, false, 3);
        assert!(entity.j_batch.sent_batch.is_none());
        assert_eq!(entity.j_batch.entity_nonce, 4);
        assert_eq!(entity.j_batch.failed_attempts, 1);
        assert_eq!(entity.j_batch.batch.op_count(), 4);
        // Failed ops retry ahead of the newcomer.
        assert_eq!(entity.j_batch.batch.reserve_to_collateral[0].amount, 80);
        assert_eq!(entity.j_batch.batch.reserve_to_collateral[3].amount, 1);

        // Retry and confirm (S6 shape).
        let sub = broadcast(&mut entity, &kp).unwrap();
        assert_eq!(sub.entity_nonce, 5);
        finalize(&mut entity, 5, true, 4);
        assert_eq!(entity.j_batch.entity_nonce, 5);
        assert_eq!(entity.batch_history.len(), 1);
    }

    #[test]
    fn replayed_outcome_only_syncs_nonce() {
        let (mut entity, _) = entity_with_signer();
        finalize(&mut entity, 9, true, 0);
        assert_eq!(entity.j_batch.entity_nonce, 9);
        assert!(entity.batch_history.is_empty());
        assert_eq!(entity.j_batch.status, JBatchStatus::Empty);
    }

    #[test]
    fn history_is_bounded_by_config() {
        let (mut entity, kp) = entity_with_signer();
        entity.config.batch_history_limit = 2;
        for i in 0..4 {
            let op = r2c(&entity, 10 + i);
            add_reserve_to_collateral(&mut entity, op);
            broadcast(&mut entity, &kp).unwrap();
            let nonce = entity.j_batch.sent_batch.as_ref().unwrap().entity_nonce;
            finalize(&mut entity, nonce, true, 1);
        }
        assert_eq!(entity.batch_history.len(), 2);
        assert_eq!(entity.batch_history[1].entity_nonce, 4);
    }

    #[test]
    fn batch_merge_front_preserves_order() {
        let mut a = JBatch::default();
        a.reserve_to_reserve.push(ReserveToReserveOp {
            to: EntityId([1u8; 32]),
            token_id: TOKEN,
            amount: 1,
        });
        let mut b = JBatch::default();
        b.reserve_to_reserve.push(ReserveToReserveOp {
            to: EntityId([2u8; 32]),
            token_id: TOKEN,
            amount: 2,
        });
        // a's ops land in front of b's.
        b.merge_front(a);
        assert_eq!(b.reserve_to_reserve[0].amount, 1);
        assert_eq!(b.reserve_to_reserve[1].amount, 2);
    }
}
