//! Application of finalized j-events to entity state.
//!
//! Reserve updates and batch outcomes mutate the entity directly. Account
//! settlements touch shared bilateral state, so they are never applied
//! unilaterally: each entity updates only its own reserve and routes the
//! event through the counterparty's agreement as a `j_event_claim` (the
//! account machine finalizes it 2-of-2). Malformed or foreign events are
//! dropped with a warning; the rest of the block continues.

use tracing::{debug, info, warn};

use xln_account::machine;
use xln_core::account::LogCategory;
use xln_core::event::{JEventKind, JurisdictionEvent};
use xln_core::tx::{AccountInput, AccountTx, FrameEffect, JBlockFinalized};
use xln_entity::{EntityRuntime, JurisdictionAdapter};

use crate::dispute;

/// Apply every event of a finalized j-block.
pub fn apply_block(
    rt: &mut EntityRuntime,
    block: &JBlockFinalized,
    adapter: &mut dyn JurisdictionAdapter,
    outbox: &mut Vec<AccountInput>,
) {
    for event in &block.events {
        apply_event(rt, block, event, adapter, outbox);
    }
}

fn apply_event(
    rt: &mut EntityRuntime,
    block: &JBlockFinalized,
    event: &JurisdictionEvent,
    adapter: &mut dyn JurisdictionAdapter,
    outbox: &mut Vec<AccountInput>,
) {
    let ours = rt.entity.entity_id;
    match &event.kind {
        JEventKind::ReserveUpdated {
            entity,
            token_id,
            new_balance,
        } => {
            if *entity != ours {
                return;
            }
            rt.entity.reserves.insert(*token_id, *new_balance);
            rt.entity.log(
                LogCategory::JEvent,
                format!("reserve of token {} now {}", token_id, new_balance),
            );
        }

        JEventKind::AccountSettled {
            left_entity,
            right_entity,
            token_id,
            left_reserve,
            right_reserve,
            ..
        } => {
            let (counterparty, own_reserve) = if *left_entity == ours {
                (*right_entity, *left_reserve)
            } else if *right_entity == ours {
                (*left_entity, *right_reserve)
            } else {
                debug!("settlement for a foreign pair; ignoring");
                return;
            };

            // Unilateral application to shared account state is forbidden:
            // only our own reserve moves here. The deltas move when both
            // sides have claimed the identical event (2-of-2).
            rt.entity.reserves.insert(*token_id, own_reserve);

            let claim = AccountTx::JEventClaim {
                j_height: block.j_height,
                j_block_hash: block.j_block_hash,
                events: vec![event.clone()],
                observed_at: rt.entity.timestamp,
            };
            let our_is_left = rt.entity.is_left_of(&counterparty);
            let now = rt.entity.timestamp;
            let dcl = rt.entity.config.default_credit_limit;
            let account = rt.entity.account_mut(counterparty);
            if let Err(e) = machine::enqueue(account, our_is_left, claim, now, dcl) {
                warn!(error = %e, "j-event claim rejected at admission");
                return;
            }
            if let Err(e) = rt.propose_for(counterparty, outbox) {
                warn!(error = %e, "claim frame proposal failed");
            }
        }

        JEventKind::SecretRevealed { hashlock, secret } => {
            info!(hashlock = %hashlock, "secret revealed on-chain");
            if let Err(e) = rt.consume_effects(
                vec![FrameEffect::SecretLearned {
                    hashlock: *hashlock,
                    secret: *secret,
                }],
                outbox,
            ) {
                warn!(error = %e, "on-chain secret propagation failed");
            }
        }

        JEventKind::HankoBatchProcessed {
            entity_id,
            nonce,
            success,
            op_count,
            ..
        } => {
            if *entity_id != ours {
                return;
            }
            xln_entity::batch::finalize(&mut rt.entity, *nonce, *success, *op_count);
            rt.entity.log(
                LogCategory::JEvent,
                format!(
                    "j-batch nonce {} {}",
                    nonce,
                    if *success { "confirmed" } else { "failed" }
                ),
            );
        }

        JEventKind::DisputeStarted {
            sender,
            counterentity,
            nonce,
            proofbody_hash,
            initial_arguments,
        } => dispute::on_started(
            rt,
            *sender,
            *counterentity,
            *nonce,
            *proofbody_hash,
            initial_arguments,
            adapter,
            outbox,
        ),

        JEventKind::DisputeFinalized {
            sender,
            counterentity,
            final_proofbody_hash,
            ..
        } => dispute::on_finalized(rt, *sender, *counterentity, *final_proofbody_hash, adapter),

        JEventKind::DebtCreated | JEventKind::DebtEnforced => {
            debug!("reserved j-event kind; ignored");
        }
    }
}
