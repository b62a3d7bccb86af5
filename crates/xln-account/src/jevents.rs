//! Bilateral (2-of-2) j-event consensus, account half.
//!
//! Each side's entity, upon finalizing a j-block that touches this account,
//! claims the event batch through the account's frame flow (`j_event_claim`).
//! Only when both sides have claimed the identical normalized batch for the
//! same `(j_height, j_block_hash)` do the shared `collateral`/`ondelta`
//! fields move. Divergent claims are never applied — both sides must
//! re-observe; there is nothing to roll back because nothing was written.

use tracing::{error, info, warn};

use xln_core::account::{Account, DisputeProof, LogCategory};
use xln_core::error::XlnError;
use xln_core::event::{canonical_multiset_eq, JEventKind, JurisdictionEvent};
use xln_core::tx::JBlockFinalized;
use xln_core::types::{Amount, JBlockHash, Timestamp};

/// Store one side's claimed j-event batch (`j_event_claim`).
pub fn store_claim(
    account: &mut Account,
    by_left: bool,
    j_height: u64,
    j_block_hash: JBlockHash,
    events: Vec<JurisdictionEvent>,
    observed_at: Timestamp,
) -> Result<(), XlnError> {
    if j_height <= account.last_finalized_j_height && account.last_finalized_j_height > 0 {
        // Replayed claim for an already-finalized height; harmless.
        return Ok(());
    }
    let side = if by_left {
        &mut account.left_j_observations
    } else {
        &mut account.right_j_observations
    };
    if side
        .iter()
        .any(|o| o.j_height == j_height && o.j_block_hash == j_block_hash)
    {
        return Ok(());
    }
    side.push(JBlockFinalized {
        j_height,
        j_block_hash,
        events: events.iter().map(|e| e.normalize()).collect(),
        finalized_at: observed_at,
        signer_count: 0,
    });
    Ok(())
}

/// Match left and right claims and apply every batch both sides agree on.
///
/// Returns the heights finalized in this pass.
pub fn try_finalize(account: &mut Account, now: Timestamp) -> Vec<u64> {
    let mut finalized = Vec::new();

    loop {
        // Find the lowest height claimed by both sides.
        let candidate = account
            .left_j_observations
            .iter()
            .filter_map(|l| {
                account
                    .right_j_observations
                    .iter()
                    .find(|r| r.j_height == l.j_height && r.j_block_hash == l.j_block_hash)
                    .map(|_| (l.j_height, l.j_block_hash))
            })
            .min_by_key(|(h, _)| *h);

        let Some((height, hash)) = candidate else {
            break;
        };

        let left = account
            .left_j_observations
            .iter()
            .find(|o| o.j_height == height && o.j_block_hash == hash)
            .cloned()
            .expect("candidate implies left claim");
        let right = account
            .right_j_observations
            .iter()
            .find(|o| o.j_height == height && o.j_block_hash == hash)
            .cloned()
            .expect("candidate implies right claim");

        if !canonical_multiset_eq(&left.events, &right.events) {
            error!(
                j_height = height,
                left = %account.left_entity,
                right = %account.right_entity,
                "bilateral j-event divergence: claimed batches differ; not applying"
            );
            account.log(
                now,
                LogCategory::JEvent,
                format!("j-event divergence at height {height}; batch withheld"),
            );
            // Keep the claims: both sides must re-observe before this height
            // can ever apply.
            break;
        }

        for event in &left.events {
            apply_settled_event(account, event, now);
        }

        account
            .left_j_observations
            .retain(|o| !(o.j_height == height && o.j_block_hash == hash));
        account
            .right_j_observations
            .retain(|o| !(o.j_height == height && o.j_block_hash == hash));
        account.j_event_chain.push(JBlockFinalized {
            j_height: height,
            j_block_hash: hash,
            events: left.events.clone(),
            finalized_at: now,
            signer_count: 2,
        });
        if height > account.last_finalized_j_height {
            account.last_finalized_j_height = height;
        }
        finalized.push(height);
    }

    finalized
}

/// Apply one bilaterally-agreed event to the shared account state.
fn apply_settled_event(account: &mut Account, event: &JurisdictionEvent, now: Timestamp) {
    let JEventKind::AccountSettled {
        left_entity,
        right_entity,
        token_id,
        collateral,
        ondelta,
        nonce,
        ..
    } = &event.kind
    else {
        // Only settlements touch shared account state; the entity layer
        // handles everything else before it reaches the account.
        return;
    };
    if *left_entity != account.left_entity || *right_entity != account.right_entity {
        warn!("settled event routed to wrong account; ignoring");
        return;
    }

    let old_collateral = account
        .deltas
        .get(token_id)
        .map(|d| d.collateral)
        .unwrap_or(0);

    let delta = account.delta_mut(*token_id, 0);
    delta.collateral = *collateral;
    delta.ondelta = *ondelta;

    // Set, never increment: a dispute may have consumed nonces on-chain.
    account.on_chain_settlement_nonce = *nonce;

    settle_rebalance_progress(account, *token_id, *collateral - old_collateral);
    activate_post_settlement_proof(account);

    info!(
        token = token_id,
        collateral = %collateral,
        nonce = nonce,
        "account settlement finalized bilaterally"
    );
    account.log(
        now,
        LogCategory::Settlement,
        format!(
            "on-chain settlement applied: token {token_id}, collateral {collateral}, nonce {nonce}"
        ),
    );
}

/// Fulfil or shrink a pending rebalance request by the realized collateral
/// increase; partial fills re-open the j-batch cycle.
fn settle_rebalance_progress(account: &mut Account, token_id: u32, collateral_increase: Amount) {
    let Some(requested) = account.requested_rebalance.get(&token_id).copied() else {
        return;
    };
    if collateral_increase <= 0 {
        return;
    }
    if collateral_increase >= requested {
        account.requested_rebalance.remove(&token_id);
        account.requested_rebalance_fee_state = Default::default();
        account.active_rebalance_quote = None;
    } else {
        account
            .requested_rebalance
            .insert(token_id, requested - collateral_increase);
        // Allow another deposit cycle.
        account.requested_rebalance_fee_state.j_batch_submitted_at = None;
    }
}

/// Promote the pre-signed post-settlement proof to the current dispute proof
/// and clear the workspace.
fn activate_post_settlement_proof(account: &mut Account) {
    let Some(ws) = account.settlement_workspace.take() else {
        return;
    };
    match ws.post_settlement_proof {
        Some(post) => {
            // The nonce advances on both replicas whether or not the peer
            // hanko has arrived yet; frame numbering must not diverge.
            account.proof_header.nonce = account.proof_header.nonce.max(post.nonce);
            match post.peer_hanko {
                Some(hanko) => {
                    account.current_dispute_proof = Some(DisputeProof {
                        nonce: post.nonce,
                        body_hash: post.body_hash,
                        hanko,
                    });
                }
                None => warn!(
                    "post-settlement proof lacked the peer hanko; keeping previous dispute proof"
                ),
            }
        }
        None => warn!("settlement finalized without a pre-computed post proof"),
    }
}

