//! Settlement workspace: staged, bilaterally-signed on-chain settlements.
//!
//! `settle_propose` stages diffs with the proposer's hanko; `settle_approve`
//! adds the second hanko and pre-computes the post-settlement dispute proof
//! at `nonce + 1`; `settle_execute` hands the fully-signed payload to the
//! proposer's j-batch. The workspace clears when the resulting
//! `AccountSettled` finalizes bilaterally (see `jevents`).

use tracing::warn;

use xln_core::account::{
    Account, LogCategory, PostSettlementProof, SettlementWorkspace, WorkspaceStatus,
};
use xln_core::error::XlnError;
use xln_core::tx::{FrameEffect, SettleDiff};
use xln_core::types::{Hanko, Nonce, Timestamp};

use crate::proof::build_proof_at;

/// Stage a settlement proposal (`settle_propose`).
pub fn apply_propose(
    account: &mut Account,
    by_left: bool,
    diffs: Vec<SettleDiff>,
    hanko: Hanko,
    frame_nonce: Nonce,
    now: Timestamp,
) -> Result<(), XlnError> {
    if let Some(ws) = &account.settlement_workspace {
        if ws.status != WorkspaceStatus::Proposed
            || (ws.left_hanko.is_some() && ws.right_hanko.is_some())
        {
            return Err(XlnError::WorkspaceAlreadySigned);
        }
    }
    let (left_hanko, right_hanko) = if by_left {
        (Some(hanko), None)
    } else {
        (None, Some(hanko))
    };
    account.settlement_workspace = Some(SettlementWorkspace {
        diffs,
        proposed_by_left: by_left,
        left_hanko,
        right_hanko,
        nonce_at_sign: frame_nonce,
        status: WorkspaceStatus::Proposed,
        post_settlement_proof: None,
    });
    account.log(now, LogCategory::Settlement, "settlement proposed");
    Ok(())
}

/// Approve the staged settlement (`settle_approve`).
///
/// Pre-computes the proof the pair will hold the moment the settlement lands
/// on-chain, so the latest signed proof never lags the chain. The approver's
/// hanko over that proof rides in the tx; the proposer's arrives with the
/// counter-signature.
pub fn apply_approve(
    account: &mut Account,
    by_left: bool,
    hanko: Hanko,
    approver_post_hanko: Hanko,
    our_is_left: bool,
    frame_nonce: Nonce,
    now: Timestamp,
) -> Result<(), XlnError> {
    let ws = account
        .settlement_workspace
        .as_ref()
        .ok_or(XlnError::WorkspaceMissing)?;
    if ws.status != WorkspaceStatus::Proposed || by_left == ws.proposed_by_left {
        return Err(XlnError::WorkspaceNotReady);
    }
    let diffs = ws.diffs.clone();

    // Post-settlement state: current deltas plus the staged diffs, one nonce
    // ahead of the frame carrying this approval.
    let mut post = account.clone();
    post.cloned_for_validation = None;
    for diff in &diffs {
        if let Some(d) = post.deltas.get_mut(&diff.token_id) {
            d.collateral += diff.collateral_delta;
            d.ondelta += diff.ondelta_delta;
        } else {
            warn!(token = diff.token_id, "settlement diff for unknown token");
        }
    }
    let post_proof = build_proof_at(&post, frame_nonce + 1);

    // The approver's pre-signed hanko is the peer's only when the peer
    // approved; our own copy waits for the counter-signature round-trip.
    let approver_is_peer = by_left != our_is_left;
    let peer_hanko = approver_is_peer.then_some(approver_post_hanko);

    let ws = account
        .settlement_workspace
        .as_mut()
        .expect("workspace checked above");
    if by_left {
        ws.left_hanko = Some(hanko);
    } else {
        ws.right_hanko = Some(hanko);
    }
    ws.status = WorkspaceStatus::ReadyToSubmit;
    ws.post_settlement_proof = Some(PostSettlementProof {
        nonce: frame_nonce + 1,
        body_hash: post_proof.hash,
        peer_hanko,
    });
    account.log(now, LogCategory::Settlement, "settlement approved");
    Ok(())
}

/// Execute the fully-signed settlement (`settle_execute`).
///
/// Emits the `SubmitSettlement` effect only on the executing side; the peer
/// merely marks the workspace submitted.
pub fn apply_execute(
    account: &mut Account,
    by_left: bool,
    our_is_left: bool,
    now: Timestamp,
    effects: &mut Vec<FrameEffect>,
) -> Result<(), XlnError> {
    let ws = account
        .settlement_workspace
        .as_mut()
        .ok_or(XlnError::WorkspaceMissing)?;
    if ws.status != WorkspaceStatus::ReadyToSubmit {
        return Err(XlnError::WorkspaceNotReady);
    }
    let (Some(left_hanko), Some(right_hanko)) = (ws.left_hanko.clone(), ws.right_hanko.clone())
    else {
        return Err(XlnError::WorkspaceNotReady);
    };
    let diffs = ws.diffs.clone();
    ws.status = WorkspaceStatus::Submitted;

    if by_left == our_is_left {
        let counterparty = if our_is_left {
            account.right_entity
        } else {
            account.left_entity
        };
        effects.push(FrameEffect::SubmitSettlement {
            counterparty,
            diffs,
            left_hanko,
            right_hanko,
        });
    }
    account.log(now, LogCategory::Settlement, "settlement queued for broadcast");
    Ok(())
}
