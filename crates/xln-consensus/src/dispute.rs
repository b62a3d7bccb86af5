//! Dispute handling: the unilateral on-chain closure path.
//!
//! `DisputeStarted` freezes the account (observability operations only),
//! reconciles authoritative facts from the adapter, checks our local proof
//! against the on-chain claim, and extracts any HTLC secrets the initiator
//! revealed in its dispute arguments. `DisputeFinalized` resyncs the nonce
//! and reactivates the account; collateral movement only ever arrives via a
//! subsequent `AccountSettled`.

use tracing::{error, info, warn};

use xln_account::{build_proof, machine};
use xln_core::account::{AccountStatus, ActiveDispute, DisputeProof, LogCategory};
use xln_core::constants::FALLBACK_DISPUTE_TIMEOUT_BLOCKS;
use xln_core::tx::{AccountInput, FrameEffect};
use xln_core::types::{EntityId, Nonce, ProofHash, Secret};
use xln_crypto::hashlock_from_secret;
use xln_entity::{AccountInfo, EntityRuntime, JurisdictionAdapter};

/// React to a `DisputeStarted` event involving this entity.
#[allow(clippy::too_many_arguments)]
pub fn on_started(
    rt: &mut EntityRuntime,
    sender: EntityId,
    counterentity: EntityId,
    nonce: Nonce,
    proofbody_hash: ProofHash,
    initial_arguments: &[Vec<u8>],
    adapter: &mut dyn JurisdictionAdapter,
    outbox: &mut Vec<AccountInput>,
) {
    let ours = rt.entity.entity_id;
    let counterparty = if sender == ours {
        counterentity
    } else if counterentity == ours {
        sender
    } else {
        return;
    };

    let info = account_info_or_fallback(rt, &counterparty, adapter);
    let now = rt.entity.timestamp;
    let account = rt.entity.account_mut(counterparty);

    machine::discard_pending(account, now);
    account.status = AccountStatus::Disputed;
    let started_by_left = account.is_left(&sender);
    account.active_dispute = Some(ActiveDispute {
        started_by_left,
        initial_proofbody_hash: proofbody_hash,
        initial_nonce: nonce,
        dispute_timeout: info.dispute_timeout,
        on_chain_nonce: info.nonce,
        initial_arguments: initial_arguments.to_vec(),
    });

    // Consensus divergence audit: our re-enacted proof must match what the
    // initiator submitted for the same nonce. A mismatch is logged and kept
    // for forensics; it never halts the entity.
    let local = build_proof(account);
    if account.proof_header.nonce == nonce && local.hash != proofbody_hash {
        error!(
            nonce,
            local = %local.hash,
            on_chain = %proofbody_hash,
            "CRITICAL: dispute proof diverges from local state at the same nonce"
        );
        account.log(
            now,
            LogCategory::Dispute,
            format!("proof divergence at nonce {nonce}; audit required"),
        );
    } else if account.proof_header.nonce > nonce {
        // Stale proof submitted: our newer counter-signed proof wins the
        // dispute window. The operator submits it (see `counter_proofs`).
        info!(
            stale = nonce,
            ours = account.proof_header.nonce,
            "stale dispute proof detected; counter-proof available"
        );
        account.log(
            now,
            LogCategory::Dispute,
            format!(
                "counterparty disputed with stale nonce {nonce}; countering at {}",
                account.proof_header.nonce
            ),
        );
    }
    account.log(now, LogCategory::Dispute, "dispute opened; account frozen");

    // Secrets revealed in the dispute arguments are implicit on-chain
    // reveals: propagate them through the HTLC routes.
    for secret in decode_argument_secrets(initial_arguments) {
        let hashlock = hashlock_from_secret(&secret);
        if let Err(e) = rt.consume_effects(
            vec![FrameEffect::SecretLearned { hashlock, secret }],
            outbox,
        ) {
            warn!(error = %e, "dispute secret propagation failed");
        }
    }
}

/// React to a `DisputeFinalized` event involving this entity.
pub fn on_finalized(
    rt: &mut EntityRuntime,
    sender: EntityId,
    counterentity: EntityId,
    final_proofbody_hash: ProofHash,
    adapter: &mut dyn JurisdictionAdapter,
) {
    let ours = rt.entity.entity_id;
    let counterparty = if sender == ours {
        counterentity
    } else if counterentity == ours {
        sender
    } else {
        return;
    };

    let info = account_info_or_fallback(rt, &counterparty, adapter);
    let now = rt.entity.timestamp;
    let account = rt.entity.account_mut(counterparty);

    machine::discard_pending(account, now);
    account.on_chain_settlement_nonce = info.nonce;
    account.proof_header.nonce = account.proof_header.nonce.max(info.nonce + 1);
    // Counterparty snapshots belong to the pre-finalization epoch.
    account.counterparty_dispute_proof = None;
    account.rollback_count = 0;
    account.active_dispute = None;
    account.status = AccountStatus::Active;

    // Deltas are not mutated here: movement must arrive as AccountSettled.
    let local = build_proof(account);
    if local.hash != final_proofbody_hash {
        warn!(
            local = %local.hash,
            on_chain = %final_proofbody_hash,
            "post-dispute drift: local proof differs from finalized proof; awaiting settlement"
        );
    }
    let (left, right) = (account.left_entity, account.right_entity);
    let drifted: Vec<(u32, i128, i128)> = account
        .deltas
        .iter()
        .filter_map(|(token_id, delta)| {
            let on_chain = adapter.get_collateral(&left, &right, *token_id).ok()?;
            (on_chain != delta.collateral).then_some((*token_id, delta.collateral, on_chain))
        })
        .collect();
    for (token_id, local_collateral, on_chain) in drifted {
        warn!(
            token = token_id,
            local = %local_collateral,
            on_chain = %on_chain,
            "collateral drift after dispute; awaiting settlement event"
        );
    }

    info!(nonce = info.nonce, "dispute finalized; account active again");
    account.log(now, LogCategory::Dispute, "dispute finalized; account active");
}

/// Accounts whose latest counter-signed proof outranks the dispute the
/// counterparty opened. The operator submits these to the chain.
pub fn counter_proofs(rt: &EntityRuntime) -> Vec<(EntityId, DisputeProof)> {
    rt.entity
        .accounts
        .iter()
        .filter_map(|(cp, account)| {
            let dispute = account.active_dispute.as_ref()?;
            let proof = account.current_dispute_proof.as_ref()?;
            (account.status == AccountStatus::Disputed && proof.nonce > dispute.initial_nonce)
                .then(|| (*cp, proof.clone()))
        })
        .collect()
}

fn account_info_or_fallback(
    rt: &EntityRuntime,
    counterparty: &EntityId,
    adapter: &mut dyn JurisdictionAdapter,
) -> AccountInfo {
    match adapter.get_account_info(&rt.entity.entity_id, counterparty) {
        Ok(info) => info,
        Err(e) => {
            // Back-pressure, never blocking: fall back to local facts and
            // reconcile when the adapter returns.
            warn!(error = %e, "adapter unavailable during dispute; using local nonce");
            let nonce = rt
                .entity
                .accounts
                .get(counterparty)
                .map(|a| a.on_chain_settlement_nonce)
                .unwrap_or(0);
            AccountInfo {
                nonce,
                dispute_timeout: FALLBACK_DISPUTE_TIMEOUT_BLOCKS,
            }
        }
    }
}

/// Decode the transformer argument format: entry 0 holds big-endian `u32`
/// lock indices, entry 1 the matching 32-byte secrets. Extra entries and
/// ragged tails are dropped with a warning.
pub fn decode_argument_secrets(arguments: &[Vec<u8>]) -> Vec<Secret> {
    if arguments.len() < 2 {
        if !arguments.is_empty() {
            warn!("dispute arguments truncated; no secrets decoded");
        }
        return Vec::new();
    }
    let indices = &arguments[0];
    let secrets = &arguments[1];
    if indices.len() % 4 != 0 || secrets.len() % 32 != 0 {
        warn!("malformed dispute arguments; dropping");
        return Vec::new();
    }
    let pairs = (indices.len() / 4).min(secrets.len() / 32);
    (0..pairs)
        .map(|i| {
            let mut s = [0u8; 32];
            s.copy_from_slice(&secrets[i * 32..(i + 1) * 32]);
            Secret(s)
        })
        .collect()
}
