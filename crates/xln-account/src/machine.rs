//! The account state machine: mempool → propose → counter-sign → commit,
//! with deterministic rollback on concurrent proposals.
//!
//! One machine instance exists per account per entity; the owning entity
//! serializes all inputs. Proposing applies the frame's transactions
//! optimistically and keeps a pre-proposal snapshot; the state only counts
//! as committed once the peer's counter-signature arrives. The committed
//! nonce never decreases, including across rollbacks.

use tracing::{debug, error, info, warn};

use xln_core::account::{Account, AccountStatus, DisputeProof, LogCategory};
use xln_core::constants::{MAX_DESCRIPTION_BYTES, MAX_FRAME_TXS, QUOTE_EXPIRY_MS};
use xln_core::error::XlnError;
use xln_core::tx::{AccountFrame, AccountInput, AccountTx, FrameEffect};
use xln_core::types::{Amount, DilithiumPublicKey, Nonce, Timestamp};
use xln_crypto::{verify_hanko, KeyPair};

use crate::htlc;
use crate::jevents;
use crate::proof::build_proof_at;
use crate::settle;

// ── Results ──────────────────────────────────────────────────────────────────

/// Outcome of feeding one `AccountInput` to the machine.
#[derive(Debug, Default)]
pub struct HandleResult {
    /// Input to send back to the peer, if any.
    pub reply: Option<AccountInput>,
    /// Nonce of the frame committed by this input, if one committed.
    pub committed: Option<Nonce>,
    /// Effects of committed transactions, for the entity layer.
    pub effects: Vec<FrameEffect>,
}

// ── Mempool admission ────────────────────────────────────────────────────────

/// Validate and append an account transaction to the mempool.
///
/// Admission checks feasibility against current state; the authoritative
/// check re-runs when the frame is built. While disputed, only j-event
/// claims are admitted.
pub fn enqueue(
    account: &mut Account,
    our_is_left: bool,
    tx: AccountTx,
    now: Timestamp,
    default_credit_limit: Amount,
) -> Result<(), XlnError> {
    if account.status == AccountStatus::Disputed && !matches!(tx, AccountTx::JEventClaim { .. }) {
        return Err(XlnError::AccountDisputed);
    }

    match &tx {
        AccountTx::DirectPayment {
            from,
            to,
            token_id,
            amount,
            description,
        } => {
            if *amount <= 0 {
                return Err(XlnError::ZeroAmount);
            }
            // Only payments from our own side can ever apply; a queued
            // peer-originated payment would cycle in the mempool forever.
            let our_entity = if our_is_left {
                account.left_entity
            } else {
                account.right_entity
            };
            if *from != our_entity || *to != account.counterparty_of(&our_entity) {
                return Err(XlnError::WrongAccountPair);
            }
            if let Some(d) = description {
                if d.len() > MAX_DESCRIPTION_BYTES {
                    return Err(XlnError::DescriptionTooLong {
                        max: MAX_DESCRIPTION_BYTES,
                    });
                }
            }
            account.delta_mut(*token_id, default_credit_limit);
            let sender_is_left = *from == account.left_entity;
            let available = htlc::available_capacity(account, *token_id, sender_is_left);
            if available < *amount {
                return Err(XlnError::InsufficientCapacity {
                    need: *amount,
                    have: available,
                });
            }
        }
        AccountTx::HtlcAdd {
            lock_id,
            amount,
            expiry,
            token_id,
            ..
        } => {
            if *amount <= 0 {
                return Err(XlnError::ZeroAmount);
            }
            if *expiry < now {
                return Err(XlnError::ExpiryInPast);
            }
            if account.locks.contains_key(lock_id) {
                return Err(XlnError::DuplicateLock(lock_id.to_hex()));
            }
            account.delta_mut(*token_id, default_credit_limit);
            let available = htlc::available_capacity(account, *token_id, our_is_left);
            if available < *amount {
                return Err(XlnError::InsufficientCapacity {
                    need: *amount,
                    have: available,
                });
            }
        }
        AccountTx::HtlcResolve { lock_id, .. } => {
            if !account.locks.contains_key(lock_id) {
                return Err(XlnError::LockNotFound(lock_id.to_hex()));
            }
        }
        AccountTx::RebalanceAccept { quote_id } => {
            let quote = account
                .active_rebalance_quote
                .as_ref()
                .ok_or(XlnError::NoActiveQuote)?;
            if quote.quote_id != *quote_id {
                return Err(XlnError::QuoteMismatch {
                    expected: quote.quote_id,
                    got: *quote_id,
                });
            }
            if now - quote.quote_id > QUOTE_EXPIRY_MS {
                return Err(XlnError::QuoteExpired {
                    issued_at: quote.quote_id,
                });
            }
        }
        AccountTx::SetRebalancePolicy {
            policy: Some(policy),
            ..
        } => {
            if policy.top_up <= 0 || policy.min_in_collateral < 0 {
                return Err(XlnError::ZeroAmount);
            }
        }
        _ => {}
    }

    account.mempool.push(tx);
    Ok(())
}

// ── Frame proposal ───────────────────────────────────────────────────────────

/// Drain the mempool into a signed frame proposal, if the machine is idle.
///
/// Returns the `AccountInput` to send to the counterparty, or `None` when
/// there is nothing to do (empty mempool, pending frame, or dispute).
pub fn propose_frame(
    account: &mut Account,
    our_is_left: bool,
    now: Timestamp,
    signer: &KeyPair,
    default_credit_limit: Amount,
) -> Result<Option<AccountInput>, XlnError> {
    if account.status != AccountStatus::Active
        || account.pending_frame.is_some()
        || account.mempool.is_empty()
    {
        return Ok(None);
    }

    let next_nonce = account.proof_header.nonce + 1;
    let snapshot = snapshot_of(account);

    // Build the frame, deferring any transaction that fails mid-frame to the
    // back of the queue and retrying with the rest. Deferred transactions
    // get another chance in a later frame against the then-current state.
    let mut deferred: Vec<AccountTx> = Vec::new();
    let mut effects = Vec::new();
    let txs: Vec<AccountTx> = loop {
        if account.mempool.is_empty() {
            account.mempool.append(&mut deferred);
            return Ok(None);
        }
        let take = account.mempool.len().min(MAX_FRAME_TXS);
        let candidate: Vec<AccountTx> = account.mempool.drain(..take).collect();

        effects.clear();
        let mut failed: Option<(usize, XlnError)> = None;
        for (i, tx) in candidate.iter().enumerate() {
            if let Err(e) = apply_tx(
                account,
                tx,
                our_is_left,
                our_is_left,
                now,
                next_nonce,
                default_credit_limit,
                &mut effects,
            ) {
                failed = Some((i, e));
                break;
            }
        }
        match failed {
            None => break candidate,
            Some((i, e)) => {
                warn!(tx = candidate[i].tag(), error = %e, "frame aborted; tx requeued behind");
                restore_shared_state(account, (*snapshot).clone());
                account.log(now, LogCategory::System, format!("frame aborted: {e}"));
                let mut rest = candidate;
                let offender = rest.remove(i);
                deferred.push(offender);
                rest.extend(account.mempool.drain(..));
                account.mempool = rest;
            }
        }
    };
    account.mempool.append(&mut deferred);

    let proof = build_proof_at(account, next_nonce);
    let own_hanko = signer.sign_proof(&proof.hash);
    let (our_entity, counterparty) = if our_is_left {
        (account.left_entity, account.right_entity)
    } else {
        (account.right_entity, account.left_entity)
    };
    let frame = AccountFrame {
        nonce: next_nonce,
        timestamp: now,
        proposer_is_left: our_is_left,
        txs,
        proof_hash: proof.hash,
    };
    let input = AccountInput {
        from: our_entity,
        to: counterparty,
        new_frame: Some(frame.clone()),
        own_hanko: Some(own_hanko),
        counter_hanko: None,
        counter_nonce: None,
        post_proof_hanko: None,
    };

    account.pending_frame = Some(frame);
    account.pending_account_input = Some(input.clone());
    account.pending_effects = effects;
    account.cloned_for_validation = Some(snapshot);

    debug!(nonce = next_nonce, "frame proposed");
    Ok(Some(input))
}

/// Re-emit the last uncommitted proposal (inbox replay after transport loss).
pub fn resend_pending(account: &Account) -> Option<AccountInput> {
    account.pending_account_input.clone()
}

// ── Input handling ───────────────────────────────────────────────────────────

/// Feed one peer input to the machine: counter-signatures commit our pending
/// frame; proposed frames are validated, applied and counter-signed.
pub fn handle_input(
    account: &mut Account,
    our_is_left: bool,
    input: &AccountInput,
    now: Timestamp,
    signer: &KeyPair,
    peer_pk: &DilithiumPublicKey,
    default_credit_limit: Amount,
) -> Result<HandleResult, XlnError> {
    let mut result = HandleResult::default();
    let mut processed = false;

    // ── Counter-signature for our pending frame ───────────────────────────────
    if let (Some(counter_hanko), Some(counter_nonce)) = (&input.counter_hanko, input.counter_nonce)
    {
        processed = true;
        match &account.pending_frame {
            Some(pending) if pending.nonce == counter_nonce => {
                let hash = pending.proof_hash;
                let nonce = pending.nonce;
                verify_hanko(peer_pk, &hash, counter_hanko).map_err(|_| XlnError::InvalidHanko)?;

                account.proof_header.nonce = nonce;
                account.current_dispute_proof = Some(DisputeProof {
                    nonce,
                    body_hash: hash,
                    hanko: counter_hanko.clone(),
                });
                if let Some(post_hanko) = &input.post_proof_hanko {
                    attach_peer_post_proof_hanko(account, post_hanko.clone());
                }
                account.pending_frame = None;
                account.pending_account_input = None;
                account.cloned_for_validation = None;
                result.effects.append(&mut account.pending_effects);
                result.committed = Some(nonce);
                info!(nonce, "frame committed (counter-signed by peer)");
                account.log(now, LogCategory::System, format!("frame {nonce} committed"));
                jevents::try_finalize(account, now);
            }
            Some(pending) => {
                warn!(
                    got = counter_nonce,
                    expected = pending.nonce,
                    "stale counter-signature ignored"
                );
            }
            None => {
                warn!("counter-signature without a pending frame; ignoring");
            }
        }
    }

    // ── Peer-proposed frame ───────────────────────────────────────────────────
    if let (Some(frame), Some(their_hanko)) = (&input.new_frame, &input.own_hanko) {
        processed = true;
        if account.status == AccountStatus::Disputed {
            return Err(XlnError::AccountDisputed);
        }

        if account.pending_frame.is_some() {
            if our_is_left {
                // Concurrency tie: left wins. The peer will roll back and
                // counter-sign our proposal; ignore theirs.
                debug!("concurrent proposal ignored (we are left; peer rolls back)");
                return Ok(result);
            }
            rollback_pending(account, now);
        }

        // Replay of a frame we already committed: re-acknowledge.
        if frame.nonce == account.proof_header.nonce {
            let current = build_proof_at(account, frame.nonce);
            if current.hash == frame.proof_hash {
                result.reply = Some(counter_input(account, our_is_left, frame.nonce, signer, None));
                return Ok(result);
            }
        }
        if frame.nonce != account.proof_header.nonce + 1 {
            return Err(XlnError::NonceMismatch {
                expected: account.proof_header.nonce + 1,
                got: frame.nonce,
            });
        }
        if frame.proposer_is_left == our_is_left {
            return Err(XlnError::Other("peer proposed a frame as our side".into()));
        }

        let snapshot = snapshot_of(account);
        let mut effects = Vec::new();
        for tx in &frame.txs {
            if let Err(e) = apply_tx(
                account,
                tx,
                frame.proposer_is_left,
                our_is_left,
                frame.timestamp,
                frame.nonce,
                default_credit_limit,
                &mut effects,
            ) {
                restore_shared_state(account, *snapshot);
                warn!(tx = tx.tag(), error = %e, "peer frame rejected");
                return Err(e);
            }
        }

        let ours = build_proof_at(account, frame.nonce);
        if ours.hash != frame.proof_hash {
            error!(
                ours = %ours.hash,
                theirs = %frame.proof_hash,
                "consensus divergence: replayed frame hash mismatch"
            );
            restore_shared_state(account, *snapshot);
            return Err(XlnError::ProofHashDivergence {
                ours: ours.hash.to_hex(),
                theirs: frame.proof_hash.to_hex(),
            });
        }
        if verify_hanko(peer_pk, &frame.proof_hash, their_hanko).is_err() {
            restore_shared_state(account, *snapshot);
            return Err(XlnError::InvalidHanko);
        }

        // Commit.
        account.proof_header.nonce = frame.nonce;
        account.current_dispute_proof = Some(DisputeProof {
            nonce: frame.nonce,
            body_hash: frame.proof_hash,
            hanko: their_hanko.clone(),
        });
        let counter = signer.sign_proof(&frame.proof_hash);
        account.counterparty_dispute_proof = Some(DisputeProof {
            nonce: frame.nonce,
            body_hash: frame.proof_hash,
            hanko: counter.clone(),
        });

        // If the frame approved a settlement, attach our pre-signed hanko
        // over the post-settlement proof to the acknowledgement.
        let post_proof_hanko = frame
            .txs
            .iter()
            .any(|t| matches!(t, AccountTx::SettleApprove { .. }))
            .then(|| sign_post_proof(account, signer))
            .flatten();

        result.effects.extend(effects);
        result.committed = Some(frame.nonce);
        info!(nonce = frame.nonce, "peer frame committed (counter-signed)");
        account.log(
            now,
            LogCategory::System,
            format!("peer frame {} counter-signed", frame.nonce),
        );
        jevents::try_finalize(account, now);

        let (our_entity, counterparty) = if our_is_left {
            (account.left_entity, account.right_entity)
        } else {
            (account.right_entity, account.left_entity)
        };
        result.reply = Some(AccountInput {
            from: our_entity,
            to: counterparty,
            new_frame: None,
            own_hanko: None,
            counter_hanko: Some(counter),
            counter_nonce: Some(frame.nonce),
            post_proof_hanko,
        });
    }

    if !processed {
        return Err(XlnError::EmptyAccountInput);
    }
    Ok(result)
}

// ── Rollback ─────────────────────────────────────────────────────────────────

/// Deterministic rollback of our pending frame after losing the concurrency
/// tie-break. Shared state reverts to the pre-proposal snapshot; the drained
/// transactions return to the front of the mempool.
fn rollback_pending(account: &mut Account, now: Timestamp) {
    let Some(snapshot) = account.cloned_for_validation.take() else {
        account.pending_frame = None;
        account.pending_account_input = None;
        account.pending_effects.clear();
        return;
    };
    let pending = account.pending_frame.take();
    restore_shared_state(account, *snapshot);
    account.pending_account_input = None;
    account.pending_effects.clear();
    account.rollback_count += 1;

    if let Some(frame) = pending {
        account.last_rollback_frame_hash = Some(frame.proof_hash);
        let mut mempool = frame.txs;
        mempool.extend(account.mempool.drain(..));
        account.mempool = mempool;
        info!(
            rollbacks = account.rollback_count,
            "pending frame rolled back; txs requeued"
        );
        account.log(now, LogCategory::System, "frame rolled back on tie-break");
    }
}

/// Discard all in-flight pending state without counting a rollback.
///
/// Used on dispute entry: the chain is about to adjudicate, so optimistic
/// frame state is void. Drained transactions return to the mempool and wait
/// for the account to reactivate.
pub fn discard_pending(account: &mut Account, now: Timestamp) {
    if account.pending_frame.is_none() && account.cloned_for_validation.is_none() {
        return;
    }
    let pending = account.pending_frame.take();
    if let Some(snapshot) = account.cloned_for_validation.take() {
        restore_shared_state(account, *snapshot);
    }
    account.pending_account_input = None;
    account.pending_effects.clear();
    if let Some(frame) = pending {
        let mut mempool = frame.txs;
        mempool.extend(account.mempool.drain(..));
        account.mempool = mempool;
    }
    account.log(now, LogCategory::Dispute, "in-flight frame state discarded");
}

/// Snapshot the account for later rollback. The snapshot drops its own
/// transient fields so it never nests.
fn snapshot_of(account: &Account) -> Box<Account> {
    let mut snap = account.clone();
    snap.cloned_for_validation = None;
    snap.pending_frame = None;
    snap.pending_account_input = None;
    snap.pending_effects = Vec::new();
    Box::new(snap)
}

/// Restore the frame-governed state from a snapshot, preserving the live
/// mempool, message log and rollback diagnostics.
fn restore_shared_state(account: &mut Account, snap: Account) {
    account.deltas = snap.deltas;
    account.locks = snap.locks;
    account.proof_header = snap.proof_header;
    account.on_chain_settlement_nonce = snap.on_chain_settlement_nonce;
    account.current_dispute_proof = snap.current_dispute_proof;
    account.counterparty_dispute_proof = snap.counterparty_dispute_proof;
    account.settlement_workspace = snap.settlement_workspace;
    account.requested_rebalance = snap.requested_rebalance;
    account.requested_rebalance_fee_state = snap.requested_rebalance_fee_state;
    account.active_rebalance_quote = snap.active_rebalance_quote;
    account.left_rebalance_policy = snap.left_rebalance_policy;
    account.right_rebalance_policy = snap.right_rebalance_policy;
    account.left_j_observations = snap.left_j_observations;
    account.right_j_observations = snap.right_j_observations;
    account.j_event_chain = snap.j_event_chain;
    account.last_finalized_j_height = snap.last_finalized_j_height;
}

// ── Transaction application ──────────────────────────────────────────────────

/// Apply one transaction to the working state. `by_left` is the proposer's
/// side; `frame_ts` is the deterministic "now" for every tx in the frame.
#[allow(clippy::too_many_arguments)]
fn apply_tx(
    account: &mut Account,
    tx: &AccountTx,
    by_left: bool,
    our_is_left: bool,
    frame_ts: Timestamp,
    frame_nonce: Nonce,
    default_credit_limit: Amount,
    effects: &mut Vec<FrameEffect>,
) -> Result<(), XlnError> {
    match tx {
        AccountTx::DirectPayment {
            from,
            to,
            token_id,
            amount,
            description,
        } => {
            if *amount <= 0 {
                return Err(XlnError::ZeroAmount);
            }
            let sender_is_left = *from == account.left_entity;
            if sender_is_left != by_left
                || *to != account.counterparty_of(from)
            {
                return Err(XlnError::WrongAccountPair);
            }
            if let Some(d) = description {
                if d.len() > MAX_DESCRIPTION_BYTES {
                    return Err(XlnError::DescriptionTooLong {
                        max: MAX_DESCRIPTION_BYTES,
                    });
                }
            }
            account.delta_mut(*token_id, default_credit_limit);
            let available = htlc::available_capacity(account, *token_id, sender_is_left);
            if available < *amount {
                return Err(XlnError::InsufficientCapacity {
                    need: *amount,
                    have: available,
                });
            }
            let delta = account
                .deltas
                .get_mut(token_id)
                .expect("delta materialized above");
            if sender_is_left {
                delta.offdelta += amount;
            } else {
                delta.offdelta -= amount;
            }
            account.log(
                frame_ts,
                LogCategory::Payment,
                format!("payment {} of token {}", amount, token_id),
            );
            Ok(())
        }

        AccountTx::HtlcAdd {
            lock_id,
            hashlock,
            amount,
            token_id,
            expiry,
        } => htlc::apply_add(
            account,
            by_left,
            *lock_id,
            *hashlock,
            *amount,
            *token_id,
            *expiry,
            frame_ts,
            default_credit_limit,
        ),

        AccountTx::HtlcResolve { lock_id, outcome } => {
            htlc::apply_resolve(account, *lock_id, outcome, frame_ts, effects)
        }

        AccountTx::SetCreditLimit { token_id, amount } => {
            if *amount < 0 {
                return Err(XlnError::ZeroAmount);
            }
            let delta = account.delta_mut(*token_id, default_credit_limit);
            // The proposer extends trust: it caps the peer's debt.
            if by_left {
                delta.right_credit_limit = *amount;
            } else {
                delta.left_credit_limit = *amount;
            }
            account.log(
                frame_ts,
                LogCategory::System,
                format!("credit limit for token {} set to {}", token_id, amount),
            );
            Ok(())
        }

        AccountTx::SetAllowance { token_id, amount } => {
            if *amount < 0 {
                return Err(XlnError::ZeroAmount);
            }
            let delta = account.delta_mut(*token_id, default_credit_limit);
            if by_left {
                delta.left_allowance = *amount;
            } else {
                delta.right_allowance = *amount;
            }
            Ok(())
        }

        AccountTx::SettlePropose { diffs, hanko } => settle::apply_propose(
            account,
            by_left,
            diffs.clone(),
            hanko.clone(),
            frame_nonce,
            frame_ts,
        ),

        AccountTx::SettleApprove {
            hanko,
            post_proof_hanko,
        } => settle::apply_approve(
            account,
            by_left,
            hanko.clone(),
            post_proof_hanko.clone(),
            our_is_left,
            frame_nonce,
            frame_ts,
        ),

        AccountTx::SettleExecute => {
            settle::apply_execute(account, by_left, our_is_left, frame_ts, effects)
        }

        AccountTx::JEventClaim {
            j_height,
            j_block_hash,
            events,
            observed_at,
        } => jevents::store_claim(
            account,
            by_left,
            *j_height,
            *j_block_hash,
            events.clone(),
            *observed_at,
        ),

        AccountTx::RebalanceRequest { token_id, amount } => {
            if *amount <= 0 {
                return Err(XlnError::ZeroAmount);
            }
            account.requested_rebalance.insert(*token_id, *amount);
            account.log(
                frame_ts,
                LogCategory::Rebalance,
                format!("rebalance of {} requested for token {}", amount, token_id),
            );
            Ok(())
        }

        AccountTx::RebalanceQuote {
            quote_id,
            fee_token_id,
            fee_amount,
        } => {
            account.active_rebalance_quote = Some(xln_core::account::RebalanceQuote {
                quote_id: *quote_id,
                fee_token_id: *fee_token_id,
                fee_amount: *fee_amount,
                accepted: false,
            });
            account.log(
                frame_ts,
                LogCategory::Rebalance,
                format!("rebalance quoted: fee {} of token {}", fee_amount, fee_token_id),
            );
            Ok(())
        }

        AccountTx::RebalanceAccept { quote_id } => {
            let quote = account
                .active_rebalance_quote
                .as_mut()
                .ok_or(XlnError::NoActiveQuote)?;
            if quote.quote_id != *quote_id {
                return Err(XlnError::QuoteMismatch {
                    expected: quote.quote_id,
                    got: *quote_id,
                });
            }
            if frame_ts - quote.quote_id > QUOTE_EXPIRY_MS {
                return Err(XlnError::QuoteExpired {
                    issued_at: quote.quote_id,
                });
            }
            quote.accepted = true;
            let fee_token_id = quote.fee_token_id;
            let fee_amount = quote.fee_amount;
            // The accepter owes the fee; only its entity injects the payment.
            if by_left == our_is_left {
                let counterparty = if our_is_left {
                    account.right_entity
                } else {
                    account.left_entity
                };
                effects.push(FrameEffect::RebalanceFeeDue {
                    counterparty,
                    fee_token_id,
                    fee_amount,
                });
            }
            account.log(frame_ts, LogCategory::Rebalance, "rebalance quote accepted");
            Ok(())
        }

        AccountTx::SetRebalancePolicy { token_id, policy } => {
            let side = if by_left {
                &mut account.left_rebalance_policy
            } else {
                &mut account.right_rebalance_policy
            };
            match policy {
                Some(p) => {
                    if p.top_up <= 0 || p.min_in_collateral < 0 {
                        return Err(XlnError::ZeroAmount);
                    }
                    side.insert(*token_id, p.clone());
                    account.log(
                        frame_ts,
                        LogCategory::Rebalance,
                        format!(
                            "rebalance policy armed for token {}: floor {}, top-up {}",
                            token_id, p.min_in_collateral, p.top_up
                        ),
                    );
                }
                None => {
                    side.remove(token_id);
                    account.log(
                        frame_ts,
                        LogCategory::Rebalance,
                        format!("rebalance policy cleared for token {}", token_id),
                    );
                }
            }
            Ok(())
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn counter_input(
    account: &Account,
    our_is_left: bool,
    nonce: Nonce,
    signer: &KeyPair,
    post_proof_hanko: Option<xln_core::types::Hanko>,
) -> AccountInput {
    let (our_entity, counterparty) = if our_is_left {
        (account.left_entity, account.right_entity)
    } else {
        (account.right_entity, account.left_entity)
    };
    let proof = build_proof_at(account, nonce);
    AccountInput {
        from: our_entity,
        to: counterparty,
        new_frame: None,
        own_hanko: None,
        counter_hanko: Some(signer.sign_proof(&proof.hash)),
        counter_nonce: Some(nonce),
        post_proof_hanko,
    }
}

/// Sign the staged post-settlement proof, if one exists.
fn sign_post_proof(account: &Account, signer: &KeyPair) -> Option<xln_core::types::Hanko> {
    account
        .settlement_workspace
        .as_ref()
        .and_then(|ws| ws.post_settlement_proof.as_ref())
        .map(|post| signer.sign_proof(&post.body_hash))
}

/// Store the peer's pre-signed post-settlement hanko on our workspace.
fn attach_peer_post_proof_hanko(account: &mut Account, hanko: xln_core::types::Hanko) {
    if let Some(post) = account
        .settlement_workspace
        .as_mut()
        .and_then(|ws| ws.post_settlement_proof.as_mut())
    {
        post.peer_hanko = Some(hanko);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
