//! HTLC lock lifecycle inside one account.
//!
//! A lock freezes `amount` on the sender's side until a matching pre-image
//! shifts offdelta toward the receiver, or the expiry passes and the sender
//! reclaims. Admission treats locks as reservations: the sender's available
//! capacity is out-capacity minus the sum of its open locks.

use tracing::debug;

use xln_core::account::{Account, HtlcLock, LogCategory};
use xln_core::delta::derive;
use xln_core::error::XlnError;
use xln_core::tx::{FrameEffect, HtlcOutcome};
use xln_core::types::{Amount, Hashlock, LockId, Timestamp, TokenId};
use xln_crypto::hashlock_from_secret;

/// Sendable capacity still uncommitted by open locks, for one side.
pub fn available_capacity(account: &Account, token_id: TokenId, sender_is_left: bool) -> Amount {
    let Some(delta) = account.deltas.get(&token_id) else {
        return 0;
    };
    let derived = derive(delta, sender_is_left);
    derived.out_capacity - account.locked_amount(token_id, sender_is_left)
}

/// Admit a new lock on `by_left`'s side.
pub fn apply_add(
    account: &mut Account,
    by_left: bool,
    lock_id: LockId,
    hashlock: Hashlock,
    amount: Amount,
    token_id: TokenId,
    expiry: Timestamp,
    now: Timestamp,
    default_credit_limit: Amount,
) -> Result<(), XlnError> {
    if amount <= 0 {
        return Err(XlnError::ZeroAmount);
    }
    if expiry < now {
        return Err(XlnError::ExpiryInPast);
    }
    if account.locks.contains_key(&lock_id) {
        return Err(XlnError::DuplicateLock(lock_id.to_hex()));
    }

    // Materialize the delta first so capacity reflects default credit limits.
    account.delta_mut(token_id, default_credit_limit);
    let available = available_capacity(account, token_id, by_left);
    if available < amount {
        return Err(XlnError::InsufficientCapacity {
            need: amount,
            have: available,
        });
    }

    account.locks.insert(
        lock_id,
        HtlcLock {
            lock_id,
            hashlock,
            amount,
            token_id,
            expiry,
            sender_is_left: by_left,
        },
    );
    account.log(
        now,
        LogCategory::Payment,
        format!("htlc {} locked {} of token {}", lock_id, amount, token_id),
    );
    Ok(())
}

/// Resolve a lock by pre-image or expiry.
///
/// Secret resolution shifts offdelta toward the receiver and surfaces a
/// `SecretLearned` effect for cross-account propagation. Expiry resolution
/// deletes the lock with no delta change.
pub fn apply_resolve(
    account: &mut Account,
    lock_id: LockId,
    outcome: &HtlcOutcome,
    now: Timestamp,
    effects: &mut Vec<FrameEffect>,
) -> Result<(), XlnError> {
    let lock = account
        .locks
        .get(&lock_id)
        .cloned()
        .ok_or_else(|| XlnError::LockNotFound(lock_id.to_hex()))?;

    match outcome {
        HtlcOutcome::Secret { secret } => {
            if hashlock_from_secret(secret) != lock.hashlock {
                return Err(XlnError::HashlockMismatch);
            }
            let delta = account
                .deltas
                .get_mut(&lock.token_id)
                .expect("lock implies delta exists");
            // Toward the receiver: a left-side sender pushes delta right.
            if lock.sender_is_left {
                delta.offdelta += lock.amount;
            } else {
                delta.offdelta -= lock.amount;
            }
            account.locks.remove(&lock_id);
            effects.push(FrameEffect::SecretLearned {
                hashlock: lock.hashlock,
                secret: *secret,
            });
            account.log(
                now,
                LogCategory::Payment,
                format!("htlc {} resolved by secret for {}", lock_id, lock.amount),
            );
        }
        HtlcOutcome::Expiry => {
            if now < lock.expiry {
                return Err(XlnError::LockNotExpired { expiry: lock.expiry });
            }
            account.locks.remove(&lock_id);
            debug!(lock_id = %lock_id, "htlc expired; returned to sender");
            account.log(
                now,
                LogCategory::Payment,
                format!("htlc {} expired unclaimed", lock_id),
            );
        }
    }
    Ok(())
}

/// Locks on this account whose hashlock matches and whose sender is the
/// counterparty (i.e. we are the receiver and may claim with the secret).
pub fn claimable_locks(account: &Account, our_is_left: bool, hashlock: &Hashlock) -> Vec<LockId> {
    account
        .locks
        .values()
        .filter(|l| l.hashlock == *hashlock && l.sender_is_left != our_is_left)
        .map(|l| l.lock_id)
        .collect()
}
