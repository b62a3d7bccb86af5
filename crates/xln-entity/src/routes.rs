//! Cross-account HTLC secret propagation.
//!
//! Locks belong to accounts, but a revealed pre-image concerns every account
//! holding a lock with the same hashlock. The entity keeps a route table for
//! multi-hop forwards (outgoing lock → prior-hop lock) and a global lock
//! book; on reveal it resolves the route targets first, then sweeps every
//! account where the counterparty is the sender — no signature from the
//! revealer needed.

use tracing::{debug, warn};

use xln_core::entity::{Entity, LockRef};
use xln_core::tx::{AccountTx, HtlcOutcome};
use xln_core::types::{EntityId, Hashlock, LockId, Secret};
use xln_crypto::hashlock_from_secret;

/// Register a multi-hop forward: when `outgoing` resolves by secret, the
/// pre-image must propagate to the prior-hop lock.
pub fn register_route(entity: &mut Entity, outgoing: LockId, prior_hop: LockRef) {
    entity.htlc_routes.insert(outgoing, prior_hop);
}

/// Record where a lock lives, for the global lock book.
pub fn register_lock(entity: &mut Entity, lock_id: LockId, counterparty: EntityId) {
    entity.lock_book.insert(lock_id, counterparty);
}

/// Forget a settled or expired lock.
pub fn forget_lock(entity: &mut Entity, lock_id: &LockId) {
    entity.lock_book.remove(lock_id);
    entity.htlc_routes.remove(lock_id);
}

/// The inbound lock a new outgoing lock extends: same hashlock on a
/// different account, counterparty as sender. `None` means the lock starts
/// a route here rather than forwarding one.
pub fn find_inbound_lock(
    entity: &Entity,
    outgoing_counterparty: EntityId,
    hashlock: &Hashlock,
) -> Option<LockRef> {
    let our = entity.entity_id;
    entity
        .accounts
        .iter()
        .filter(|(cp, _)| **cp != outgoing_counterparty)
        .find_map(|(cp, account)| {
            let our_is_left = account.is_left(&our);
            account
                .locks
                .values()
                .find(|l| l.hashlock == *hashlock && l.sender_is_left != our_is_left)
                .map(|l| LockRef {
                    counterparty: *cp,
                    lock_id: l.lock_id,
                })
        })
}

/// Drop lock-book and route entries whose locks have left their accounts
/// (resolved by secret inside a frame, or never admitted).
pub fn prune_settled(entity: &mut Entity) {
    let accounts = &entity.accounts;
    entity.lock_book.retain(|lock_id, cp| {
        accounts
            .get(cp)
            .is_some_and(|a| a.locks.contains_key(lock_id))
    });
    let lock_book = &entity.lock_book;
    entity
        .htlc_routes
        .retain(|outgoing, _| lock_book.contains_key(outgoing));
}

/// Fold a learned pre-image into entity state and produce the inbound
/// resolves it unlocks.
///
/// Route-table targets come first: a forwarded lock points straight at the
/// prior-hop lock its secret must travel back to. The sweep over all
/// accounts follows, because on-chain reveals and dispute arguments carry
/// no origin lock the table could be keyed on.
pub fn propagate_secret(
    entity: &mut Entity,
    hashlock: Hashlock,
    secret: Secret,
) -> Vec<(EntityId, AccountTx)> {
    if hashlock_from_secret(&secret) != hashlock {
        warn!(hashlock = %hashlock, "secret does not match its hashlock; dropping");
        return Vec::new();
    }
    entity.known_secrets.insert(hashlock, secret);

    let mut targets: Vec<LockRef> = Vec::new();
    for prior in entity.htlc_routes.values() {
        let live = entity
            .accounts
            .get(&prior.counterparty)
            .and_then(|a| a.locks.get(&prior.lock_id))
            .is_some_and(|l| l.hashlock == hashlock);
        if live && !targets.contains(prior) {
            targets.push(prior.clone());
        }
    }

    let our = entity.entity_id;
    for (counterparty, account) in &entity.accounts {
        let our_is_left = account.is_left(&our);
        for lock_id in xln_account::htlc::claimable_locks(account, our_is_left, &hashlock) {
            let target = LockRef {
                counterparty: *counterparty,
                lock_id,
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    debug!(
        hashlock = %hashlock,
        unlocked = targets.len(),
        "secret propagated across accounts"
    );
    targets
        .into_iter()
        .map(|target| {
            (
                target.counterparty,
                AccountTx::HtlcResolve {
                    lock_id: target.lock_id,
                    outcome: HtlcOutcome::Secret { secret },
                },
            )
        })
        .collect()
}
