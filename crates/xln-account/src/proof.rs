//! Canonical proof body construction.
//!
//! The proof body is the dispute commitment: a fixed-width, big-endian
//! encoding of the account's committed state that any honest implementation
//! reproduces byte-for-byte. Token entries are sorted by token id, lock
//! entries by lock id. The body hash is BLAKE3 of the bytes.

use xln_core::account::{Account, HtlcLock};
use xln_core::tx::SettleDiff;
use xln_core::types::{EntityId, Nonce, ProofHash};
use xln_crypto::proof_hash_from_body;

/// A canonical snapshot: the encoded body and its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proof {
    pub body: Vec<u8>,
    pub hash: ProofHash,
}

/// Active locks in canonical (lock id ascending) order.
///
/// Dispute arguments reference locks by their index in this ordering.
pub fn sorted_locks(account: &Account) -> Vec<&HtlcLock> {
    // BTreeMap iteration is already id-ascending.
    account.locks.values().collect()
}

/// Build the proof at the account's current committed nonce.
pub fn build_proof(account: &Account) -> Proof {
    build_proof_at(account, account.proof_header.nonce)
}

/// Build the proof over the account's current deltas and locks at an
/// explicit nonce (used for pending frames and post-settlement proofs).
pub fn build_proof_at(account: &Account, nonce: Nonce) -> Proof {
    let mut body = Vec::with_capacity(128 + account.deltas.len() * 120 + account.locks.len() * 96);

    body.extend_from_slice(account.left_entity.as_bytes());
    body.extend_from_slice(account.right_entity.as_bytes());
    body.extend_from_slice(&nonce.to_be_bytes());

    body.extend_from_slice(&(account.deltas.len() as u32).to_be_bytes());
    for (token_id, d) in &account.deltas {
        body.extend_from_slice(&token_id.to_be_bytes());
        body.extend_from_slice(&d.collateral.to_be_bytes());
        body.extend_from_slice(&d.ondelta.to_be_bytes());
        body.extend_from_slice(&d.offdelta.to_be_bytes());
        body.extend_from_slice(&d.left_credit_limit.to_be_bytes());
        body.extend_from_slice(&d.right_credit_limit.to_be_bytes());
        body.extend_from_slice(&d.left_allowance.to_be_bytes());
        body.extend_from_slice(&d.right_allowance.to_be_bytes());
    }

    body.extend_from_slice(&(account.locks.len() as u32).to_be_bytes());
    for lock in sorted_locks(account) {
        body.extend_from_slice(&lock.lock_id.0);
        body.extend_from_slice(&lock.hashlock.0);
        body.extend_from_slice(&lock.amount.to_be_bytes());
        body.extend_from_slice(&lock.token_id.to_be_bytes());
        body.extend_from_slice(&lock.expiry.to_be_bytes());
        body.push(lock.sender_is_left as u8);
    }

    let hash = proof_hash_from_body(&body);
    Proof { body, hash }
}

/// Canonical hash of a staged settlement: what the propose/approve hankos
/// bind to.
pub fn settlement_payload_hash(
    left: &EntityId,
    right: &EntityId,
    nonce_at_sign: Nonce,
    diffs: &[SettleDiff],
) -> ProofHash {
    let mut body = Vec::with_capacity(72 + diffs.len() * 36);
    body.extend_from_slice(left.as_bytes());
    body.extend_from_slice(right.as_bytes());
    body.extend_from_slice(&nonce_at_sign.to_be_bytes());
    body.extend_from_slice(&(diffs.len() as u32).to_be_bytes());
    let mut sorted: Vec<&SettleDiff> = diffs.iter().collect();
    sorted.sort_by_key(|d| d.token_id);
    for d in sorted {
        body.extend_from_slice(&d.token_id.to_be_bytes());
        body.extend_from_slice(&d.collateral_delta.to_be_bytes());
        body.extend_from_slice(&d.ondelta_delta.to_be_bytes());
    }
    proof_hash_from_body(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_core::account::{Delta, HtlcLock};
    use xln_core::types::{EntityId, Hashlock, LockId};

    fn account() -> Account {
        Account::new(EntityId([1u8; 32]), EntityId([2u8; 32]))
    }

    #[test]
    fn identical_state_identical_bytes() {
        let mut a = account();
        let mut b = account();
        // Insert tokens in different orders; BTreeMap canonicalizes.
        a.deltas.insert(2, Delta::new(0));
        a.deltas.insert(1, Delta::new(10));
        b.deltas.insert(1, Delta::new(10));
        b.deltas.insert(2, Delta::new(0));
        assert_eq!(build_proof(&a).body, build_proof(&b).body);
        assert_eq!(build_proof(&a).hash, build_proof(&b).hash);
    }

    #[test]
    fn nonce_changes_hash() {
        let a = account();
        assert_ne!(build_proof_at(&a, 1).hash, build_proof_at(&a, 2).hash);
    }

    #[test]
    fn lock_set_changes_hash() {
        let mut a = account();
        let base = build_proof(&a).hash;
        a.locks.insert(
            LockId([9u8; 32]),
            HtlcLock {
                lock_id: LockId([9u8; 32]),
                hashlock: Hashlock([8u8; 32]),
                amount: 40,
                token_id: 1,
                expiry: 1_000,
                sender_is_left: true,
            },
        );
        assert_ne!(build_proof(&a).hash, base);
    }

    #[test]
    fn delta_fields_are_injective() {
        let mut a = account();
        a.deltas.insert(1, Delta::new(0));
        let base = build_proof(&a).hash;
        a.deltas.get_mut(&1).unwrap().offdelta = 1;
        let with_off = build_proof(&a).hash;
        assert_ne!(base, with_off);
        a.deltas.get_mut(&1).unwrap().offdelta = 0;
        a.deltas.get_mut(&1).unwrap().ondelta = 1;
        assert_ne!(build_proof(&a).hash, with_off);
    }

    #[test]
    fn settlement_payload_sorts_diffs() {
        let l = EntityId([1u8; 32]);
        let r = EntityId([2u8; 32]);
        let d1 = SettleDiff { token_id: 1, collateral_delta: 5, ondelta_delta: 0 };
        let d2 = SettleDiff { token_id: 2, collateral_delta: 7, ondelta_delta: 7 };
        assert_eq!(
            settlement_payload_hash(&l, &r, 3, &[d1.clone(), d2.clone()]),
            settlement_payload_hash(&l, &r, 3, &[d2, d1]),
        );
    }
}
