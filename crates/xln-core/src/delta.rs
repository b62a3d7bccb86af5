//! Delta algebra: the pure map from a token's raw channel state to the
//! derived balances either side perceives.
//!
//! Orientation: `total_delta = ondelta + offdelta`, positive values favor the
//! right entity. The right side's collateral claim is
//! `clamp(total_delta, 0, collateral)`; the left side claims the remainder.
//! Beyond the collateral band the excess rides on credit: `delta > collateral`
//! puts the left side in debt (capped by `left_credit_limit`), `delta < 0`
//! puts the right side in debt (capped by `right_credit_limit`).
//!
//! This function is total and never errors.

use serde::{Deserialize, Serialize};

use crate::account::Delta;
use crate::types::Amount;

/// Derived per-side balances for one token of one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedBalances {
    /// Collateral the viewer can spend (its current claim).
    pub out_collateral: Amount,
    /// Collateral the viewer can still receive.
    pub in_collateral: Amount,
    /// The viewer's current uncollateralized debt (incoming payments repay it).
    pub in_own_credit: Amount,
    /// Remaining room for the viewer to go into debt.
    pub out_own_credit: Amount,
    /// The peer's current uncollateralized debt to the viewer (spendable).
    pub out_peer_credit: Amount,
    /// Remaining room for the peer to go into debt (receivable).
    pub in_peer_credit: Amount,
    /// Sendable capacity after the allowance clamp, floored at zero.
    pub out_capacity: Amount,
    /// Receivable capacity after the allowance clamp, floored at zero.
    pub in_capacity: Amount,
    /// `collateral + left_credit_limit + right_credit_limit`.
    pub total_capacity: Amount,
}

fn non_negative(x: Amount) -> Amount {
    if x < 0 {
        0
    } else {
        x
    }
}

fn clamp(x: Amount, lo: Amount, hi: Amount) -> Amount {
    x.max(lo).min(hi)
}

/// Derive the balances one side of the account perceives.
pub fn derive(delta: &Delta, i_am_left: bool) -> DerivedBalances {
    let total_delta = delta.ondelta + delta.offdelta;
    let collateral = non_negative(delta.collateral);

    // Buckets for the right viewer: positive delta is the right side's claim.
    let (mut out_collateral, mut in_collateral, mut in_own_credit, mut out_peer_credit);
    if total_delta > 0 {
        out_collateral = clamp(total_delta, 0, collateral);
        in_collateral = collateral - out_collateral;
        out_peer_credit = clamp(total_delta - collateral, 0, delta.left_credit_limit);
        in_own_credit = 0;
    } else {
        out_collateral = 0;
        in_collateral = collateral;
        in_own_credit = clamp(-total_delta, 0, delta.right_credit_limit);
        out_peer_credit = 0;
    }
    let mut out_own_credit = delta.right_credit_limit - in_own_credit;
    let mut in_peer_credit = delta.left_credit_limit - out_peer_credit;
    let mut out_allowance = delta.right_allowance;
    let mut in_allowance = delta.left_allowance;

    if i_am_left {
        std::mem::swap(&mut out_collateral, &mut in_collateral);
        std::mem::swap(&mut in_own_credit, &mut out_peer_credit);
        std::mem::swap(&mut out_own_credit, &mut in_peer_credit);
        std::mem::swap(&mut out_allowance, &mut in_allowance);
    }

    let total_capacity = collateral + delta.left_credit_limit + delta.right_credit_limit;
    let out_capacity =
        non_negative(out_collateral + out_own_credit + out_peer_credit - out_allowance);
    let in_capacity = non_negative(in_collateral + in_own_credit + in_peer_credit - in_allowance);

    DerivedBalances {
        out_collateral,
        in_collateral,
        in_own_credit,
        out_own_credit,
        out_peer_credit,
        in_peer_credit,
        out_capacity,
        in_capacity,
        total_capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(collateral: Amount, ondelta: Amount, offdelta: Amount, lcl: Amount, rcl: Amount) -> Delta {
        Delta {
            collateral,
            ondelta,
            offdelta,
            left_credit_limit: lcl,
            right_credit_limit: rcl,
            left_allowance: 0,
            right_allowance: 0,
        }
    }

    fn invariants(d: &Delta) {
        for i_am_left in [true, false] {
            let b = derive(d, i_am_left);
            assert!(b.out_capacity >= 0);
            assert!(b.in_capacity >= 0);
            assert!(b.in_capacity + b.out_capacity <= b.total_capacity);
            assert_eq!(
                b.in_collateral + b.out_collateral,
                non_negative(d.collateral)
            );
            let (own_limit, peer_limit) = if i_am_left {
                (d.left_credit_limit, d.right_credit_limit)
            } else {
                (d.right_credit_limit, d.left_credit_limit)
            };
            assert!(b.in_own_credit <= own_limit);
            assert!(b.out_peer_credit <= peer_limit);
        }
    }

    #[test]
    fn fresh_account_with_credit() {
        // collateral 100, both limits 50, delta 0: the collateral rests with
        // the left side, each side may additionally borrow its own limit.
        let d = delta(100, 0, 0, 50, 50);
        let left = derive(&d, true);
        assert_eq!(left.out_collateral, 100);
        assert_eq!(left.out_own_credit, 50);
        assert_eq!(left.out_capacity, 150);
        assert_eq!(left.in_capacity, 50);

        let right = derive(&d, false);
        assert_eq!(right.out_collateral, 0);
        assert_eq!(right.out_capacity, 50);
        assert_eq!(right.in_capacity, 150);
        invariants(&d);
    }

    #[test]
    fn direct_payment_shifts_capacity() {
        // After the left side pays 30: offdelta 30.
        let d = delta(100, 0, 30, 50, 50);
        let left = derive(&d, true);
        assert_eq!(left.out_collateral, 70);
        assert_eq!(left.out_capacity, 120);
        let right = derive(&d, false);
        assert_eq!(right.out_collateral, 30);
        assert_eq!(right.in_capacity, 120);
        assert_eq!(left.out_capacity + left.in_capacity, left.total_capacity);
        invariants(&d);
    }

    #[test]
    fn delta_beyond_collateral_uses_credit() {
        // Left paid 120 against 100 collateral: 20 rides on left's credit.
        let d = delta(100, 0, 120, 50, 50);
        let right = derive(&d, false);
        assert_eq!(right.out_collateral, 100);
        assert_eq!(right.out_peer_credit, 20);
        assert_eq!(right.out_capacity, 100 + 50 + 20);
        let left = derive(&d, true);
        assert_eq!(left.in_own_credit, 20);
        assert_eq!(left.out_own_credit, 30);
        assert_eq!(left.out_capacity, 30);
        invariants(&d);
    }

    #[test]
    fn delta_exactly_at_collateral_boundary() {
        let d = delta(100, 40, 60, 50, 50);
        let right = derive(&d, false);
        assert_eq!(right.out_collateral, 100);
        assert_eq!(right.out_peer_credit, 0);
        invariants(&d);
    }

    #[test]
    fn negative_delta_uses_right_credit() {
        // Right paid 30 with no collateral claim of its own.
        let d = delta(100, 0, -30, 50, 50);
        let right = derive(&d, false);
        assert_eq!(right.in_own_credit, 30);
        assert_eq!(right.out_own_credit, 20);
        let left = derive(&d, true);
        assert_eq!(left.out_peer_credit, 30);
        assert_eq!(left.out_capacity, 100 + 50 + 30);
        invariants(&d);
    }

    #[test]
    fn credit_only_account_is_one_directional() {
        // No collateral, only the right side may take on debt: only the
        // right side can send.
        let d = delta(0, 0, 0, 0, 50);
        let left = derive(&d, true);
        let right = derive(&d, false);
        assert_eq!(left.out_capacity, 0);
        assert_eq!(right.out_capacity, 50);
        assert_eq!(left.in_capacity, 50);
        invariants(&d);
    }

    #[test]
    fn allowance_clamps_sendable() {
        let mut d = delta(100, 0, 0, 50, 50);
        d.left_allowance = 120;
        let left = derive(&d, true);
        assert_eq!(left.out_capacity, 30);
        invariants(&d);
    }

    #[test]
    fn negative_collateral_is_floored() {
        let d = delta(-5, 0, 0, 10, 10);
        let left = derive(&d, true);
        assert_eq!(left.in_collateral + left.out_collateral, 0);
        invariants(&d);
    }

    #[test]
    fn credit_saturates_at_limit() {
        // Delta far past collateral: peer credit saturates at the limit.
        let d = delta(100, 0, 400, 50, 50);
        let right = derive(&d, false);
        assert_eq!(right.out_peer_credit, 50);
        let left = derive(&d, true);
        assert_eq!(left.in_own_credit, 50);
        assert_eq!(left.out_own_credit, 0);
        assert_eq!(left.out_capacity, 0);
        invariants(&d);
    }

    #[test]
    fn derive_is_deterministic_across_encode_decode() {
        let d = delta(100, 25, -13, 40, 60);
        let bytes = bincode::serialize(&d).unwrap();
        let d2: Delta = bincode::deserialize(&bytes).unwrap();
        assert_eq!(derive(&d, true), derive(&d2, true));
        assert_eq!(derive(&d, false), derive(&d2, false));
    }
}
