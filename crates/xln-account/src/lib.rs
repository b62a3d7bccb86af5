//! xln-account
//!
//! The bilateral account machinery: canonical proof bodies, HTLC locks, the
//! frame state machine (propose → counter-sign → commit, rollback on
//! concurrent proposals), the settlement workspace, and the account half of
//! bilateral j-event consensus.

pub mod htlc;
pub mod jevents;
pub mod machine;
pub mod proof;
pub mod settle;

pub use machine::{
    discard_pending, enqueue, handle_input, propose_frame, resend_pending, HandleResult,
};
pub use proof::{build_proof, build_proof_at, settlement_payload_hash, Proof};
