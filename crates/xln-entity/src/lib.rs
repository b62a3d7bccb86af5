//! xln-entity
//!
//! Entity-level machinery above the bilateral accounts: transaction
//! dispatch, reserves, the j-batch accumulator, cross-account HTLC secret
//! propagation, and the jurisdiction-adapter boundary.

pub mod adapter;
pub mod batch;
pub mod engine;
pub mod routes;

pub use adapter::{AccountInfo, JBatchSubmission, JurisdictionAdapter};
pub use engine::EntityRuntime;
