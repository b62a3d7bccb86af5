//! xln-consensus
//!
//! The two derived consensus views between the jurisdiction chain and the
//! bilateral accounts: per-entity j-block threshold consensus, routing of
//! finalized events (including the 2-of-2 settlement agreement), and the
//! dispute handler.

pub mod dispute;
pub mod events;
pub mod jblock;

pub use dispute::{counter_proofs, decode_argument_secrets};
pub use jblock::try_finalize;

use xln_core::error::XlnError;
use xln_core::tx::{AccountInput, EntityTx};
use xln_entity::{EntityRuntime, JurisdictionAdapter};

/// The entity state machine's top-level entry point: apply one ordered
/// input, then fold any j-blocks that reached threshold into the chain.
pub fn process_entity_tx(
    rt: &mut EntityRuntime,
    tx: EntityTx,
    adapter: &mut dyn JurisdictionAdapter,
    outbox: &mut Vec<AccountInput>,
) -> Result<(), XlnError> {
    rt.apply(tx, adapter, outbox)?;
    jblock::try_finalize(rt, adapter, outbox);
    Ok(())
}
