use crate::types::{Amount, Timestamp};

/// Milliseconds a rebalance quote stays acceptable after issuance.
/// Quote ids are issuance timestamps, so expiry is `now - quote_id`.
pub const QUOTE_EXPIRY_MS: Timestamp = 300_000;

/// Default retention of confirmed j-batches per entity.
/// Overridable per entity via `EntityConfig::batch_history_limit`.
pub const DEFAULT_BATCH_HISTORY_LIMIT: usize = 20;

/// Credit limit applied to a fresh Delta when the entity config does not
/// override it. Zero: credit is an explicit, signed decision.
pub const DEFAULT_CREDIT_LIMIT: Amount = 0;

/// Maximum byte length of a payment description.
pub const MAX_DESCRIPTION_BYTES: usize = 256;

/// Maximum account transactions drained into a single frame.
pub const MAX_FRAME_TXS: usize = 64;

/// Dispute timeout (in jurisdiction blocks) assumed when the adapter
/// cannot supply one. Real deployments always read it from the chain.
pub const FALLBACK_DISPUTE_TIMEOUT_BLOCKS: u64 = 100;
