use thiserror::Error;

#[derive(Debug, Error)]
pub enum XlnError {
    // ── Capacity / balance errors ────────────────────────────────────────────
    #[error("insufficient outbound capacity: need {need}, have {have}")]
    InsufficientCapacity { need: i128, have: i128 },

    #[error("insufficient reserve: need {need}, have {have}")]
    InsufficientReserve { need: i128, have: i128 },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("payment endpoints do not match the account pair")]
    WrongAccountPair,

    // ── Frame / consensus errors ─────────────────────────────────────────────
    #[error("frame nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },

    #[error("proof hash divergence: ours {ours}, theirs {theirs}")]
    ProofHashDivergence { ours: String, theirs: String },

    #[error("no pending frame awaiting counter-signature")]
    NoPendingFrame,

    #[error("invalid hanko signature")]
    InvalidHanko,

    #[error("account input carried neither a frame nor a counter-signature")]
    EmptyAccountInput,

    // ── HTLC errors ──────────────────────────────────────────────────────────
    #[error("lock not found: {0}")]
    LockNotFound(String),

    #[error("lock already exists: {0}")]
    DuplicateLock(String),

    #[error("secret does not match hashlock")]
    HashlockMismatch,

    #[error("lock not yet expired (expires at {expiry})")]
    LockNotExpired { expiry: i64 },

    #[error("lock expiry must be in the future")]
    ExpiryInPast,

    // ── J-block errors ───────────────────────────────────────────────────────
    #[error("stale j-block observation: height {height} ≤ last finalized {last_finalized}")]
    StaleJHeight { height: u64, last_finalized: u64 },

    #[error("unknown signer for this entity: {0}")]
    UnknownSigner(String),

    // ── J-batch errors ───────────────────────────────────────────────────────
    #[error("j-batch is empty; nothing to broadcast")]
    BatchEmpty,

    #[error("a j-batch is already pending on-chain confirmation")]
    BatchPending,

    // ── Settlement workspace errors ──────────────────────────────────────────
    #[error("no settlement workspace staged")]
    WorkspaceMissing,

    #[error("settlement workspace is not ready to submit")]
    WorkspaceNotReady,

    #[error("settlement workspace already holds both signatures")]
    WorkspaceAlreadySigned,

    // ── Dispute errors ───────────────────────────────────────────────────────
    #[error("account is disputed; only observability operations accepted")]
    AccountDisputed,

    #[error("account has no active dispute")]
    NoActiveDispute,

    // ── Rebalance errors ─────────────────────────────────────────────────────
    #[error("rebalance quote has expired (issued at {issued_at})")]
    QuoteExpired { issued_at: i64 },

    #[error("rebalance quote id mismatch: expected {expected}, got {got}")]
    QuoteMismatch { expected: i64, got: i64 },

    #[error("no active rebalance quote on this account")]
    NoActiveQuote,

    // ── Entity-level errors ──────────────────────────────────────────────────
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("account with self not allowed")]
    SelfAccount,

    #[error("description exceeds maximum length of {max} bytes")]
    DescriptionTooLong { max: usize },

    // ── Adapter / infrastructure ─────────────────────────────────────────────
    #[error("jurisdiction adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}
