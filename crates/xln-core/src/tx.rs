use serde::{Deserialize, Serialize};

use crate::event::JurisdictionEvent;
use crate::types::{
    Amount, EntityId, Hanko, Hashlock, JBlockHash, LockId, Nonce, ProofHash, Secret, SignerId,
    Timestamp, TokenId,
};

// ── Account transactions ─────────────────────────────────────────────────────

/// Outcome requested by an `HtlcResolve`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcOutcome {
    /// Unlock with the pre-image; shifts offdelta toward the receiver.
    Secret { secret: Secret },
    /// Reclaim after expiry; no delta change.
    Expiry,
}

/// One staged on-chain movement for a single token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleDiff {
    pub token_id: TokenId,
    pub collateral_delta: Amount,
    pub ondelta_delta: Amount,
}

/// Every state-changing operation inside a bilateral account is one of these
/// variants. They travel inside counter-signed frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountTx {
    /// Shift offdelta by `amount` from `from` to `to`.
    DirectPayment {
        from: EntityId,
        to: EntityId,
        token_id: TokenId,
        amount: Amount,
        description: Option<String>,
    },

    /// Freeze `amount` on the proposer's side until secret or expiry.
    HtlcAdd {
        lock_id: LockId,
        hashlock: Hashlock,
        amount: Amount,
        token_id: TokenId,
        expiry: Timestamp,
    },

    /// Resolve a lock by pre-image or by expiry.
    HtlcResolve { lock_id: LockId, outcome: HtlcOutcome },

    /// Proposer extends (or retracts) credit to the peer: sets the cap on the
    /// peer's uncollateralized debt for one token.
    SetCreditLimit { token_id: TokenId, amount: Amount },

    /// Proposer restricts its own sendable capacity for one token.
    SetAllowance { token_id: TokenId, amount: Amount },

    /// Stage an on-chain settlement; carries the proposer's hanko over the
    /// canonical diff encoding.
    SettlePropose {
        diffs: Vec<SettleDiff>,
        hanko: Hanko,
    },

    /// Approve the staged settlement; carries the approver's hanko and the
    /// approver's pre-signed post-settlement dispute proof hanko.
    SettleApprove {
        hanko: Hanko,
        post_proof_hanko: Hanko,
    },

    /// Push the fully-signed settlement into the proposer's j-batch.
    SettleExecute,

    /// Claim a finalized j-event batch toward bilateral 2-of-2 agreement.
    JEventClaim {
        j_height: u64,
        j_block_hash: JBlockHash,
        events: Vec<JurisdictionEvent>,
        observed_at: Timestamp,
    },

    /// Ask the counterparty to add collateral toward the requester's side.
    RebalanceRequest { token_id: TokenId, amount: Amount },

    /// Offer to fulfil a pending rebalance request for a fee.
    /// `quote_id` is the issuance timestamp.
    RebalanceQuote {
        quote_id: Timestamp,
        fee_token_id: TokenId,
        fee_amount: Amount,
    },

    /// Accept an open rebalance quote; triggers the fee payment.
    RebalanceAccept { quote_id: Timestamp },

    /// Arm (`Some`) or clear (`None`) the proposer's standing rebalance
    /// trigger for one token.
    SetRebalancePolicy {
        token_id: TokenId,
        policy: Option<crate::account::RebalancePolicy>,
    },
}

impl AccountTx {
    /// Short tag for logs and the account message stream.
    pub fn tag(&self) -> &'static str {
        match self {
            AccountTx::DirectPayment { .. } => "direct_payment",
            AccountTx::HtlcAdd { .. } => "htlc_add",
            AccountTx::HtlcResolve { .. } => "htlc_resolve",
            AccountTx::SetCreditLimit { .. } => "set_credit_limit",
            AccountTx::SetAllowance { .. } => "set_allowance",
            AccountTx::SettlePropose { .. } => "settle_propose",
            AccountTx::SettleApprove { .. } => "settle_approve",
            AccountTx::SettleExecute => "settle_execute",
            AccountTx::JEventClaim { .. } => "j_event_claim",
            AccountTx::RebalanceRequest { .. } => "rebalance_request",
            AccountTx::RebalanceQuote { .. } => "rebalance_quote",
            AccountTx::RebalanceAccept { .. } => "rebalance_accept",
            AccountTx::SetRebalancePolicy { .. } => "set_rebalance_policy",
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// A proposed batch of account transactions advancing the account one nonce.
///
/// `proof_hash` commits to the post-state: the counter-signer replays `txs`
/// on its own state and must arrive at the identical hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFrame {
    pub nonce: Nonce,
    /// Proposer's entity-logical clock at proposal; the deterministic "now"
    /// for every tx in the frame.
    pub timestamp: Timestamp,
    pub proposer_is_left: bool,
    pub txs: Vec<AccountTx>,
    pub proof_hash: ProofHash,
}

/// The transport envelope between the two entities of an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInput {
    pub from: EntityId,
    pub to: EntityId,
    /// A newly proposed frame, if any.
    pub new_frame: Option<AccountFrame>,
    /// Proposer's signature over `new_frame.proof_hash`.
    pub own_hanko: Option<Hanko>,
    /// Counter-signature over the receiver's pending frame.
    pub counter_hanko: Option<Hanko>,
    /// Nonce the counter-signature refers to.
    pub counter_nonce: Option<Nonce>,
    /// Sender's hanko over the staged post-settlement dispute proof.
    /// Attached when counter-signing a frame that carried a `SettleApprove`,
    /// so both sides end up holding the peer's pre-signed proof.
    pub post_proof_hanko: Option<Hanko>,
}

// ── Frame effects ────────────────────────────────────────────────────────────

/// Side effects a committed frame hands up to the entity layer. The account
/// machine cannot reach entity state (batch, routes), so it returns these on
/// commit instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameEffect {
    /// A fully-signed settlement is ready for the proposer's j-batch.
    SubmitSettlement {
        counterparty: EntityId,
        diffs: Vec<SettleDiff>,
        left_hanko: Hanko,
        right_hanko: Hanko,
    },

    /// An HTLC resolved by pre-image; propagate backwards along the route.
    SecretLearned { hashlock: Hashlock, secret: Secret },

    /// A rebalance quote was accepted; the accepter owes the fee.
    RebalanceFeeDue {
        counterparty: EntityId,
        fee_token_id: TokenId,
        fee_amount: Amount,
    },
}

// ── Entity transactions ──────────────────────────────────────────────────────

/// A signer's observation of one jurisdiction block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JBlockObservation {
    pub signer_id: SignerId,
    pub j_height: u64,
    pub j_block_hash: JBlockHash,
    pub events: Vec<JurisdictionEvent>,
    pub observed_at: Timestamp,
}

/// A finalized jurisdiction block: threshold of signers agreed on
/// `(j_height, j_block_hash)` and the merged event set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JBlockFinalized {
    pub j_height: u64,
    pub j_block_hash: JBlockHash,
    pub events: Vec<JurisdictionEvent>,
    pub finalized_at: Timestamp,
    pub signer_count: u32,
}

/// The entity state machine's ordered input surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityTx {
    /// Advance the entity-logical clock; drives frame proposal and expiries.
    Tick { now: Timestamp },

    /// A signer's observation of a jurisdiction block.
    JEvent { observation: JBlockObservation },

    /// Move reserve into account collateral via the j-batch.
    /// With `rebalance_quote_id` set, the deposit fulfils the counterparty's
    /// rebalance request (collateral is credited to their side).
    DepositCollateral {
        counterparty: EntityId,
        token_id: TokenId,
        amount: Amount,
        rebalance_quote_id: Option<Timestamp>,
    },

    /// Admin faucet for demos and tests.
    MintReserves { token_id: TokenId, amount: Amount },

    /// Move reserve to another entity on-chain via the j-batch.
    TransferReserves {
        to: EntityId,
        token_id: TokenId,
        amount: Amount,
    },

    /// Broadcast the accumulated j-batch to the jurisdiction adapter.
    JBroadcast,

    /// Queue an account transaction into a named account's mempool.
    Account {
        counterparty: EntityId,
        tx: AccountTx,
    },
}
