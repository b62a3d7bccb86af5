//! The entity engine: dispatches entity-level transactions, drives account
//! frame proposal, and consumes the effects committed frames hand back up.
//!
//! One `EntityRuntime` wraps one entity's state with its signing key and the
//! public keys of known counterparties. All methods are synchronous and
//! deterministic over `(state, input, logical clock)`; outgoing account
//! inputs accumulate in a caller-supplied outbox.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use xln_account::machine;
use xln_core::account::{AccountStatus, LogCategory};
use xln_core::entity::{Entity, ReserveToCollateralOp, ReserveToReserveOp, SettleOp};
use xln_core::error::XlnError;
use xln_core::tx::{AccountInput, AccountTx, EntityTx, FrameEffect, HtlcOutcome, JBlockObservation};
use xln_core::types::{DilithiumPublicKey, EntityId, Timestamp};
use xln_crypto::KeyPair;

use crate::adapter::JurisdictionAdapter;
use crate::batch;
use crate::routes;

/// One entity's live state plus the capabilities the core may not own:
/// its signing key and the directory of counterparty keys.
pub struct EntityRuntime {
    pub entity: Entity,
    pub signer: KeyPair,
    pub peers: BTreeMap<EntityId, DilithiumPublicKey>,
}

impl EntityRuntime {
    pub fn new(entity: Entity, signer: KeyPair) -> Self {
        Self {
            entity,
            signer,
            peers: BTreeMap::new(),
        }
    }

    pub fn register_peer(&mut self, entity_id: EntityId, public_key: DilithiumPublicKey) {
        self.peers.insert(entity_id, public_key);
    }

    fn default_credit_limit(&self) -> i128 {
        self.entity.config.default_credit_limit
    }

    // ── Entity transaction dispatch ──────────────────────────────────────────

    /// Apply one entity-level transaction.
    ///
    /// `j_event` observations are only recorded here; grouping, threshold
    /// and event application are the consensus layer's job.
    pub fn apply(
        &mut self,
        tx: EntityTx,
        adapter: &mut dyn JurisdictionAdapter,
        outbox: &mut Vec<AccountInput>,
    ) -> Result<(), XlnError> {
        match tx {
            EntityTx::Tick { now } => {
                self.entity.advance_clock(now);
                self.expire_due_locks()?;
                routes::prune_settled(&mut self.entity);
                self.request_due_rebalances()?;
                self.propose_all(outbox)?;
                Ok(())
            }

            EntityTx::JEvent { observation } => self.record_observation(observation),

            EntityTx::MintReserves { token_id, amount } => {
                if amount <= 0 {
                    return Err(XlnError::ZeroAmount);
                }
                *self.entity.reserves.entry(token_id).or_insert(0) += amount;
                self.entity.log(
                    LogCategory::System,
                    format!("minted {} of token {}", amount, token_id),
                );
                Ok(())
            }

            EntityTx::TransferReserves {
                to,
                token_id,
                amount,
            } => {
                if amount <= 0 {
                    return Err(XlnError::ZeroAmount);
                }
                if to == self.entity.entity_id {
                    return Err(XlnError::SelfAccount);
                }
                let have = self.entity.reserve(token_id);
                if have < amount {
                    return Err(XlnError::InsufficientReserve { need: amount, have });
                }
                batch::add_reserve_to_reserve(
                    &mut self.entity,
                    ReserveToReserveOp {
                        to,
                        token_id,
                        amount,
                    },
                );
                self.entity.log(
                    LogCategory::Settlement,
                    format!(
                        "reserve transfer of {} (token {}) queued to j-batch",
                        amount, token_id
                    ),
                );
                Ok(())
            }

            EntityTx::DepositCollateral {
                counterparty,
                token_id,
                amount,
                rebalance_quote_id,
            } => {
                if amount <= 0 {
                    return Err(XlnError::ZeroAmount);
                }
                if counterparty == self.entity.entity_id {
                    return Err(XlnError::SelfAccount);
                }
                let have = self.entity.reserve(token_id);
                if have < amount {
                    return Err(XlnError::InsufficientReserve { need: amount, have });
                }

                // A rebalance deposit credits the counterparty's side; an
                // ordinary deposit credits our own.
                let receiver = if rebalance_quote_id.is_some() {
                    counterparty
                } else {
                    self.entity.entity_id
                };
                batch::add_reserve_to_collateral(
                    &mut self.entity,
                    ReserveToCollateralOp {
                        counterparty,
                        receiver,
                        token_id,
                        amount,
                    },
                );
                if rebalance_quote_id.is_some() {
                    let now = self.entity.timestamp;
                    let account = self.entity.account_mut(counterparty);
                    account.requested_rebalance_fee_state.j_batch_submitted_at = Some(now);
                }
                self.entity.log(
                    LogCategory::Settlement,
                    format!("deposit of {} (token {}) queued to j-batch", amount, token_id),
                );
                Ok(())
            }

            EntityTx::JBroadcast => {
                let submission = batch::broadcast(&mut self.entity, &self.signer)?;
                adapter.submit_batch(submission)?;
                self.entity
                    .log(LogCategory::Settlement, "j-batch broadcast to jurisdiction");
                Ok(())
            }

            EntityTx::Account { counterparty, tx } => {
                if counterparty == self.entity.entity_id {
                    return Err(XlnError::SelfAccount);
                }
                let our_is_left = self.entity.is_left_of(&counterparty);
                let now = self.entity.timestamp;
                let dcl = self.default_credit_limit();
                if let AccountTx::HtlcAdd {
                    lock_id, hashlock, ..
                } = &tx
                {
                    routes::register_lock(&mut self.entity, *lock_id, counterparty);
                    // A forward: an inbound lock with the same hashlock on
                    // another account is the prior hop this lock extends.
                    if let Some(prior) = routes::find_inbound_lock(&self.entity, counterparty, hashlock)
                    {
                        routes::register_route(&mut self.entity, *lock_id, prior);
                    }
                }
                let account = self.entity.account_mut(counterparty);
                machine::enqueue(account, our_is_left, tx, now, dcl)?;
                self.propose_for(counterparty, outbox)?;
                Ok(())
            }
        }
    }

    /// Record a signer's j-block observation (C7 step 1–2).
    fn record_observation(&mut self, observation: JBlockObservation) -> Result<(), XlnError> {
        if !self.entity.config.is_signer(&observation.signer_id) {
            return Err(XlnError::UnknownSigner(observation.signer_id.to_hex()));
        }
        if observation.j_height <= self.entity.last_finalized_j_height {
            return Err(XlnError::StaleJHeight {
                height: observation.j_height,
                last_finalized: self.entity.last_finalized_j_height,
            });
        }
        debug!(
            signer = %observation.signer_id,
            j_height = observation.j_height,
            events = observation.events.len(),
            "j-block observation recorded"
        );
        self.entity.j_block_observations.push(observation);
        Ok(())
    }

    // ── Peer input ───────────────────────────────────────────────────────────

    /// Deliver one `AccountInput` from a counterparty.
    pub fn receive_input(
        &mut self,
        input: &AccountInput,
        outbox: &mut Vec<AccountInput>,
    ) -> Result<(), XlnError> {
        let from = input.from;
        let peer_pk = self
            .peers
            .get(&from)
            .cloned()
            .ok_or_else(|| XlnError::UnknownAccount(from.to_hex()))?;
        let our_is_left = self.entity.is_left_of(&from);
        let now = self.entity.timestamp;
        let dcl = self.default_credit_limit();

        let account = self.entity.account_mut(from);
        let result =
            machine::handle_input(account, our_is_left, input, now, &self.signer, &peer_pk, dcl)?;

        if let Some(reply) = result.reply {
            outbox.push(reply);
        }
        self.consume_effects(result.effects, outbox)?;

        // A commit may have unblocked queued transactions (e.g. after a
        // rollback); keep the account moving.
        self.propose_for(from, outbox)?;
        Ok(())
    }

    /// Consume the effects a committed frame handed up.
    pub fn consume_effects(
        &mut self,
        effects: Vec<FrameEffect>,
        outbox: &mut Vec<AccountInput>,
    ) -> Result<(), XlnError> {
        for effect in effects {
            match effect {
                FrameEffect::SubmitSettlement {
                    counterparty,
                    diffs,
                    left_hanko,
                    right_hanko,
                } => {
                    batch::add_settlement(
                        &mut self.entity,
                        SettleOp {
                            counterparty,
                            diffs,
                            left_hanko,
                            right_hanko,
                        },
                    );
                    info!("signed settlement moved into j-batch");
                }

                FrameEffect::SecretLearned { hashlock, secret } => {
                    let resolves = routes::propagate_secret(&mut self.entity, hashlock, secret);
                    let now = self.entity.timestamp;
                    let dcl = self.default_credit_limit();
                    for (cp, tx) in resolves {
                        let our_is_left = self.entity.is_left_of(&cp);
                        let account = self.entity.account_mut(cp);
                        if let Err(e) = machine::enqueue(account, our_is_left, tx, now, dcl) {
                            warn!(error = %e, "inbound resolve rejected at admission");
                        }
                        self.propose_for(cp, outbox)?;
                    }
                }

                FrameEffect::RebalanceFeeDue {
                    counterparty,
                    fee_token_id,
                    fee_amount,
                } => {
                    let fee = AccountTx::DirectPayment {
                        from: self.entity.entity_id,
                        to: counterparty,
                        token_id: fee_token_id,
                        amount: fee_amount,
                        description: Some("rebalance fee".into()),
                    };
                    let our_is_left = self.entity.is_left_of(&counterparty);
                    let now = self.entity.timestamp;
                    let dcl = self.default_credit_limit();
                    let account = self.entity.account_mut(counterparty);
                    machine::enqueue(account, our_is_left, fee, now, dcl)?;
                    account.requested_rebalance_fee_state.fee_paid = true;
                    self.propose_for(counterparty, outbox)?;
                }
            }
        }
        Ok(())
    }

    // ── Frame proposal driving ───────────────────────────────────────────────

    /// Propose a frame on one account if it is idle with queued work.
    pub fn propose_for(
        &mut self,
        counterparty: EntityId,
        outbox: &mut Vec<AccountInput>,
    ) -> Result<(), XlnError> {
        let our_is_left = self.entity.is_left_of(&counterparty);
        let now = self.entity.timestamp;
        let dcl = self.default_credit_limit();
        let account = self.entity.account_mut(counterparty);
        if let Some(input) = machine::propose_frame(account, our_is_left, now, &self.signer, dcl)? {
            outbox.push(input);
        }
        Ok(())
    }

    /// Propose frames on every account with queued work.
    pub fn propose_all(&mut self, outbox: &mut Vec<AccountInput>) -> Result<(), XlnError> {
        let counterparties: Vec<EntityId> = self.entity.accounts.keys().copied().collect();
        for cp in counterparties {
            self.propose_for(cp, outbox)?;
        }
        Ok(())
    }

    /// Re-emit pending proposals after a transport loss (inbox replay).
    pub fn resend_pending(&self, outbox: &mut Vec<AccountInput>) {
        for account in self.entity.accounts.values() {
            if let Some(input) = machine::resend_pending(account) {
                outbox.push(input);
            }
        }
    }

    // ── Expiry sweep ─────────────────────────────────────────────────────────

    /// Queue expiry resolves for our own locks whose expiry has passed.
    fn expire_due_locks(&mut self) -> Result<(), XlnError> {
        let now = self.entity.timestamp;
        let our = self.entity.entity_id;
        let dcl = self.default_credit_limit();
        let counterparties: Vec<EntityId> = self.entity.accounts.keys().copied().collect();

        for cp in counterparties {
            let due: Vec<_> = {
                let Some(account) = self.entity.accounts.get(&cp) else {
                    continue;
                };
                if account.status != AccountStatus::Active {
                    continue;
                }
                let our_is_left = account.is_left(&our);
                account
                    .locks
                    .values()
                    .filter(|l| l.sender_is_left == our_is_left && l.expiry <= now)
                    .filter(|l| {
                        let id = l.lock_id;
                        let queued = account.mempool.iter().any(|t| {
                            matches!(t, AccountTx::HtlcResolve { lock_id, .. } if *lock_id == id)
                        });
                        let in_flight = account.pending_frame.as_ref().is_some_and(|f| {
                            f.txs.iter().any(|t| {
                                matches!(t, AccountTx::HtlcResolve { lock_id, .. } if *lock_id == id)
                            })
                        });
                        !queued && !in_flight
                    })
                    .map(|l| l.lock_id)
                    .collect()
            };

            let our_is_left = self.entity.is_left_of(&cp);
            for lock_id in due {
                let account = self.entity.account_mut(cp);
                machine::enqueue(
                    account,
                    our_is_left,
                    AccountTx::HtlcResolve {
                        lock_id,
                        outcome: HtlcOutcome::Expiry,
                    },
                    now,
                    dcl,
                )?;
                routes::forget_lock(&mut self.entity, &lock_id);
            }
        }
        Ok(())
    }

    /// Queue rebalance requests armed by policy: a side whose inbound
    /// collateral fell below its floor asks the peer to top it up.
    fn request_due_rebalances(&mut self) -> Result<(), XlnError> {
        let now = self.entity.timestamp;
        let our = self.entity.entity_id;
        let dcl = self.default_credit_limit();
        let counterparties: Vec<EntityId> = self.entity.accounts.keys().copied().collect();

        for cp in counterparties {
            let due: Vec<AccountTx> = {
                let Some(account) = self.entity.accounts.get(&cp) else {
                    continue;
                };
                if account.status != AccountStatus::Active {
                    continue;
                }
                let our_is_left = account.is_left(&our);
                let policies = if our_is_left {
                    &account.left_rebalance_policy
                } else {
                    &account.right_rebalance_policy
                };
                policies
                    .iter()
                    .filter(|(token, _)| !account.requested_rebalance.contains_key(*token))
                    .filter(|(token, _)| {
                        let queued = account.mempool.iter().any(|t| {
                            matches!(t, AccountTx::RebalanceRequest { token_id, .. } if token_id == *token)
                        });
                        let in_flight = account.pending_frame.as_ref().is_some_and(|f| {
                            f.txs.iter().any(|t| {
                                matches!(t, AccountTx::RebalanceRequest { token_id, .. } if token_id == *token)
                            })
                        });
                        !queued && !in_flight
                    })
                    .filter_map(|(token, policy)| {
                        let delta = account.deltas.get(token)?;
                        let derived = xln_core::delta::derive(delta, our_is_left);
                        (derived.in_collateral < policy.min_in_collateral).then_some(
                            AccountTx::RebalanceRequest {
                                token_id: *token,
                                amount: policy.top_up,
                            },
                        )
                    })
                    .collect()
            };

            let our_is_left = self.entity.is_left_of(&cp);
            for tx in due {
                let account = self.entity.account_mut(cp);
                machine::enqueue(account, our_is_left, tx, now, dcl)?;
            }
        }
        Ok(())
    }

    /// Current logical time, for operator convenience.
    pub fn now(&self) -> Timestamp {
        self.entity.timestamp
    }
}
