//! End-to-end scenarios over two in-process entities.
//!
//! A `Net` wires two single-signer entities with an in-memory transport and
//! a recording jurisdiction adapter; tests drive the public entry points
//! (`process_entity_tx`, `receive_input`) exactly as an operator loop would.
//!
//! Run with:
//!   cargo test -p xln-consensus --test scenarios

use std::collections::{BTreeMap, VecDeque};

use xln_consensus::{counter_proofs, process_entity_tx};
use xln_core::account::{AccountStatus, Delta, RebalancePolicy};
use xln_core::entity::{Entity, EntityConfig, JBatchStatus};
use xln_core::event::{JEventKind, JurisdictionEvent};
use xln_core::tx::{
    AccountInput, AccountTx, EntityTx, JBlockObservation,
};
use xln_core::types::{
    Amount, EntityId, JBlockHash, JTxHash, LockId, ProofHash, Secret, TokenId,
};
use xln_core::XlnError;
use xln_crypto::{hashlock_from_secret, KeyPair};
use xln_entity::{AccountInfo, EntityRuntime, JBatchSubmission, JurisdictionAdapter};

const TOKEN: TokenId = 1;

// ── Simulated jurisdiction ────────────────────────────────────────────────────

/// Records submissions and answers reads from a configurable table.
#[derive(Default)]
struct SimAdapter {
    submissions: Vec<JBatchSubmission>,
    infos: BTreeMap<(EntityId, EntityId), AccountInfo>,
}

impl SimAdapter {
    fn set_info(&mut self, a: EntityId, b: EntityId, info: AccountInfo) {
        let key = if a < b { (a, b) } else { (b, a) };
        self.infos.insert(key, info);
    }
}

impl JurisdictionAdapter for SimAdapter {
    fn get_account_info(
        &self,
        left: &EntityId,
        right: &EntityId,
    ) -> Result<AccountInfo, XlnError> {
        let key = if left < right {
            (*left, *right)
        } else {
            (*right, *left)
        };
        Ok(self.infos.get(&key).copied().unwrap_or(AccountInfo {
            nonce: 0,
            dispute_timeout: 100,
        }))
    }

    fn get_collateral(
        &self,
        _left: &EntityId,
        _right: &EntityId,
        _token_id: TokenId,
    ) -> Result<Amount, XlnError> {
        Ok(0)
    }

    fn submit_batch(&mut self, submission: JBatchSubmission) -> Result<(), XlnError> {
        self.submissions.push(submission);
        Ok(())
    }
}

// ── Two-entity network ────────────────────────────────────────────────────────

/// Two entities and the wire between them. `a` is always the left entity.
struct Net {
    a: EntityRuntime,
    b: EntityRuntime,
    adapter: SimAdapter,
    wire: VecDeque<AccountInput>,
}

impl Net {
    fn new() -> Self {
        let k1 = KeyPair::generate();
        let k2 = KeyPair::generate();
        let (ka, kb) = if k1.entity_id < k2.entity_id {
            (k1, k2)
        } else {
            (k2, k1)
        };
        let ea = Entity::new(ka.entity_id, EntityConfig::single(ka.signer_id));
        let eb = Entity::new(kb.entity_id, EntityConfig::single(kb.signer_id));
        let mut a = EntityRuntime::new(ea, ka);
        let mut b = EntityRuntime::new(eb, kb);
        a.register_peer(b.entity.entity_id, b.signer.public_key.clone());
        b.register_peer(a.entity.entity_id, a.signer.public_key.clone());
        Self {
            a,
            b,
            adapter: SimAdapter::default(),
            wire: VecDeque::new(),
        }
    }

    fn a_id(&self) -> EntityId {
        self.a.entity.entity_id
    }

    fn b_id(&self) -> EntityId {
        self.b.entity.entity_id
    }

    /// Seed an identical funded account on both replicas.
    fn seed_account(&mut self, collateral: Amount, lcl: Amount, rcl: Amount) {
        let (a_id, b_id) = (self.a_id(), self.b_id());
        for (rt, cp) in [(&mut self.a, b_id), (&mut self.b, a_id)] {
            let account = rt.entity.account_mut(cp);
            let mut d = Delta::new(0);
            d.collateral = collateral;
            d.left_credit_limit = lcl;
            d.right_credit_limit = rcl;
            account.deltas.insert(TOKEN, d);
        }
    }

    /// Deliver queued account inputs until the wire is quiet.
    fn pump(&mut self) {
        while let Some(input) = self.wire.pop_front() {
            let mut outbox = Vec::new();
            if input.to == self.a.entity.entity_id {
                self.a.receive_input(&input, &mut outbox).unwrap();
            } else {
                self.b.receive_input(&input, &mut outbox).unwrap();
            }
            self.wire.extend(outbox);
        }
    }

    fn process_a(&mut self, tx: EntityTx) {
        let mut outbox = Vec::new();
        process_entity_tx(&mut self.a, tx, &mut self.adapter, &mut outbox).unwrap();
        self.wire.extend(outbox);
        self.pump();
    }

    fn process_b(&mut self, tx: EntityTx) {
        let mut outbox = Vec::new();
        process_entity_tx(&mut self.b, tx, &mut self.adapter, &mut outbox).unwrap();
        self.wire.extend(outbox);
        self.pump();
    }

    /// Both single-signer entities observe the same jurisdiction block.
    fn observe_both(&mut self, j_height: u64, events: Vec<JurisdictionEvent>) {
        let hash = JBlockHash([j_height as u8; 32]);
        let obs_a = JBlockObservation {
            signer_id: self.a.signer.signer_id,
            j_height,
            j_block_hash: hash,
            events: events.clone(),
            observed_at: self.a.entity.timestamp,
        };
        let obs_b = JBlockObservation {
            signer_id: self.b.signer.signer_id,
            j_height,
            j_block_hash: hash,
            events,
            observed_at: self.b.entity.timestamp,
        };
        self.process_a(EntityTx::JEvent { observation: obs_a });
        self.process_b(EntityTx::JEvent { observation: obs_b });
    }

    fn account_a(&self) -> &xln_core::account::Account {
        &self.a.entity.accounts[&self.b.entity.entity_id]
    }

    fn account_b(&self) -> &xln_core::account::Account {
        &self.b.entity.accounts[&self.a.entity.entity_id]
    }
}

fn ev(j: u64, kind: JEventKind) -> JurisdictionEvent {
    JurisdictionEvent {
        block_number: j,
        block_hash: JBlockHash([j as u8; 32]),
        tx_hash: JTxHash([j as u8 ^ 0xFF; 32]),
        kind,
    }
}

// ── S1/S2: payments and HTLCs over the wire ───────────────────────────────────

#[test]
fn direct_payment_settles_on_both_replicas() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let (a, b) = (net.a_id(), net.b_id());

    net.process_a(EntityTx::Account {
        counterparty: b,
        tx: AccountTx::DirectPayment {
            from: a,
            to: b,
            token_id: TOKEN,
            amount: 30,
            description: Some("coffee".into()),
        },
    });

    assert_eq!(net.account_a().deltas[&TOKEN].offdelta, 30);
    assert_eq!(net.account_b().deltas[&TOKEN].offdelta, 30);
    assert_eq!(net.account_a().proof_header.nonce, 1);
    assert_eq!(net.account_b().proof_header.nonce, 1);
}

#[test]
fn onchain_secret_reveal_resolves_inbound_htlc() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let (a, b) = (net.a_id(), net.b_id());
    let secret = Secret([42u8; 32]);
    let hashlock = hashlock_from_secret(&secret);

    // A pays 30, then locks 40 behind the hashlock.
    net.process_a(EntityTx::Account {
        counterparty: b,
        tx: AccountTx::DirectPayment {
            from: a,
            to: b,
            token_id: TOKEN,
            amount: 30,
            description: None,
        },
    });
    net.process_a(EntityTx::Account {
        counterparty: b,
        tx: AccountTx::HtlcAdd {
            lock_id: LockId([1u8; 32]),
            hashlock,
            amount: 40,
            token_id: TOKEN,
            expiry: 1_000_000,
        },
    });
    assert!(net.account_b().locks.contains_key(&LockId([1u8; 32])));

    // B's entity finalizes an on-chain SecretRevealed: the inbound resolve
    // fires through the normal frame flow without any signature from the
    // revealer.
    let reveal = ev(1, JEventKind::SecretRevealed { hashlock, secret });
    let obs = JBlockObservation {
        signer_id: net.b.signer.signer_id,
        j_height: 1,
        j_block_hash: JBlockHash([1u8; 32]),
        events: vec![reveal],
        observed_at: 0,
    };
    net.process_b(EntityTx::JEvent { observation: obs });

    assert_eq!(net.account_a().deltas[&TOKEN].offdelta, 70);
    assert_eq!(net.account_b().deltas[&TOKEN].offdelta, 70);
    assert!(net.account_a().locks.is_empty());
    assert!(net.account_b().locks.is_empty());
    assert!(net.b.entity.known_secrets.contains_key(&hashlock));
}

#[test]
fn lost_frame_recovers_via_resend() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let (a, b) = (net.a_id(), net.b_id());

    // Queue a payment but drop the proposal on the floor (transport loss).
    let mut lost = Vec::new();
    net.a
        .apply(
            EntityTx::Account {
                counterparty: b,
                tx: AccountTx::DirectPayment {
                    from: a,
                    to: b,
                    token_id: TOKEN,
                    amount: 12,
                    description: None,
                },
            },
            &mut net.adapter,
            &mut lost,
        )
        .unwrap();
    assert_eq!(lost.len(), 1);
    drop(lost);
    assert_eq!(net.account_b().proof_header.nonce, 0);

    // Resync: the proposer re-emits its pending input and the frame lands.
    let mut outbox = Vec::new();
    net.a.resend_pending(&mut outbox);
    assert_eq!(outbox.len(), 1);
    net.wire.extend(outbox);
    net.pump();
    assert_eq!(net.account_a().proof_header.nonce, 1);
    assert_eq!(net.account_b().deltas[&TOKEN].offdelta, 12);
}

// ── S3: reserve → collateral settlement, 2-of-2 ──────────────────────────────

#[test]
fn deposit_settles_bilaterally() {
    let mut net = Net::new();
    let (a, b) = (net.a_id(), net.b_id());

    net.process_a(EntityTx::MintReserves {
        token_id: TOKEN,
        amount: 200,
    });
    net.process_a(EntityTx::DepositCollateral {
        counterparty: b,
        token_id: TOKEN,
        amount: 80,
        rebalance_quote_id: None,
    });
    net.process_a(EntityTx::JBroadcast);
    assert_eq!(net.adapter.submissions.len(), 1);
    let sub_nonce = net.adapter.submissions[0].entity_nonce;

    // The jurisdiction block carrying the batch outcome and settlement.
    let events = vec![
        ev(
            1,
            JEventKind::HankoBatchProcessed {
                entity_id: a,
                hanko_hash: [0u8; 32],
                nonce: sub_nonce,
                success: true,
                op_count: 1,
            },
        ),
        ev(
            1,
            JEventKind::ReserveUpdated {
                entity: a,
                token_id: TOKEN,
                new_balance: 120,
            },
        ),
        ev(
            1,
            JEventKind::AccountSettled {
                left_entity: a,
                right_entity: b,
                token_id: TOKEN,
                left_reserve: 120,
                right_reserve: 0,
                collateral: 80,
                ondelta: 0,
                nonce: 1,
            },
        ),
    ];
    net.observe_both(1, events);

    // Entity-level effects.
    assert_eq!(net.a.entity.reserve(TOKEN), 120);
    assert_eq!(net.a.entity.j_batch.status, JBatchStatus::Empty);
    assert!(net.a.entity.j_batch.sent_batch.is_none());
    assert_eq!(net.a.entity.last_finalized_j_height, 1);
    assert_eq!(net.b.entity.last_finalized_j_height, 1);

    // Shared account state moved only after both sides claimed the event.
    for account in [net.account_a(), net.account_b()] {
        assert_eq!(account.deltas[&TOKEN].collateral, 80);
        assert_eq!(account.deltas[&TOKEN].ondelta, 0);
        assert_eq!(account.on_chain_settlement_nonce, 1);
        assert_eq!(account.last_finalized_j_height, 1);
        assert_eq!(account.j_event_chain.len(), 1);
    }
}

#[test]
fn reserve_transfer_rides_the_batch() {
    let mut net = Net::new();
    let b = net.b_id();

    net.process_a(EntityTx::MintReserves {
        token_id: TOKEN,
        amount: 100,
    });
    net.process_a(EntityTx::TransferReserves {
        to: b,
        token_id: TOKEN,
        amount: 40,
    });
    net.process_a(EntityTx::JBroadcast);

    let batch = &net.adapter.submissions[0].batch;
    assert_eq!(batch.reserve_to_reserve.len(), 1);
    assert_eq!(batch.reserve_to_reserve[0].to, b);
    assert_eq!(batch.reserve_to_reserve[0].amount, 40);

    // Transfers past the reserve are refused at the entity surface.
    let mut outbox = Vec::new();
    let err = net
        .a
        .apply(
            EntityTx::TransferReserves {
                to: b,
                token_id: TOKEN,
                amount: 101,
            },
            &mut net.adapter,
            &mut outbox,
        )
        .unwrap_err();
    assert!(matches!(err, XlnError::InsufficientReserve { .. }));
}

// ── S6: batch failure and retry ───────────────────────────────────────────────

#[test]
fn failed_batch_retries_with_synced_nonce() {
    let mut net = Net::new();
    let (a, b) = (net.a_id(), net.b_id());

    net.process_a(EntityTx::MintReserves {
        token_id: TOKEN,
        amount: 500,
    });
    net.process_a(EntityTx::DepositCollateral {
        counterparty: b,
        token_id: TOKEN,
        amount: 80,
        rebalance_quote_id: None,
    });
    net.process_a(EntityTx::JBroadcast);

    net.observe_both(
        1,
        vec![ev(
            1,
            JEventKind::HankoBatchProcessed {
                entity_id: a,
                hanko_hash: [0u8; 32],
                nonce: 4,
                success: false,
                op_count: 1,
            },
        )],
    );
    assert_eq!(net.a.entity.j_batch.entity_nonce, 4);
    assert_eq!(net.a.entity.j_batch.failed_attempts, 1);
    assert_eq!(net.a.entity.j_batch.batch.op_count(), 1);

    // Operator retries next tick.
    net.process_a(EntityTx::JBroadcast);
    assert_eq!(net.adapter.submissions.len(), 2);
    assert_eq!(net.adapter.submissions[1].entity_nonce, 5);
    net.observe_both(
        2,
        vec![ev(
            2,
            JEventKind::HankoBatchProcessed {
                entity_id: a,
                hanko_hash: [0u8; 32],
                nonce: 5,
                success: true,
                op_count: 1,
            },
        )],
    );
    assert_eq!(net.a.entity.j_batch.entity_nonce, 5);
    assert!(net.a.entity.j_batch.sent_batch.is_none());
    assert_eq!(net.a.entity.batch_history.len(), 1);
}

// ── S5: dispute with a stale proof ────────────────────────────────────────────

#[test]
fn stale_dispute_is_countered_and_finalized() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let (a, b) = (net.a_id(), net.b_id());

    // Advance to nonce 3 with three payments.
    for amount in [10, 5, 5] {
        net.process_a(EntityTx::Account {
            counterparty: b,
            tx: AccountTx::DirectPayment {
                from: a,
                to: b,
                token_id: TOKEN,
                amount,
                description: None,
            },
        });
    }
    assert_eq!(net.account_a().proof_header.nonce, 3);
    let latest = net.account_a().current_dispute_proof.clone().unwrap();
    assert_eq!(latest.nonce, 3);

    // B goes to chain with a stale nonce-1 proof.
    net.observe_both(
        1,
        vec![ev(
            1,
            JEventKind::DisputeStarted {
                sender: b,
                counterentity: a,
                nonce: 1,
                proofbody_hash: ProofHash([0xEE; 32]),
                initial_arguments: vec![],
            },
        )],
    );

    let account = net.account_a();
    assert_eq!(account.status, AccountStatus::Disputed);
    let dispute = account.active_dispute.as_ref().unwrap();
    assert_eq!(dispute.initial_nonce, 1);
    assert!(!dispute.started_by_left);

    // Our newer counter-signed proof is available for submission.
    let counters = counter_proofs(&net.a);
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].1.nonce, 3);

    // While disputed, new payments are refused at admission.
    let mut outbox = Vec::new();
    let err = net
        .a
        .apply(
            EntityTx::Account {
                counterparty: b,
                tx: AccountTx::DirectPayment {
                    from: a,
                    to: b,
                    token_id: TOKEN,
                    amount: 1,
                    description: None,
                },
            },
            &mut net.adapter,
            &mut outbox,
        )
        .unwrap_err();
    assert!(matches!(err, XlnError::AccountDisputed));

    // The chain adopts our proof; the dispute finalizes at nonce 3.
    net.adapter.set_info(
        a,
        b,
        AccountInfo {
            nonce: 3,
            dispute_timeout: 100,
        },
    );
    net.observe_both(
        2,
        vec![ev(
            2,
            JEventKind::DisputeFinalized {
                sender: b,
                counterentity: a,
                initial_nonce: 1,
                initial_proofbody_hash: ProofHash([0xEE; 32]),
                final_proofbody_hash: latest.body_hash,
            },
        )],
    );

    let account = net.account_a();
    assert_eq!(account.status, AccountStatus::Active);
    assert!(account.active_dispute.is_none());
    assert_eq!(account.on_chain_settlement_nonce, 3);
    assert_eq!(account.proof_header.nonce, 4);
    assert_eq!(account.rollback_count, 0);
    assert!(account.counterparty_dispute_proof.is_none());
}

// ── Threshold consensus ───────────────────────────────────────────────────────

#[test]
fn jblock_finalizes_at_unique_signer_threshold() {
    let signers: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let kp = KeyPair::generate();
    let config = EntityConfig {
        signers: signers.iter().map(|s| s.signer_id).collect(),
        threshold: 2,
        default_credit_limit: 0,
        batch_history_limit: 20,
    };
    let mut rt = EntityRuntime::new(Entity::new(kp.entity_id, config), kp);
    let mut adapter = SimAdapter::default();
    let mut outbox = Vec::new();

    let obs = |signer: &KeyPair, hash: u8| JBlockObservation {
        signer_id: signer.signer_id,
        j_height: 1,
        j_block_hash: JBlockHash([hash; 32]),
        events: vec![],
        observed_at: 0,
    };

    // First signer: below threshold.
    process_entity_tx(
        &mut rt,
        EntityTx::JEvent { observation: obs(&signers[0], 1) },
        &mut adapter,
        &mut outbox,
    )
    .unwrap();
    assert!(rt.entity.j_block_chain.is_empty());

    // Same signer again: unique count unchanged.
    process_entity_tx(
        &mut rt,
        EntityTx::JEvent { observation: obs(&signers[0], 1) },
        &mut adapter,
        &mut outbox,
    )
    .unwrap();
    assert!(rt.entity.j_block_chain.is_empty());

    // Conflicting hash from another signer: separate group, still below.
    process_entity_tx(
        &mut rt,
        EntityTx::JEvent { observation: obs(&signers[1], 9) },
        &mut adapter,
        &mut outbox,
    )
    .unwrap();
    assert!(rt.entity.j_block_chain.is_empty());

    // Second unique signer on the first hash: finalized.
    process_entity_tx(
        &mut rt,
        EntityTx::JEvent { observation: obs(&signers[1], 1) },
        &mut adapter,
        &mut outbox,
    )
    .unwrap();
    assert_eq!(rt.entity.j_block_chain.len(), 1);
    assert_eq!(rt.entity.last_finalized_j_height, 1);
    assert_eq!(rt.entity.j_block_chain[0].signer_count, 2);
    // All height-1 observations pruned, conflicting hash included.
    assert!(rt.entity.j_block_observations.is_empty());

    // Stale observations are rejected outright.
    let err = rt
        .apply(
            EntityTx::JEvent { observation: obs(&signers[2], 1) },
            &mut adapter,
            &mut outbox,
        )
        .unwrap_err();
    assert!(matches!(err, XlnError::StaleJHeight { .. }));

    // Unknown signers are rejected.
    let stranger = KeyPair::generate();
    let err = rt
        .apply(
            EntityTx::JEvent {
                observation: JBlockObservation {
                    signer_id: stranger.signer_id,
                    j_height: 2,
                    j_block_hash: JBlockHash([2u8; 32]),
                    events: vec![],
                    observed_at: 0,
                },
            },
            &mut adapter,
            &mut outbox,
        )
        .unwrap_err();
    assert!(matches!(err, XlnError::UnknownSigner(_)));
}

#[test]
fn duplicate_events_within_a_block_are_merged() {
    let kp = KeyPair::generate();
    let config = EntityConfig::single(kp.signer_id);
    let entity_id = kp.entity_id;
    let mut rt = EntityRuntime::new(Entity::new(entity_id, config), kp);
    let mut adapter = SimAdapter::default();
    let mut outbox = Vec::new();

    let reserve = ev(
        1,
        JEventKind::ReserveUpdated {
            entity: entity_id,
            token_id: TOKEN,
            new_balance: 42,
        },
    );
    let obs = JBlockObservation {
        signer_id: rt.signer.signer_id,
        j_height: 1,
        j_block_hash: JBlockHash([1u8; 32]),
        events: vec![reserve.clone(), reserve],
        observed_at: 0,
    };
    process_entity_tx(&mut rt, EntityTx::JEvent { observation: obs }, &mut adapter, &mut outbox)
        .unwrap();

    assert_eq!(rt.entity.j_block_chain[0].events.len(), 1);
    assert_eq!(rt.entity.reserve(TOKEN), 42);
}

// ── Rebalance freeze through the entity surface ───────────────────────────────

#[test]
fn rebalance_deposit_freezes_fee_state_until_failure() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let (a, b) = (net.a_id(), net.b_id());

    net.process_b(EntityTx::MintReserves {
        token_id: TOKEN,
        amount: 500,
    });
    // B fulfils A's rebalance request: collateral goes to A's side.
    net.process_b(EntityTx::DepositCollateral {
        counterparty: a,
        token_id: TOKEN,
        amount: 200,
        rebalance_quote_id: Some(1_000),
    });
    let op = &net.b.entity.j_batch.batch.reserve_to_collateral[0];
    assert_eq!(op.receiver, a);
    assert!(net
        .account_b()
        .requested_rebalance_fee_state
        .j_batch_submitted_at
        .is_some());

    net.process_b(EntityTx::JBroadcast);
    net.observe_both(
        1,
        vec![ev(
            1,
            JEventKind::HankoBatchProcessed {
                entity_id: b,
                hanko_hash: [0u8; 32],
                nonce: 1,
                success: false,
                op_count: 1,
            },
        )],
    );
    // Failure unfreezes the fee state for retry.
    assert!(net
        .account_b()
        .requested_rebalance_fee_state
        .j_batch_submitted_at
        .is_none());
}

#[test]
fn armed_policy_requests_rebalance_on_tick() {
    let mut net = Net::new();
    net.seed_account(100, 50, 50);
    let b = net.b_id();

    // A arms a floor above its current inbound collateral (zero at delta 0).
    net.process_a(EntityTx::Account {
        counterparty: b,
        tx: AccountTx::SetRebalancePolicy {
            token_id: TOKEN,
            policy: Some(RebalancePolicy {
                min_in_collateral: 10,
                top_up: 60,
            }),
        },
    });
    assert_eq!(net.account_b().left_rebalance_policy[&TOKEN].top_up, 60);

    // The next tick queues the request; the committed frame lands it on
    // both replicas.
    net.process_a(EntityTx::Tick { now: 1_000 });
    assert_eq!(net.account_a().requested_rebalance[&TOKEN], 60);
    assert_eq!(net.account_b().requested_rebalance[&TOKEN], 60);

    // A second tick does not re-request while one is outstanding.
    let nonce = net.account_a().proof_header.nonce;
    net.process_a(EntityTx::Tick { now: 2_000 });
    assert_eq!(net.account_a().proof_header.nonce, nonce);

    // Clearing the policy disarms the trigger.
    net.process_a(EntityTx::Account {
        counterparty: b,
        tx: AccountTx::SetRebalancePolicy {
            token_id: TOKEN,
            policy: None,
        },
    });
    assert!(net.account_b().left_rebalance_policy.is_empty());
}
