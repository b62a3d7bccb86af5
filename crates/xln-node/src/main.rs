//! xln-node — a two-entity XLN demo node.
//!
//! Startup sequence:
//!   1. Open (or initialise) the entity store
//!   2. Create two single-signer entities with fresh keypairs
//!   3. Run the scenario: fund → deposit collateral → pay → HTLC →
//!      on-chain secret reveal → cooperative settlement
//!   4. Persist both entities and print a state summary
//!
//! The jurisdiction is simulated in-process; the account transport is an
//! in-memory queue. Everything the entities execute is the same code a real
//! deployment runs.

mod sim;

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use xln_account::{build_proof_at, settlement_payload_hash};
use xln_consensus::process_entity_tx;
use xln_core::entity::{Entity, EntityConfig};
use xln_core::tx::{AccountInput, AccountTx, EntityTx, JBlockObservation, SettleDiff};
use xln_core::types::{LockId, Secret, TokenId};
use xln_crypto::{hashlock_from_secret, KeyPair};
use zeroize::Zeroizing;
use xln_entity::EntityRuntime;
use xln_store::EntityStore;

use sim::SimJurisdiction;

const TOKEN: TokenId = 1;

#[derive(Parser, Debug)]
#[command(
    name = "xln-node",
    version,
    about = "XLN demo node — bilateral accounts over a simulated jurisdiction"
)]
struct Args {
    /// Directory for the persistent entity store.
    #[arg(long, default_value = "~/.xln/data")]
    data_dir: PathBuf,

    /// Dump full entity state as JSON at the end.
    #[arg(long)]
    dump_state: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,xln=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("XLN demo node starting");

    // ── Entity store ──────────────────────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let store = EntityStore::open(&data_dir).context("opening entity store")?;

    // ── Two entities, in-memory wire, simulated jurisdiction ─────────────────
    let alice_kp = load_or_create_keypair(&store, "alice_keys")?;
    let bob_kp = load_or_create_keypair(&store, "bob_keys")?;
    let mut alice = EntityRuntime::new(
        Entity::new(alice_kp.entity_id, EntityConfig::single(alice_kp.signer_id)),
        alice_kp,
    );
    let mut bob = EntityRuntime::new(
        Entity::new(bob_kp.entity_id, EntityConfig::single(bob_kp.signer_id)),
        bob_kp,
    );
    alice.register_peer(bob.entity.entity_id, bob.signer.public_key.clone());
    bob.register_peer(alice.entity.entity_id, alice.signer.public_key.clone());

    let alice_id = alice.entity.entity_id;
    let bob_id = bob.entity.entity_id;
    info!(alice = %alice_id.to_b58(), bob = %bob_id.to_b58(), "entities ready");

    let mut chain = SimJurisdiction::new();
    let mut wire: VecDeque<AccountInput> = VecDeque::new();
    let mut now: i64 = 1_700_000_000_000;

    macro_rules! drive {
        ($rt:expr, $tx:expr) => {{
            let mut outbox = Vec::new();
            process_entity_tx(&mut $rt, $tx, &mut chain, &mut outbox)
                .context("entity transaction failed")?;
            wire.extend(outbox);
            pump(&mut alice, &mut bob, &mut wire)?;
        }};
    }
    macro_rules! mine_and_observe {
        () => {{
            let (height, hash, events) = chain.produce_block();
            for rt_name in ["alice", "bob"] {
                let rt = if rt_name == "alice" { &mut alice } else { &mut bob };
                let observation = JBlockObservation {
                    signer_id: rt.signer.signer_id,
                    j_height: height,
                    j_block_hash: hash,
                    events: events.clone(),
                    observed_at: now,
                };
                let mut outbox = Vec::new();
                process_entity_tx(rt, EntityTx::JEvent { observation }, &mut chain, &mut outbox)
                    .context("j-event observation failed")?;
                wire.extend(outbox);
            }
            pump(&mut alice, &mut bob, &mut wire)?;
        }};
    }

    // ── 1. Fund Alice on-chain and let both entities see it ──────────────────
    chain.fund(alice_id, TOKEN, 200);
    mine_and_observe!();
    info!(reserve = %alice.entity.reserve(TOKEN), "alice funded");

    // ── 2. Alice deposits 80 into the A–B account ────────────────────────────
    now += 1_000;
    drive!(alice, EntityTx::Tick { now });
    drive!(bob, EntityTx::Tick { now });
    drive!(
        alice,
        EntityTx::DepositCollateral {
            counterparty: bob_id,
            token_id: TOKEN,
            amount: 80,
            rebalance_quote_id: None,
        }
    );
    // A reserve transfer rides the same batch as the deposit.
    drive!(
        alice,
        EntityTx::TransferReserves {
            to: bob_id,
            token_id: TOKEN,
            amount: 20,
        }
    );
    drive!(alice, EntityTx::JBroadcast);
    mine_and_observe!();

    let account = &alice.entity.accounts[&bob_id];
    info!(
        collateral = %account.deltas[&TOKEN].collateral,
        settlement_nonce = account.on_chain_settlement_nonce,
        "deposit settled bilaterally"
    );

    // ── 3. Extend credit both ways, then pay ─────────────────────────────────
    drive!(
        alice,
        EntityTx::Account {
            counterparty: bob_id,
            tx: AccountTx::SetCreditLimit { token_id: TOKEN, amount: 50 },
        }
    );
    drive!(
        bob,
        EntityTx::Account {
            counterparty: alice_id,
            tx: AccountTx::SetCreditLimit { token_id: TOKEN, amount: 50 },
        }
    );
    drive!(
        alice,
        EntityTx::Account {
            counterparty: bob_id,
            tx: AccountTx::DirectPayment {
                from: alice_id,
                to: bob_id,
                token_id: TOKEN,
                amount: 30,
                description: Some("invoice #1".into()),
            },
        }
    );
    info!(
        offdelta = %alice.entity.accounts[&bob_id].deltas[&TOKEN].offdelta,
        "direct payment committed"
    );

    // ── 4. HTLC paid out through an on-chain secret reveal ───────────────────
    let secret = Secret(*blake3::hash(b"the pre-image alice promised").as_bytes());
    let hashlock = hashlock_from_secret(&secret);
    now += 1_000;
    drive!(alice, EntityTx::Tick { now });
    drive!(
        alice,
        EntityTx::Account {
            counterparty: bob_id,
            tx: AccountTx::HtlcAdd {
                lock_id: LockId(*blake3::hash(b"lock-1").as_bytes()),
                hashlock,
                amount: 40,
                token_id: TOKEN,
                expiry: now + 60_000,
            },
        }
    );
    chain.reveal_secret(hashlock, secret);
    mine_and_observe!();
    info!(
        offdelta = %alice.entity.accounts[&bob_id].deltas[&TOKEN].offdelta,
        "htlc resolved by revealed secret"
    );

    // ── 5. Cooperative settlement: bob cashes out 50 of his earned balance ───
    // The left side's collateral claim is the residual, so only a right-side
    // cash-out moves ondelta (the mirror of the deposit rule).
    let bob_is_left = bob_id < alice_id;
    let diffs = vec![SettleDiff {
        token_id: TOKEN,
        collateral_delta: -50,
        ondelta_delta: if bob_is_left { 0 } else { -50 },
    }];

    // Bob stages the settlement, signing the canonical diff payload.
    let account = &bob.entity.accounts[&alice_id];
    let payload = settlement_payload_hash(
        &account.left_entity,
        &account.right_entity,
        account.proof_header.nonce + 1,
        &diffs,
    );
    let propose_hanko = bob.signer.sign_proof(&payload);
    drive!(
        bob,
        EntityTx::Account {
            counterparty: alice_id,
            tx: AccountTx::SettlePropose {
                diffs: diffs.clone(),
                hanko: propose_hanko,
            },
        }
    );

    // Alice approves, pre-signing the dispute proof that goes live the
    // moment the settlement lands on-chain.
    let account = &alice.entity.accounts[&bob_id];
    let ws = account
        .settlement_workspace
        .as_ref()
        .expect("settlement staged on alice's replica");
    let payload = settlement_payload_hash(
        &account.left_entity,
        &account.right_entity,
        ws.nonce_at_sign,
        &diffs,
    );
    let mut post = account.clone();
    for diff in &diffs {
        if let Some(delta) = post.deltas.get_mut(&diff.token_id) {
            delta.collateral += diff.collateral_delta;
            delta.ondelta += diff.ondelta_delta;
        }
    }
    let post_hash = build_proof_at(&post, account.proof_header.nonce + 2).hash;
    let approve_hanko = alice.signer.sign_proof(&payload);
    let post_proof_hanko = alice.signer.sign_proof(&post_hash);
    drive!(
        alice,
        EntityTx::Account {
            counterparty: bob_id,
            tx: AccountTx::SettleApprove {
                hanko: approve_hanko,
                post_proof_hanko,
            },
        }
    );

    // Bob executes; the signed settlement rides his j-batch to the chain.
    drive!(
        bob,
        EntityTx::Account {
            counterparty: alice_id,
            tx: AccountTx::SettleExecute,
        }
    );
    drive!(bob, EntityTx::JBroadcast);
    mine_and_observe!();
    {
        let account = &alice.entity.accounts[&bob_id];
        info!(
            collateral = %account.deltas[&TOKEN].collateral,
            settlement_nonce = account.on_chain_settlement_nonce,
            bob_reserve = %bob.entity.reserve(TOKEN),
            "cooperative settlement finalized"
        );
    }

    // ── 6. Persist and report ────────────────────────────────────────────────
    store.put_entity(&alice.entity).context("persisting alice")?;
    store.put_entity(&bob.entity).context("persisting bob")?;
    info!(entities = store.list_entities()?.len(), "entities persisted");

    let shown_at = chrono::DateTime::from_timestamp_millis(now)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    println!("— final state at {shown_at} —");
    for (name, rt, cp) in [("alice", &alice, bob_id), ("bob", &bob, alice_id)] {
        let account = &rt.entity.accounts[&cp];
        let delta = &account.deltas[&TOKEN];
        println!(
            "{name}: reserve={} collateral={} ondelta={} offdelta={} nonce={} messages={}",
            rt.entity.reserve(TOKEN),
            delta.collateral,
            delta.ondelta,
            delta.offdelta,
            account.proof_header.nonce,
            account.messages.len(),
        );
    }
    if args.dump_state {
        let dump = serde_json::json!({
            "entities": ([alice, bob]).iter().map(|rt| {
                serde_json::json!({
                    "entity_id": rt.entity.entity_id.to_hex(),
                    "timestamp": rt.entity.timestamp,
                    "reserves": rt.entity.reserves,
                    "last_finalized_j_height": rt.entity.last_finalized_j_height,
                    "batch_nonce": rt.entity.j_batch.entity_nonce,
                    "accounts": rt.entity.accounts.iter().map(|(cp, account)| {
                        serde_json::json!({
                            "counterparty": cp.to_hex(),
                            "nonce": account.proof_header.nonce,
                            "settlement_nonce": account.on_chain_settlement_nonce,
                            "deltas": account.deltas,
                            "open_locks": account.locks.len(),
                            "rollbacks": account.rollback_count,
                        })
                    }).collect::<Vec<_>>(),
                })
            }).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&dump).context("serializing state summary")?
        );
    }
    Ok(())
}

/// Deliver in-flight account inputs until the wire is quiet.
fn pump(
    alice: &mut EntityRuntime,
    bob: &mut EntityRuntime,
    wire: &mut VecDeque<AccountInput>,
) -> anyhow::Result<()> {
    while let Some(input) = wire.pop_front() {
        let mut outbox = Vec::new();
        let target = if input.to == alice.entity.entity_id {
            &mut *alice
        } else {
            &mut *bob
        };
        target
            .receive_input(&input, &mut outbox)
            .context("account input rejected")?;
        wire.extend(outbox);
    }
    Ok(())
}

/// Stable node identity across runs: keypairs live in the store's meta tree.
///
/// The serialized form carries the raw secret key, so every intermediate
/// buffer is `Zeroizing` — the keypair's own scrub-on-drop would otherwise
/// leave plaintext copies behind.
fn load_or_create_keypair(store: &EntityStore, name: &str) -> anyhow::Result<KeyPair> {
    if let Some(bytes) = store.get_meta(name)? {
        let bytes = Zeroizing::new(bytes);
        return bincode::deserialize(&bytes).with_context(|| format!("decoding keypair {name}"));
    }
    let kp = KeyPair::generate();
    let bytes = Zeroizing::new(bincode::serialize(&kp).context("encoding keypair")?);
    store.put_meta(name, &bytes)?;
    Ok(kp)
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
