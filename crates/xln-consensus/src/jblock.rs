//! J-block threshold consensus (the per-entity derived view of the chain).
//!
//! Signers submit observations of jurisdiction blocks; a block finalizes
//! once a threshold of unique signers agree on `(j_height, j_block_hash)`.
//! Finalization merges the signers' event lists by canonical key, appends to
//! the entity's j-block chain, applies the events, and prunes observations
//! for that height. A height finalizes at most once.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use xln_core::tx::{AccountInput, JBlockFinalized};
use xln_core::types::{JBlockHash, SignerId};
use xln_entity::{EntityRuntime, JurisdictionAdapter};

use crate::events;

/// Group pending observations and finalize every `(height, hash)` that has
/// reached the signer threshold. Returns the finalized heights in order.
pub fn try_finalize(
    rt: &mut EntityRuntime,
    adapter: &mut dyn JurisdictionAdapter,
    outbox: &mut Vec<AccountInput>,
) -> Vec<u64> {
    let mut finalized = Vec::new();

    loop {
        let threshold = rt.entity.config.threshold as usize;

        // Unique signers per (height, hash).
        let mut groups: BTreeMap<(u64, JBlockHash), BTreeSet<SignerId>> = BTreeMap::new();
        for obs in &rt.entity.j_block_observations {
            // One guarded append: a height already in the chain never
            // finalizes twice, whatever hash later observations carry.
            if rt
                .entity
                .j_block_chain
                .iter()
                .any(|b| b.j_height == obs.j_height)
            {
                continue;
            }
            groups
                .entry((obs.j_height, obs.j_block_hash))
                .or_default()
                .insert(obs.signer_id);
        }

        let Some(((height, hash), signers)) = groups
            .into_iter()
            .filter(|(_, signers)| signers.len() >= threshold)
            .min_by_key(|((height, _), _)| *height)
        else {
            break;
        };

        // Merge the signers' event lists, deduping by canonical key and
        // preserving first-seen order (the canonical in-block order).
        let mut seen = BTreeSet::new();
        let mut events = Vec::new();
        for obs in &rt.entity.j_block_observations {
            if obs.j_height != height || obs.j_block_hash != hash {
                continue;
            }
            for event in &obs.events {
                if seen.insert(event.canonical_key()) {
                    events.push(event.normalize());
                }
            }
        }

        let block = JBlockFinalized {
            j_height: height,
            j_block_hash: hash,
            events,
            finalized_at: rt.entity.timestamp,
            signer_count: signers.len() as u32,
        };

        rt.entity.j_block_chain.push(block.clone());
        if height > rt.entity.last_finalized_j_height {
            rt.entity.last_finalized_j_height = height;
        }
        // Prune every observation for this height, conflicting hashes
        // included — the height is decided.
        rt.entity
            .j_block_observations
            .retain(|o| o.j_height != height);

        info!(
            j_height = height,
            signers = block.signer_count,
            events = block.events.len(),
            "j-block finalized"
        );
        events::apply_block(rt, &block, adapter, outbox);
        finalized.push(height);
    }

    if finalized.is_empty() {
        debug!(
            pending = rt.entity.j_block_observations.len(),
            "no j-block reached threshold"
        );
    }
    finalized
}
