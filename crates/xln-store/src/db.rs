//! Persistent entity store backed by sled (pure-Rust, no C dependencies).
//!
//! An entity is recoverable from its snapshot plus the in-transit inbox of
//! account inputs; sled gives atomic per-key writes, so each put is an
//! append-then-publish of the whole record.
//!
//! Named trees:
//!   entities — EntityId bytes                 → bincode(Entity)
//!   inbox    — entity ++ counterparty ++ nonce → bincode(AccountInput)
//!   meta     — utf8 key bytes                 → raw bytes

use std::path::Path;

use xln_core::entity::Entity;
use xln_core::error::XlnError;
use xln_core::tx::AccountInput;
use xln_core::types::{EntityId, Nonce};

pub struct EntityStore {
    _db: sled::Db,
    entities: sled::Tree,
    inbox: sled::Tree,
    meta: sled::Tree,
}

fn storage_err(e: impl std::fmt::Display) -> XlnError {
    XlnError::Storage(e.to_string())
}

fn codec_err(e: impl std::fmt::Display) -> XlnError {
    XlnError::Serialization(e.to_string())
}

impl EntityStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, XlnError> {
        let db = sled::open(path).map_err(storage_err)?;
        let entities = db.open_tree("entities").map_err(storage_err)?;
        let inbox = db.open_tree("inbox").map_err(storage_err)?;
        let meta = db.open_tree("meta").map_err(storage_err)?;
        Ok(Self {
            _db: db,
            entities,
            inbox,
            meta,
        })
    }

    // ── Entities ─────────────────────────────────────────────────────────────

    pub fn put_entity(&self, entity: &Entity) -> Result<(), XlnError> {
        let bytes = bincode::serialize(entity).map_err(codec_err)?;
        self.entities
            .insert(entity.entity_id.as_bytes(), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_entity(&self, id: &EntityId) -> Result<Option<Entity>, XlnError> {
        match self.entities.get(id.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn list_entities(&self) -> Result<Vec<EntityId>, XlnError> {
        let mut out = Vec::new();
        for item in self.entities.iter() {
            let (key, _) = item.map_err(storage_err)?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&key);
            out.push(EntityId::from_bytes(arr));
        }
        Ok(out)
    }

    // ── Inbox (last-sent inputs, keyed by nonce, for replay) ─────────────────

    fn inbox_key(entity: &EntityId, counterparty: &EntityId, nonce: Nonce) -> Vec<u8> {
        let mut key = Vec::with_capacity(72);
        key.extend_from_slice(entity.as_bytes());
        key.extend_from_slice(counterparty.as_bytes());
        key.extend_from_slice(&nonce.to_be_bytes());
        key
    }

    pub fn put_inbox_input(
        &self,
        entity: &EntityId,
        counterparty: &EntityId,
        nonce: Nonce,
        input: &AccountInput,
    ) -> Result<(), XlnError> {
        let bytes = bincode::serialize(input).map_err(codec_err)?;
        self.inbox
            .insert(Self::inbox_key(entity, counterparty, nonce), bytes)
            .map_err(storage_err)?;
        Ok(())
    }

    /// All stored inputs for one account pair, nonce-ascending.
    pub fn inbox_inputs(
        &self,
        entity: &EntityId,
        counterparty: &EntityId,
    ) -> Result<Vec<AccountInput>, XlnError> {
        let mut prefix = Vec::with_capacity(64);
        prefix.extend_from_slice(entity.as_bytes());
        prefix.extend_from_slice(counterparty.as_bytes());
        let mut out = Vec::new();
        for item in self.inbox.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(storage_err)?;
            out.push(bincode::deserialize(&bytes).map_err(codec_err)?);
        }
        Ok(out)
    }

    /// Drop inbox records at or below the committed nonce.
    pub fn prune_inbox(
        &self,
        entity: &EntityId,
        counterparty: &EntityId,
        committed_nonce: Nonce,
    ) -> Result<(), XlnError> {
        for nonce in 0..=committed_nonce {
            self.inbox
                .remove(Self::inbox_key(entity, counterparty, nonce))
                .map_err(storage_err)?;
        }
        Ok(())
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), XlnError> {
        self.meta
            .insert(key.as_bytes(), value)
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, XlnError> {
        Ok(self
            .meta
            .get(key.as_bytes())
            .map_err(storage_err)?
            .map(|v| v.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xln_core::entity::EntityConfig;
    use xln_core::types::SignerId;

    fn temp_store(name: &str) -> EntityStore {
        let dir = std::env::temp_dir().join(format!("xln_store_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        EntityStore::open(&dir).expect("open temp store")
    }

    fn sample_entity(seed: u8) -> Entity {
        let mut entity = Entity::new(
            EntityId([seed; 32]),
            EntityConfig::single(SignerId([seed; 32])),
        );
        entity.reserves.insert(1, 500);
        entity.timestamp = 42;
        entity
    }

    #[test]
    fn entity_round_trip() {
        let store = temp_store("entity_rt");
        let entity = sample_entity(1);
        store.put_entity(&entity).unwrap();
        let loaded = store.get_entity(&entity.entity_id).unwrap().unwrap();
        assert_eq!(loaded.entity_id, entity.entity_id);
        assert_eq!(loaded.reserve(1), 500);
        assert_eq!(loaded.timestamp, 42);
        assert_eq!(store.list_entities().unwrap().len(), 1);
    }

    #[test]
    fn missing_entity_is_none() {
        let store = temp_store("missing");
        assert!(store.get_entity(&EntityId([9u8; 32])).unwrap().is_none());
    }

    #[test]
    fn inbox_replay_order_and_prune() {
        let store = temp_store("inbox");
        let us = EntityId([1u8; 32]);
        let them = EntityId([2u8; 32]);
        for nonce in [2u64, 1, 3] {
            let input = AccountInput {
                from: us,
                to: them,
                new_frame: None,
                own_hanko: None,
                counter_hanko: None,
                counter_nonce: Some(nonce),
                post_proof_hanko: None,
            };
            store.put_inbox_input(&us, &them, nonce, &input).unwrap();
        }
        let inputs = store.inbox_inputs(&us, &them).unwrap();
        let nonces: Vec<u64> = inputs.iter().filter_map(|i| i.counter_nonce).collect();
        assert_eq!(nonces, vec![1, 2, 3]);

        store.prune_inbox(&us, &them, 2).unwrap();
        let inputs = store.inbox_inputs(&us, &them).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].counter_nonce, Some(3));
    }
}
