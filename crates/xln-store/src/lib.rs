//! xln-store
//!
//! sled-backed persistence for entity snapshots and the account-input inbox
//! used for transport replay.

pub mod db;

pub use db::EntityStore;
