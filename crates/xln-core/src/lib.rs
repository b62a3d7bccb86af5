pub mod account;
pub mod constants;
pub mod delta;
pub mod entity;
pub mod error;
pub mod event;
pub mod tx;
pub mod types;

pub use account::*;
pub use constants::*;
pub use delta::{derive, DerivedBalances};
pub use entity::*;
pub use error::XlnError;
pub use event::{canonical_multiset_eq, JEventKind, JurisdictionEvent};
pub use tx::*;
pub use types::*;
