pub mod dilithium;
pub mod hash;
pub mod keypair;

pub use dilithium::{verify_hanko, verify_signature, SignatureError};
pub use hash::{
    blake3_hash, entity_id_from_pubkey, hashlock_from_secret, proof_hash_from_body,
    signer_id_from_pubkey,
};
pub use keypair::KeyPair;
