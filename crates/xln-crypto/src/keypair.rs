use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use xln_core::types::{DilithiumPublicKey, EntityId, Hanko, ProofHash, SignerId};

use crate::hash::{entity_id_from_pubkey, signer_id_from_pubkey};

/// An XLN keypair: Dilithium2 public + secret keys with derived ids.
///
/// The secret key is held in a `Zeroizing<Vec<u8>>` to wipe memory on drop.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub entity_id: EntityId,
    pub signer_id: SignerId,
    pub public_key: DilithiumPublicKey,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let pk_bytes = pk.as_bytes().to_vec();
        Self {
            entity_id: entity_id_from_pubkey(&pk_bytes),
            signer_id: signer_id_from_pubkey(&pk_bytes),
            public_key: DilithiumPublicKey(pk_bytes),
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> xln_core::types::DilithiumSignature {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message).expect("sign with valid secret key is infallible")
    }

    /// Produce a hanko over a proof body hash.
    pub fn sign_proof(&self, body_hash: &ProofHash) -> Hanko {
        Hanko(self.sign(&body_hash.0))
    }

}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ entity_id: {:?} }}", self.entity_id)
    }
}
