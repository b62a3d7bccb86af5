use xln_core::types::{EntityId, Hashlock, ProofHash, Secret, SignerId};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive an EntityId from raw public key bytes using BLAKE3.
pub fn entity_id_from_pubkey(pubkey_bytes: &[u8]) -> EntityId {
    EntityId::from_bytes(blake3_hash(pubkey_bytes))
}

/// Derive a SignerId from raw public key bytes using BLAKE3.
pub fn signer_id_from_pubkey(pubkey_bytes: &[u8]) -> SignerId {
    SignerId::from_bytes(blake3_hash(pubkey_bytes))
}

/// The system hashlock function: H(secret) = BLAKE3(pre-image).
pub fn hashlock_from_secret(secret: &Secret) -> Hashlock {
    Hashlock(blake3_hash(&secret.0))
}

/// Hash a canonical proof body into the 32-byte dispute commitment.
pub fn proof_hash_from_body(body: &[u8]) -> ProofHash {
    ProofHash::from_bytes(blake3_hash(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashlock_matches_preimage() {
        let secret = Secret([42u8; 32]);
        let lock = hashlock_from_secret(&secret);
        assert_eq!(lock, hashlock_from_secret(&Secret([42u8; 32])));
        assert_ne!(lock, hashlock_from_secret(&Secret([43u8; 32])));
    }
}
