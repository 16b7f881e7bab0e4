//! Hashing, address derivation and ECDSA signatures

use crate::constants::{MIN_PUB_KEY_LEN, VERSION_CONTRACT, VERSION_USER};
use crate::error::{LedgerError, Result};
use crate::types::*;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash};
use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// Single SHA-256
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Double SHA-256, used for block hashes
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// RIPEMD-160(SHA-256(data))
pub fn hash160(data: &[u8]) -> ByteString {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).to_vec()
}

impl PubKeyHash {
    /// Derive the user address owning `pub_key`.
    ///
    /// Keys shorter than 32 bytes are rejected.
    pub fn from_public_key(pub_key: &[u8]) -> Result<Self> {
        if pub_key.len() < MIN_PUB_KEY_LEN {
            return Err(LedgerError::InvalidPubKey(format!(
                "public key length {} below {}",
                pub_key.len(),
                MIN_PUB_KEY_LEN
            )));
        }
        let mut bytes = Vec::with_capacity(21);
        bytes.push(VERSION_USER);
        bytes.extend_from_slice(&hash160(pub_key));
        Ok(PubKeyHash(bytes))
    }

    /// Derive a contract address from arbitrary seed bytes (usually the deploying txid)
    pub fn new_contract(seed: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(21);
        bytes.push(VERSION_CONTRACT);
        bytes.extend_from_slice(&hash160(seed));
        PubKeyHash(bytes)
    }
}

/// secp256k1 key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Build a key pair from a 32-byte secret
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(secret)?;
        let public = PublicKey::from_secret_key(secp(), &secret);
        Ok(KeyPair { secret, public })
    }

    /// Compressed SEC1 public key
    pub fn public_key(&self) -> ByteString {
        self.public.serialize().to_vec()
    }

    pub fn pub_key_hash(&self) -> Result<PubKeyHash> {
        PubKeyHash::from_public_key(&self.public.serialize())
    }

    /// Compact 64-byte ECDSA signature over a 32-byte digest
    pub fn sign(&self, digest: &Hash) -> Result<ByteString> {
        let message = Message::from_digest_slice(digest)?;
        let signature = secp().sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_compact().to_vec())
    }
}

/// Verify a compact ECDSA signature.
///
/// Malformed keys or signatures verify as `false` rather than erroring.
pub fn verify_signature(pub_key: &[u8], digest: &Hash, signature: &[u8]) -> bool {
    let public = match PublicKey::from_slice(pub_key) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_compact(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    secp().verify_ecdsa(&message, &signature, &public).is_ok()
}
