//! Signing capability
//!
//! The engine never touches key material directly; it is handed an object
//! that can produce Ed25519 signatures over raw bytes. This replaces any
//! process-wide signer global with constructor injection.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;

use crate::error::{Error, Result};

/// Ed25519 signature length in bytes
pub const SIGNATURE_LEN: usize = 64;

/// Opaque signing capability
pub trait SignerCapability: Send + Sync {
    /// Sign raw message bytes, returning a 64-byte Ed25519 signature
    fn sign(&self, message: &[u8]) -> Result<Signature>;

    /// Public key of the signing identity
    fn pubkey(&self) -> Pubkey;
}

/// Keypair-backed signer
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Build from a base58-encoded 64-byte secret key
    pub fn from_base58(encoded: &str) -> Result<Self> {
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| Error::InvalidSigner(format!("bad base58: {}", e)))?;
        if bytes.len() != 64 {
            return Err(Error::InvalidSigner(format!(
                "decoded key is {} bytes, expected 64",
                bytes.len()
            )));
        }
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::InvalidSigner(e.to_string()))?;
        Ok(Self { keypair })
    }
}

impl SignerCapability for KeypairSigner {
    fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signature = self.keypair.sign_message(message);
        debug_assert_eq!(signature.as_ref().len(), SIGNATURE_LEN);
        Ok(signature)
    }

    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}
