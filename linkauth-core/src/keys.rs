//! Signing keys for linkauth tokens
//!
//! Every token is signed with Ed25519. Edge services only ever need the
//! public half, published as an OKP JSON Web Key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Copy `bytes` into a fixed-size array, or name what was expected
fn exact<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidKey(format!("{} must be {} bytes, got {}", what, N, bytes.len())))
}

/// Verifying half of the broker's signing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        VerifyingKey::from_bytes(&exact(bytes, "public key")?)
            .map(|inner| Self { inner })
            .map_err(|e| Error::InvalidKey(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }

    /// base64url without padding, as published at the well-known endpoint
    pub fn to_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.inner.as_bytes())
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_bytes(&URL_SAFE_NO_PAD.decode(s)?)
    }

    /// Check a detached signature; any malformed input is a failed verification
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let signature = <[u8; 64]>::try_from(signature)
            .map(|raw| Signature::from_bytes(&raw))
            .map_err(|_| Error::SignatureVerificationFailed)?;
        self.inner
            .verify(message, &signature)
            .map_err(|_| Error::SignatureVerificationFailed)
    }
}

#[derive(Serialize, Deserialize)]
struct OkpJwk {
    kty: String,
    crv: String,
    x: String,
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        OkpJwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: self.to_base64(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let jwk = OkpJwk::deserialize(deserializer)?;
        if jwk.kty != "OKP" || jwk.crv != "Ed25519" {
            return Err(serde::de::Error::custom(format!(
                "unsupported key type: {}/{}",
                jwk.kty, jwk.crv
            )));
        }
        PublicKey::from_base64(&jwk.x).map_err(serde::de::Error::custom)
    }
}

/// A keypair that signs tokens
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        Ok(Self {
            signing_key: SigningKey::from_bytes(&exact(seed, "seed")?),
        })
    }

    /// Restore a keypair from the base64url seed written by [`KeyPair::seed_base64`]
    pub fn from_base64_seed(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(s.trim())?;
        Self::from_seed(&bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.signing_key.verifying_key(),
        }
    }

    /// Detached 64-byte Ed25519 signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// The secret seed, base64url encoded (for the key file)
    pub fn seed_base64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing_key.as_bytes())
    }
}
