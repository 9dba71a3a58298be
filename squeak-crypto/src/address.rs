//! Author addresses and keys.
//!
//! An author address is a Bitcoin-style P2PKH address (base58check-encoded
//! pubkey hash) — the same derivation Bitcoin itself uses, reused here since
//! it already gives us a compact, checksummed, human-typeable identifier
//! with no protocol of our own to invent.

use std::{fmt, str::FromStr};

use bitcoin::{Network as BtcNetwork, PublicKey as BtcPublicKey};
use secp256k1::{rand::rngs::OsRng, All, Message, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("malformed address: {0}")]
    Malformed(String),
}

/// An author's address: the base58check P2PKH encoding of their public key
/// hash. Doubles as the stable, unique identifier `Profile.address` and
/// `ContentItem.author_address` refer to.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn from_pubkey(pubkey: &secp256k1::PublicKey, network: BtcNetwork) -> Self {
        let btc_pubkey = BtcPublicKey::new(*pubkey);
        Self(bitcoin::Address::p2pkh(&btc_pubkey, network).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that `pubkey` hashes to this address under `network`. Used at
    /// validation time since an item carries its author's pubkey alongside
    /// the address it claims, the way a Bitcoin P2PKH scriptSig carries both
    /// a signature and the pubkey it must hash back to the scriptPubKey.
    pub fn matches_pubkey(
        &self,
        pubkey: &secp256k1::PublicKey,
        network: BtcNetwork,
    ) -> bool {
        Self::from_pubkey(pubkey, network) == *self
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        bitcoin::Address::from_str(s)
            .map_err(|e| AddressError::Malformed(e.to_string()))?;
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

/// A signing identity: a secp256k1 keypair plus the derived address. Held
/// only by "signing" profiles (spec §3); contact profiles have an
/// [`Address`] with no key material.
pub struct KeyPair {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    pub public_key: secp256k1::PublicKey,
    pub address: Address,
}

impl KeyPair {
    pub fn generate(network: BtcNetwork) -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let address = Address::from_pubkey(&public_key, network);
        Self {
            secp,
            secret_key,
            public_key,
            address,
        }
    }

    pub fn from_secret_bytes(
        secret_bytes: &[u8; 32],
        network: BtcNetwork,
    ) -> Result<Self, secp256k1::Error> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(secret_bytes)?;
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);
        let address = Address::from_pubkey(&public_key, network);
        Ok(Self {
            secp,
            secret_key,
            public_key,
            address,
        })
    }

    /// Sign a 32-byte digest (an item's hash) with this identity's key.
    pub fn sign(&self, digest: &[u8; 32]) -> secp256k1::ecdsa::Signature {
        let msg = Message::from_slice(digest)
            .expect("a 32-byte digest is always a valid secp256k1 message");
        self.secp.sign_ecdsa(&msg, &self.secret_key)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }
}

/// Verify an ECDSA signature over `digest` was produced by `pubkey`.
pub fn verify(
    digest: &[u8; 32],
    signature: &secp256k1::ecdsa::Signature,
    pubkey: &secp256k1::PublicKey,
) -> bool {
    let secp = Secp256k1::verification_only();
    let msg = match Message::from_slice(digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    secp.verify_ecdsa(&msg, signature, pubkey).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let kp = KeyPair::generate(BtcNetwork::Regtest);
        let digest = [7u8; 32];
        let sig = kp.sign(&digest);
        assert!(verify(&digest, &sig, &kp.public_key));
    }

    #[test]
    fn address_matches_own_pubkey() {
        let kp = KeyPair::generate(BtcNetwork::Regtest);
        assert!(kp.address.matches_pubkey(&kp.public_key, BtcNetwork::Regtest));
    }

    #[test]
    fn tampered_digest_fails_verification() {
        let kp = KeyPair::generate(BtcNetwork::Regtest);
        let sig = kp.sign(&[1u8; 32]);
        assert!(!verify(&[2u8; 32], &sig, &kp.public_key));
    }
}
