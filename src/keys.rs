//! Node identity: the keypair the node signs with and the peer id derived
//! from its public half.
//!
//! A key file holds either the libp2p protobuf encoding of a private key
//! (any algorithm the transport supports) or 64 hex characters of a raw
//! secp256k1 secret. Without a key file a fresh keypair is generated; it
//! lives only as long as the process.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use libp2p::identity::{self, Keypair, PublicKey};
use libp2p::PeerId;

use crate::error::IdentityError;

/// Algorithm used when generating a fresh identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
    Secp256k1,
    Ecdsa,
    Rsa,
}

impl std::str::FromStr for KeyAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            "secp256k1" => Ok(KeyAlgorithm::Secp256k1),
            "ecdsa" => Ok(KeyAlgorithm::Ecdsa),
            "rsa" => Ok(KeyAlgorithm::Rsa),
            _ => Err(format!(
                "Invalid key type: {s}. Must be one of: ed25519, secp256k1, ecdsa, rsa"
            )),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Ed25519 => write!(f, "ed25519"),
            KeyAlgorithm::Secp256k1 => write!(f, "secp256k1"),
            KeyAlgorithm::Ecdsa => write!(f, "ecdsa"),
            KeyAlgorithm::Rsa => write!(f, "rsa"),
        }
    }
}

/// The local node's keypair together with its peer id.
///
/// The peer id is computed from the keypair on construction and cannot be
/// set any other way.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self { keypair, peer_id }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public(&self) -> PublicKey {
        self.keypair.public()
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .field("key_type", &self.keypair.key_type())
            .finish_non_exhaustive()
    }
}

/// Load the identity from `key_file` if one is given, otherwise generate a
/// fresh one with `algorithm`.
pub fn establish_identity(
    key_file: Option<&Path>,
    algorithm: KeyAlgorithm,
) -> Result<NodeIdentity, IdentityError> {
    match key_file {
        Some(path) => load(path),
        None => generate(algorithm),
    }
}

/// Generate a new random identity.
pub fn generate(algorithm: KeyAlgorithm) -> Result<NodeIdentity, IdentityError> {
    let keypair = match algorithm {
        KeyAlgorithm::Ed25519 => Keypair::generate_ed25519(),
        KeyAlgorithm::Secp256k1 => Keypair::generate_secp256k1(),
        KeyAlgorithm::Ecdsa => Keypair::generate_ecdsa(),
        KeyAlgorithm::Rsa => {
            return Err(IdentityError::KeyGeneration(
                "rsa keys cannot be generated, supply one with a key file".into(),
            ))
        }
    };
    Ok(NodeIdentity::from_keypair(keypair))
}

/// Load an identity from a key file.
pub fn load(path: &Path) -> Result<NodeIdentity, IdentityError> {
    let bytes = std::fs::read(path).map_err(|source| IdentityError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes)
}

/// Decode key file contents. See the module docs for accepted formats.
pub fn decode(bytes: &[u8]) -> Result<NodeIdentity, IdentityError> {
    if let Some(secret) = as_hex_secret(bytes) {
        let mut raw = hex::decode(secret).map_err(|e| IdentityError::KeyFormat(e.to_string()))?;
        let secret = identity::secp256k1::SecretKey::try_from_bytes(&mut raw)?;
        let keypair = Keypair::from(identity::secp256k1::Keypair::from(secret));
        return Ok(NodeIdentity::from_keypair(keypair));
    }

    let keypair = Keypair::from_protobuf_encoding(bytes)?;
    Ok(NodeIdentity::from_keypair(keypair))
}

// 32-byte secp256k1 secrets stored as hex, surrounding whitespace allowed.
fn as_hex_secret(bytes: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    (text.len() == 64 && text.bytes().all(|b| b.is_ascii_hexdigit())).then_some(text)
}

/// Write `identity` to `path` in protobuf encoding.
///
/// Parent directories are created as needed.
pub fn save(identity: &NodeIdentity, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create key directory: {}", parent.display()))?;
    }
    let encoded = identity
        .keypair
        .to_protobuf_encoding()
        .context("encode private key")?;
    std::fs::write(path, encoded).with_context(|| format!("write key: {}", path.display()))
}
