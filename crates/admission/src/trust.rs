use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::{read_material, LoadError, LoadResult};

/// Which senders the gate admits.
pub trait TrustStore: Send + Sync {
    fn is_trusted(&self, sender_id: &str) -> bool;
    fn is_revoked(&self, sender_id: &str) -> bool;
}

/// Checks a signature over the SHA-256 digest of the canonical content.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, content_digest: &[u8; 32], signature: &str, sender_id: &str) -> bool;
}

#[derive(Debug, Default, Deserialize)]
struct KeyringFile {
    #[serde(default)]
    keys: BTreeMap<String, String>,
    #[serde(default)]
    revoked: Vec<String>,
}

/// Ed25519 public keys per sender plus a revocation set.
///
/// Revocations can be added while the gate is live; keys are fixed at load.
#[derive(Debug, Default)]
pub struct KeyringTrustStore {
    keys: HashMap<String, VerifyingKey>,
    revoked: RwLock<HashSet<String>>,
}

impl KeyringTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{"keys": {"VEH_1": "<hex public key>"}, "revoked": ["VEH_9"]}`
    pub fn from_json(raw: &str) -> LoadResult<Self> {
        let file: KeyringFile = serde_json::from_str(raw)?;
        let mut store = Self::new();
        for (sender, material) in &file.keys {
            let key = parse_ed25519_key_material(material.as_bytes()).ok_or_else(|| {
                LoadError::Invalid(format!("public key for {sender} is not 32 hex-encoded bytes"))
            })?;
            store.insert_key(sender, key)?;
        }
        for sender in file.revoked {
            store.revoke(&sender);
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> LoadResult<Self> {
        let raw = read_material(path)?;
        let store = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            trusted = store.keys.len(),
            revoked = store.revoked_count(),
            "sender keyring loaded"
        );
        Ok(store)
    }

    pub fn insert_key(&mut self, sender_id: &str, public_key: [u8; 32]) -> LoadResult<()> {
        let key = VerifyingKey::from_bytes(&public_key)
            .map_err(|err| LoadError::Invalid(format!("public key for {sender_id}: {err}")))?;
        self.keys.insert(sender_id.to_string(), key);
        Ok(())
    }

    pub fn revoke(&self, sender_id: &str) {
        match self.revoked.write() {
            Ok(mut revoked) => {
                revoked.insert(sender_id.to_string());
            }
            Err(_) => warn!(sender = sender_id, "revocation set lock poisoned"),
        }
    }

    pub fn trusted_count(&self) -> usize {
        self.keys.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.read().map(|set| set.len()).unwrap_or(0)
    }
}

impl TrustStore for KeyringTrustStore {
    fn is_trusted(&self, sender_id: &str) -> bool {
        self.keys.contains_key(sender_id)
    }

    fn is_revoked(&self, sender_id: &str) -> bool {
        // Fail closed when the set is unreadable.
        self.revoked
            .read()
            .map(|set| set.contains(sender_id))
            .unwrap_or(true)
    }
}

impl SignatureVerifier for KeyringTrustStore {
    fn verify(&self, content_digest: &[u8; 32], signature: &str, sender_id: &str) -> bool {
        let Some(key) = self.keys.get(sender_id) else {
            return false;
        };
        let Some(signature_bytes) = parse_ed25519_signature_material(signature.as_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&signature_bytes);
        key.verify(content_digest, &signature).is_ok()
    }
}

pub fn parse_ed25519_key_material(raw: &[u8]) -> Option<[u8; 32]> {
    parse_fixed_key_material(raw)
}

pub fn parse_ed25519_signature_material(raw: &[u8]) -> Option<[u8; 64]> {
    parse_fixed_key_material(raw)
}

fn parse_fixed_key_material<const N: usize>(raw: &[u8]) -> Option<[u8; N]> {
    let text = std::str::from_utf8(raw).ok()?;
    let bytes = decode_hex_bytes(text)?;
    bytes.try_into().ok()
}

pub fn decode_hex_bytes(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    let normalized = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if normalized.len() % 2 != 0 {
        return None;
    }

    normalized
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| Some((decode_hex_nibble(pair[0])? << 4) | decode_hex_nibble(pair[1])?))
        .collect()
}

pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex_nibble(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}
