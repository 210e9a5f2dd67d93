use crate::logs::archive::GuildArchive;
use crate::logs::channel::ChannelLog;
use crate::logs::error::FormatError;
use crate::logs::FORMAT_VERSION;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

const MAGIC: [u8; 4] = *b"ANLZ";
const FLAG_ENCRYPTED: u8 = 0b0000_0001;
const HEADER_LEN: usize = MAGIC.len() + 1;
const NONCE_LEN: usize = 12;
const COMPRESSION_LEVEL: i32 = 3;

/// AES-256 key derived from the configured passphrase.
pub struct ArchiveKey(Zeroizing<[u8; 32]>);

impl ArchiveKey {
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.0.as_ref()))
    }
}

/// Turns a guild archive into file bytes and back:
/// json, then zstd, then optionally AES-256-GCM.
#[derive(Clone, Default)]
pub struct ArchiveCodec {
    key: Option<Arc<ArchiveKey>>,
}

#[derive(Serialize)]
struct ArchiveOut<'a> {
    guild: u64,
    channels: &'a BTreeMap<u64, ChannelLog>,
}

/// Channels are kept as raw json until their format version is checked, so
/// logs written by older versions are dropped even when their shape changed.
#[derive(Deserialize)]
struct ArchiveIn {
    guild: u64,
    channels: BTreeMap<u64, serde_json::Value>,
}

impl ArchiveCodec {
    pub fn new(key: Option<ArchiveKey>) -> Self {
        Self {
            key: key.map(Arc::new),
        }
    }

    pub fn from_passphrase(passphrase: Option<&str>) -> Self {
        Self::new(passphrase.map(ArchiveKey::from_passphrase))
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    pub fn encode(&self, archive: &GuildArchive) -> Result<Vec<u8>, FormatError> {
        let json = serde_json::to_vec(&ArchiveOut {
            guild: archive.guild_id,
            channels: &archive.channels,
        })?;
        let compressed =
            zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL).map_err(FormatError::Compression)?;

        let mut out = Vec::with_capacity(compressed.len() + HEADER_LEN + NONCE_LEN + 16);
        out.extend_from_slice(&MAGIC);
        match &self.key {
            Some(key) => {
                let mut nonce = [0u8; NONCE_LEN];
                OsRng.fill_bytes(&mut nonce);
                let sealed = key
                    .cipher()
                    .encrypt(Nonce::from_slice(&nonce), compressed.as_slice())
                    .map_err(|_| FormatError::Encrypt)?;
                out.push(FLAG_ENCRYPTED);
                out.extend_from_slice(&nonce);
                out.extend_from_slice(&sealed);
            }
            None => {
                out.push(0);
                out.extend_from_slice(&compressed);
            }
        }
        debug!(
            "Encoded archive {}: {} bytes json, {} bytes on disk",
            archive.guild_id,
            json.len(),
            out.len()
        );
        Ok(out)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<GuildArchive, FormatError> {
        if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadHeader);
        }
        let flags = bytes[MAGIC.len()];
        let body = &bytes[HEADER_LEN..];

        let compressed = if flags & FLAG_ENCRYPTED != 0 {
            let key = self.key.as_ref().ok_or(FormatError::MissingKey)?;
            if body.len() < NONCE_LEN {
                return Err(FormatError::BadHeader);
            }
            let (nonce, sealed) = body.split_at(NONCE_LEN);
            key.cipher()
                .decrypt(Nonce::from_slice(nonce), sealed)
                .map_err(|_| FormatError::Decrypt)?
        } else {
            body.to_vec()
        };

        let json = zstd::decode_all(compressed.as_slice()).map_err(FormatError::Compression)?;
        let raw: ArchiveIn = serde_json::from_slice(&json)?;

        let mut channels = BTreeMap::new();
        for (id, value) in raw.channels {
            let format = value.get("format").and_then(serde_json::Value::as_u64);
            if format != Some(u64::from(FORMAT_VERSION)) {
                debug!(
                    "Dropping channel {} of archive {}: format {:?}",
                    id, raw.guild, format
                );
                continue;
            }
            channels.insert(id, serde_json::from_value::<ChannelLog>(value)?);
        }

        Ok(GuildArchive {
            guild_id: raw.guild,
            channels,
        })
    }
}
