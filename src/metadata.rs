//! The vault metadata file: the fixed-layout header that authenticates a
//! vault's identity, cipher choice and key-derivation parameters.
//!
//! Layout (all multi-byte integers big-endian):
//!
//! ```text
//! [ver:1][cipher:1][flags:1][kp_len:1][iv_len:2][uid:16]
//! [pad to 64-byte alignment]
//! [iv: iv_len bytes]
//! [kdf_params: kp_len bytes]
//! [hmac: 32 bytes]  (HMAC-SHA3-256 over every preceding byte, keyed by K_e)
//! ```
//!
//! The header is padded so the IV block starts on a 64-byte boundary; this
//! mirrors the fixed/variable split used by the rest of the pack's on-disk
//! record formats and leaves room to grow the fixed fields later without
//! breaking alignment.

use crate::crypto::{verify_hmac_tag, CipherId, KdfParams};
use crate::error::{Result, VaultError};

pub const CURRENT_VERSION: u8 = 1;
pub const HMAC_LEN: usize = 32;
const FIXED_PREFIX_LEN: usize = 1 + 1 + 1 + 1 + 2 + 16;
const ALIGNMENT: usize = 64;

/// NOAUTH: the vault was created without an escrow server and recovers
/// purely from the passphrase.
pub const FLAG_NOAUTH: u8 = 0b0000_0001;

/// Parsed vault metadata file contents.
#[derive(Clone)]
pub struct MetadataRecord {
    pub version: u8,
    pub cipher: CipherId,
    pub flags: u8,
    pub uid: [u8; 16],
    pub iv: Vec<u8>,
    pub kdf: KdfParams,
}

impl MetadataRecord {
    pub fn new(cipher: CipherId, flags: u8, uid: [u8; 16], iv: Vec<u8>, kdf: KdfParams) -> Self {
        Self {
            version: CURRENT_VERSION,
            cipher,
            flags,
            uid,
            iv,
            kdf,
        }
    }

    pub const fn is_noauth(&self) -> bool {
        self.flags & FLAG_NOAUTH != 0
    }

    /// Packs the record and appends an HMAC-SHA3-256 tag keyed by `key`
    /// (the effective key K_e — metadata authentication proves possession
    /// of K_e, not just the passphrase).
    pub fn to_bytes(&self, key: &[u8]) -> Result<Vec<u8>> {
        let kdf_bytes = self.kdf.to_bytes();
        if kdf_bytes.len() > 255 {
            return Err(VaultError::CorruptMetadata("kdf params too long to encode"));
        }
        if self.iv.len() > u16::MAX as usize {
            return Err(VaultError::CorruptMetadata("iv too long to encode"));
        }

        let mut body = Vec::with_capacity(FIXED_PREFIX_LEN + ALIGNMENT + self.iv.len() + kdf_bytes.len());
        body.push(self.version);
        body.push(self.cipher.to_byte());
        body.push(self.flags);
        body.push(kdf_bytes.len() as u8);
        body.extend_from_slice(&(self.iv.len() as u16).to_be_bytes());
        body.extend_from_slice(&self.uid);

        pad_to_alignment(&mut body);

        body.extend_from_slice(&self.iv);
        body.extend_from_slice(&kdf_bytes);

        let tag = crate::crypto::hmac_tag(key, &body);
        body.extend_from_slice(&tag);
        Ok(body)
    }

    /// Parses the header fields without checking the trailing HMAC.
    ///
    /// `open` needs the KDF parameters and cipher before it can derive K_p
    /// and, after the server round trip, K_e — so field parsing and
    /// authentication are necessarily two steps. Prefer [`Self::from_bytes`]
    /// whenever the key is already known.
    ///
    /// # Errors
    /// Returns [`VaultError::CorruptMetadata`] on malformed input or
    /// [`VaultError::IncompatibleVersion`] on a future version byte.
    pub fn parse_unverified(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_PREFIX_LEN + HMAC_LEN {
            return Err(VaultError::CorruptMetadata("metadata file too short"));
        }

        let version = bytes[0];
        if version != CURRENT_VERSION {
            return Err(VaultError::IncompatibleVersion {
                found: version,
                expected: CURRENT_VERSION,
            });
        }

        let body = &bytes[..bytes.len() - HMAC_LEN];

        let cipher = CipherId::from_byte(body[1])?;
        let flags = body[2];
        let kp_len = body[3] as usize;
        let iv_len = u16::from_be_bytes([body[4], body[5]]) as usize;
        let mut uid = [0u8; 16];
        uid.copy_from_slice(&body[6..22]);

        let aligned_prefix = aligned_len(FIXED_PREFIX_LEN);
        if body.len() < aligned_prefix + iv_len + kp_len {
            return Err(VaultError::CorruptMetadata("metadata body truncated"));
        }
        if body.len() != aligned_prefix + iv_len + kp_len {
            return Err(VaultError::CorruptMetadata("metadata body length mismatch"));
        }

        let iv = body[aligned_prefix..aligned_prefix + iv_len].to_vec();
        let kdf_bytes = &body[aligned_prefix + iv_len..aligned_prefix + iv_len + kp_len];
        let kdf = KdfParams::from_bytes(kdf_bytes)?;

        if iv_len != cipher.iv_len() {
            return Err(VaultError::CorruptMetadata("iv length does not match cipher"));
        }

        Ok(Self {
            version,
            cipher,
            flags,
            uid,
            iv,
            kdf,
        })
    }

    /// Checks the trailing HMAC-SHA3-256 tag against `key` without
    /// re-parsing the fields.
    pub fn verify(bytes: &[u8], key: &[u8]) -> Result<()> {
        if bytes.len() < HMAC_LEN {
            return Err(VaultError::CorruptMetadata("metadata file too short"));
        }
        let (body, tag) = bytes.split_at(bytes.len() - HMAC_LEN);
        if verify_hmac_tag(key, body, tag) {
            Ok(())
        } else {
            Err(VaultError::AuthenticationFailed)
        }
    }

    /// Parses and authenticates a metadata file's bytes in one step. Used
    /// where the key is already known before any field is needed (tests,
    /// and the recovery path after it builds the header separately).
    ///
    /// # Errors
    /// Returns [`VaultError::CorruptMetadata`] on malformed input,
    /// [`VaultError::IncompatibleVersion`] on a future version byte, and
    /// [`VaultError::AuthenticationFailed`] if `key` doesn't verify.
    pub fn from_bytes(bytes: &[u8], key: &[u8]) -> Result<Self> {
        let record = Self::parse_unverified(bytes)?;
        Self::verify(bytes, key)?;
        Ok(record)
    }
}

fn aligned_len(len: usize) -> usize {
    len.div_ceil(ALIGNMENT) * ALIGNMENT
}

fn pad_to_alignment(buf: &mut Vec<u8>) {
    let target = aligned_len(buf.len());
    buf.resize(target, 0);
}
