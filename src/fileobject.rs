//! On-disk layout and single-buffer read/write for encrypted file objects.
//!
//! This module defines the per-file header and the round trip through a
//! [`crate::crypto::CryptoContext`]. It works against one in-memory buffer at
//! a time; the chunked streaming engine referenced in the component overview
//! is a collaborator's concern and is not implemented here.

use crate::crypto::CryptoContext;
use crate::error::{Result, VaultError};
use std::io::Write;

pub const CURRENT_VERSION: u8 = 1;
const FIXED_HEADER_LEN: usize = 1 + 1 + 2 + 8;
const ALIGNMENT: usize = 64;

/// Files beginning with this prefix (or with `.`) are reserved for this
/// crate and must be hidden from directory iteration by the filesystem
/// collaborator.
pub const RESERVED_PREFIX: &str = ".vault-";

/// Parsed file-object header.
#[derive(Debug, Clone, Copy)]
pub struct FileObjectHeader {
    pub version: u8,
    pub hmac_len: u16,
    pub edata_len: u64,
}

impl FileObjectHeader {
    fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ALIGNMENT);
        buf.push(self.version);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.hmac_len.to_be_bytes());
        buf.extend_from_slice(&self.edata_len.to_be_bytes());
        buf.resize(aligned_len(FIXED_HEADER_LEN), 0);
        buf
    }

    fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(VaultError::CorruptMetadata("file object header too short"));
        }
        let version = bytes[0];
        if version != CURRENT_VERSION {
            return Err(VaultError::IncompatibleVersion {
                found: version,
                expected: CURRENT_VERSION,
            });
        }
        let hmac_len = u16::from_be_bytes([bytes[2], bytes[3]]);
        let edata_len = u64::from_be_bytes(bytes[4..12].try_into().unwrap());
        Ok(Self {
            version,
            hmac_len,
            edata_len,
        })
    }
}

fn aligned_len(len: usize) -> usize {
    len.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Encrypts `plaintext` under `ctx` and packs it into the on-disk file-object
/// layout: `header || ciphertext || tag`.
///
/// The caller is responsible for the IV (fresh per file) having already been
/// installed on `ctx`, and for choosing `aad` consistently with
/// [`read_encrypted`] — typically the file's logical name.
pub fn write_encrypted(ctx: &CryptoContext, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let (ciphertext, tag) = ctx.encrypt(plaintext, aad)?;
    if tag.len() != ctx.cipher().tag_len() {
        return Err(VaultError::CorruptMetadata("tag length does not match cipher"));
    }

    let header = FileObjectHeader {
        version: CURRENT_VERSION,
        hmac_len: tag.len() as u16,
        edata_len: ciphertext.len() as u64,
    };

    let mut out = header.pack();
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Parses a file object's on-disk bytes and decrypts its payload under `ctx`.
pub fn read_encrypted(ctx: &CryptoContext, bytes: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let header = FileObjectHeader::parse(bytes)?;
    let aligned_prefix = aligned_len(FIXED_HEADER_LEN);
    let edata_len = header.edata_len as usize;
    let hmac_len = header.hmac_len as usize;

    if hmac_len != ctx.cipher().tag_len() {
        return Err(VaultError::CorruptMetadata("hmac_len does not match cipher"));
    }
    if bytes.len() != aligned_prefix + edata_len + hmac_len {
        return Err(VaultError::CorruptMetadata("file object length mismatch"));
    }

    let ciphertext = &bytes[aligned_prefix..aligned_prefix + edata_len];
    let tag = &bytes[aligned_prefix + edata_len..];
    ctx.decrypt(ciphertext, tag, aad)
}

/// Writes an encrypted file object to `path`, creating it if necessary, and
/// fsyncs the file before returning.
pub fn write_encrypted_to(path: &std::path::Path, ctx: &CryptoContext, plaintext: &[u8], aad: &[u8]) -> Result<()> {
    let packed = write_encrypted(ctx, plaintext, aad)?;
    let mut f = std::fs::OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    f.write_all(&packed)?;
    f.sync_all()?;
    Ok(())
}

/// Reads and decrypts an encrypted file object from `path`.
pub fn read_encrypted_from(path: &std::path::Path, ctx: &CryptoContext, aad: &[u8]) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path)?;
    read_encrypted(ctx, &bytes, aad)
}
