//! Symmetric primitives, key derivation and envelope-key handling.
//!
//! A [`CryptoContext`] is parameterized by one [`CipherId`] and holds at most
//! one active key at a time (the "effective key", K_e in the vault lifecycle
//! documentation). It never leaks key material through `Debug` and always
//! zeroizes on drop.

use crate::error::{Result, VaultError};
use aes::Aes256;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit as AesGcmKeyInit, Nonce as AesGcmNonce};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chacha20::cipher::{KeyIvInit as ChaChaKeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit as ChaChaPolyKeyInit, Nonce as ChaChaNonce};
use hmac::{Hmac, Mac};
use sha3::Sha3_256;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub type HmacSha3_256 = Hmac<Sha3_256>;

/// On-disk cipher identifier. All four ciphers use a 256-bit key; only the
/// IV/nonce length and whether the cipher carries its own authentication tag
/// differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherId {
    Aes256Cbc,
    ChaCha20,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl CipherId {
    pub const fn to_byte(self) -> u8 {
        match self {
            CipherId::Aes256Cbc => 0,
            CipherId::ChaCha20 => 1,
            CipherId::Aes256Gcm => 2,
            CipherId::ChaCha20Poly1305 => 3,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(CipherId::Aes256Cbc),
            1 => Ok(CipherId::ChaCha20),
            2 => Ok(CipherId::Aes256Gcm),
            3 => Ok(CipherId::ChaCha20Poly1305),
            other => Err(VaultError::UnsupportedCipher(other)),
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "aes256-cbc" | "aes256cbc" | "aes-256-cbc" => Ok(CipherId::Aes256Cbc),
            "chacha20" => Ok(CipherId::ChaCha20),
            "aes256-gcm" | "aes256gcm" | "aes-256-gcm" => Ok(CipherId::Aes256Gcm),
            "chacha20-poly1305" | "chacha20poly1305" => Ok(CipherId::ChaCha20Poly1305),
            _ => Err(VaultError::UnsupportedCipher(0xff)),
        }
    }

    /// All four specified ciphers take a 256-bit key.
    pub const fn key_len(self) -> usize {
        32
    }

    pub const fn iv_len(self) -> usize {
        match self {
            CipherId::Aes256Cbc => 16,
            CipherId::ChaCha20 | CipherId::Aes256Gcm | CipherId::ChaCha20Poly1305 => 12,
        }
    }

    pub const fn is_aead(self) -> bool {
        matches!(self, CipherId::Aes256Gcm | CipherId::ChaCha20Poly1305)
    }

    /// Length of the trailing MAC/tag a file object stores for this cipher:
    /// the AEAD tag length for AEAD ciphers, or HMAC-SHA3-256's output length
    /// otherwise.
    pub const fn tag_len(self) -> usize {
        match self {
            CipherId::Aes256Gcm | CipherId::ChaCha20Poly1305 => 16,
            CipherId::Aes256Cbc | CipherId::ChaCha20 => 32,
        }
    }
}

/// 32-byte secret key, zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct KeyMaterial(pub(crate) [u8; 32]);

impl KeyMaterial {
    /// Generates a fresh key from the platform RNG.
    ///
    /// # Errors
    /// Returns [`VaultError::RngFailure`] if the OS RNG cannot be read.
    pub fn random() -> Result<Self> {
        let mut k = [0u8; 32];
        getrandom::getrandom(&mut k).map_err(|_| VaultError::RngFailure)?;
        Ok(Self(k))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(VaultError::BadLength {
                what: "key",
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut k = [0u8; 32];
        k.copy_from_slice(bytes);
        Ok(Self(k))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Opaque scrypt cost parameters plus a fresh random salt.
///
/// Callers must not depend on the internal layout produced by
/// [`KdfParams::to_bytes`]; only [`KdfParams::from_bytes`] is guaranteed to
/// parse it back.
#[derive(Clone)]
pub struct KdfParams {
    log_n: u8,
    r: u32,
    p: u32,
    salt: Vec<u8>,
}

/// Default scrypt cost: N = 2^15 (32768), r = 8, p = 1.
const DEFAULT_LOG_N: u8 = 15;
const DEFAULT_R: u32 = 8;
const DEFAULT_P: u32 = 1;
const SALT_LEN: usize = 16;

impl KdfParams {
    /// Generates fresh KDF parameters with the given cost, and a random salt.
    ///
    /// # Errors
    /// Returns [`VaultError::RngFailure`] if the salt cannot be generated.
    pub fn generate(log_n: u8, r: u32, p: u32) -> Result<Self> {
        let mut salt = vec![0u8; SALT_LEN];
        getrandom::getrandom(&mut salt).map_err(|_| VaultError::RngFailure)?;
        Ok(Self { log_n, r, p, salt })
    }

    pub fn generate_default() -> Result<Self> {
        Self::generate(DEFAULT_LOG_N, DEFAULT_R, DEFAULT_P)
    }

    /// Packs the parameters into the opaque blob stored in the vault
    /// metadata's KDF parameter block (`kp_len` bytes, bounded to 255).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 4 + 4 + 1 + self.salt.len());
        out.push(self.log_n);
        out.extend_from_slice(&self.r.to_be_bytes());
        out.extend_from_slice(&self.p.to_be_bytes());
        out.push(self.salt.len() as u8);
        out.extend_from_slice(&self.salt);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 10 {
            return Err(VaultError::CorruptMetadata("kdf params too short"));
        }
        let log_n = bytes[0];
        let r = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
        let p = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
        let salt_len = bytes[9] as usize;
        let salt_start = 10;
        let salt_end = salt_start + salt_len;
        if bytes.len() != salt_end {
            return Err(VaultError::CorruptMetadata("kdf params length mismatch"));
        }
        Ok(Self {
            log_n,
            r,
            p,
            salt: bytes[salt_start..salt_end].to_vec(),
        })
    }

    /// Derives K_p from a passphrase using scrypt with these parameters.
    ///
    /// # Errors
    /// Returns [`VaultError::KdfFailure`] if the cost parameters are invalid
    /// or the underlying scrypt call fails.
    pub fn derive(&self, passphrase: &str) -> Result<KeyMaterial> {
        let params = scrypt::Params::new(self.log_n, self.r, self.p, 32)
            .map_err(|e| VaultError::KdfFailure(e.to_string()))?;
        let mut out = [0u8; 32];
        scrypt::scrypt(passphrase.as_bytes(), &self.salt, &params, &mut out)
            .map_err(|e| VaultError::KdfFailure(e.to_string()))?;
        Ok(KeyMaterial(out))
    }
}

/// Computes HMAC-SHA3-256 over `data` keyed by `key`.
pub fn hmac_tag(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha3_256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies `tag` against HMAC-SHA3-256 of `data` keyed by `key`, in constant time.
pub fn verify_hmac_tag(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let mut mac = <HmacSha3_256 as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(tag).is_ok()
}

/// Per-vault cryptographic state: the chosen cipher, its IV, and at most one
/// active key. Owns no disk state; [`CryptoContext::destroy`] wipes
/// everything sensitive.
pub struct CryptoContext {
    cipher: CipherId,
    iv: Vec<u8>,
    key: Option<KeyMaterial>,
}

impl CryptoContext {
    /// Allocates a context for `cipher`. The IV starts out empty; callers
    /// must call [`CryptoContext::gen_iv`] or [`CryptoContext::set_iv`]
    /// before using it.
    pub fn create(cipher: CipherId) -> Result<Self> {
        Ok(Self {
            cipher,
            iv: Vec::new(),
            key: None,
        })
    }

    pub const fn cipher(&self) -> CipherId {
        self.cipher
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Generates a fresh random IV of the cipher's required length.
    ///
    /// # Errors
    /// Returns [`VaultError::RngFailure`] on RNG failure.
    pub fn gen_iv(&mut self) -> Result<()> {
        let mut iv = vec![0u8; self.cipher.iv_len()];
        getrandom::getrandom(&mut iv).map_err(|_| VaultError::RngFailure)?;
        self.iv = iv;
        Ok(())
    }

    /// Installs an externally supplied IV.
    ///
    /// # Errors
    /// Returns [`VaultError::BadLength`] if `bytes.len()` does not match the
    /// cipher's required IV length.
    pub fn set_iv(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.cipher.iv_len();
        if bytes.len() != expected {
            return Err(VaultError::BadLength {
                what: "iv",
                expected,
                actual: bytes.len(),
            });
        }
        self.iv = bytes.to_vec();
        Ok(())
    }

    /// Derives K_e from `passphrase` via scrypt and installs it as the
    /// active key. Used both to derive K_p and, when a caller re-keys
    /// directly from a passphrase (no server round trip), as K_e itself.
    ///
    /// # Errors
    /// Returns [`VaultError::KdfFailure`] if derivation fails.
    pub fn set_passphrase_key(&mut self, passphrase: &str, kdf: &KdfParams) -> Result<()> {
        self.key = Some(kdf.derive(passphrase)?);
        Ok(())
    }

    /// Installs K_e directly from raw bytes (used by recovery).
    ///
    /// # Errors
    /// Returns [`VaultError::BadKey`] if `bytes.len()` does not match the
    /// cipher's key length.
    pub fn set_key(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.cipher.key_len();
        if bytes.len() != expected {
            return Err(VaultError::BadKey {
                expected,
                actual: bytes.len(),
            });
        }
        self.key = Some(KeyMaterial::from_slice(bytes)?);
        Ok(())
    }

    /// Read-only view of the active key. Used only by the metadata HMAC
    /// routine; never logged, never serialized.
    pub fn get_key(&self) -> Option<&[u8; 32]> {
        self.key.as_ref().map(KeyMaterial::as_bytes)
    }

    /// Encrypts `plaintext` with the active key and IV, authenticating
    /// `aad`. Returns `(ciphertext, tag)` where `tag.len() ==
    /// self.cipher().tag_len()`.
    ///
    /// For AEAD ciphers the tag is the cipher's own authentication tag; for
    /// non-AEAD ciphers it is HMAC-SHA3-256 over `aad || ciphertext`
    /// (encrypt-then-MAC), keyed by the same active key.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let key = self.key.as_ref().ok_or(VaultError::AuthenticationFailed)?;
        match self.cipher {
            CipherId::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                let nonce = AesGcmNonce::from_slice(&self.iv);
                let mut out = cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad })
                    .map_err(|_| VaultError::CorruptMetadata("aead encrypt failed"))?;
                let tag = out.split_off(out.len() - self.cipher.tag_len());
                Ok((out, tag))
            }
            CipherId::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                let nonce = ChaChaNonce::from_slice(&self.iv);
                let mut out = cipher
                    .encrypt(nonce, Payload { msg: plaintext, aad })
                    .map_err(|_| VaultError::CorruptMetadata("aead encrypt failed"))?;
                let tag = out.split_off(out.len() - self.cipher.tag_len());
                Ok((out, tag))
            }
            CipherId::Aes256Cbc => {
                let ciphertext = cbc::Encryptor::<Aes256>::new(key.as_bytes().into(), self.iv.as_slice().into())
                    .encrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(plaintext);
                let mut mac_input = aad.to_vec();
                mac_input.extend_from_slice(&ciphertext);
                let tag = hmac_tag(key.as_bytes(), &mac_input);
                Ok((ciphertext, tag))
            }
            CipherId::ChaCha20 => {
                let mut buf = plaintext.to_vec();
                let mut cipher = ChaCha20::new(key.as_bytes().into(), self.iv.as_slice().into());
                cipher.apply_keystream(&mut buf);
                let mut mac_input = aad.to_vec();
                mac_input.extend_from_slice(&buf);
                let tag = hmac_tag(key.as_bytes(), &mac_input);
                Ok((buf, tag))
            }
        }
    }

    /// Decrypts and verifies `(ciphertext, tag)` against `aad`.
    pub fn decrypt(&self, ciphertext: &[u8], tag: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or(VaultError::AuthenticationFailed)?;
        match self.cipher {
            CipherId::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.as_bytes().into());
                let nonce = AesGcmNonce::from_slice(&self.iv);
                let mut combined = ciphertext.to_vec();
                combined.extend_from_slice(tag);
                cipher
                    .decrypt(nonce, Payload { msg: &combined, aad })
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherId::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
                let nonce = ChaChaNonce::from_slice(&self.iv);
                let mut combined = ciphertext.to_vec();
                combined.extend_from_slice(tag);
                cipher
                    .decrypt(nonce, Payload { msg: &combined, aad })
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherId::Aes256Cbc => {
                let mut mac_input = aad.to_vec();
                mac_input.extend_from_slice(ciphertext);
                if !verify_hmac_tag(key.as_bytes(), &mac_input, tag) {
                    return Err(VaultError::AuthenticationFailed);
                }
                cbc::Decryptor::<Aes256>::new(key.as_bytes().into(), self.iv.as_slice().into())
                    .decrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(ciphertext)
                    .map_err(|_| VaultError::AuthenticationFailed)
            }
            CipherId::ChaCha20 => {
                let mut mac_input = aad.to_vec();
                mac_input.extend_from_slice(ciphertext);
                if !verify_hmac_tag(key.as_bytes(), &mac_input, tag) {
                    return Err(VaultError::AuthenticationFailed);
                }
                let mut buf = ciphertext.to_vec();
                let mut cipher = ChaCha20::new(key.as_bytes().into(), self.iv.as_slice().into());
                cipher.apply_keystream(&mut buf);
                Ok(buf)
            }
        }
    }

    /// Wipes IV and key material. Called on every exit path, success or
    /// error, once a context is no longer needed.
    pub fn destroy(&mut self) {
        self.iv.zeroize();
        self.key = None;
    }
}

impl Drop for CryptoContext {
    fn drop(&mut self) {
        self.destroy();
    }
}
