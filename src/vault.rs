//! The vault handle: the in-memory object produced by `init`/`open`/`open_ekey`
//! and consumed by `close`.

use crate::config::{InitOptions, OpenOptions};
use crate::crypto::{CipherId, CryptoContext, KdfParams, KeyMaterial};
use crate::error::{Result, VaultError};
use crate::escrow::EscrowClient;
use crate::metadata::{MetadataRecord, FLAG_NOAUTH};
use crate::recovery::RecoveryBundle;
use std::collections::HashMap;
use std::fs::OpenOptions as FsOpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroize;

pub const METADATA_FILE_NAME: &str = ".vault-metadata";

/// Opaque handle to a registered open file object. Carries no data itself;
/// the vault's file-object map is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandleId(u64);

/// In-memory vault handle. Owns the base path, the optional server URL, the
/// UID, the crypto context (IV + effective key), and the set of currently
/// open file objects.
///
/// Consumed by [`Vault::close`] — there is no way to use a `Vault` after
/// closing it, by construction.
pub struct Vault {
    base_path: PathBuf,
    server_url: Option<String>,
    uid: [u8; 16],
    flags: u8,
    crypto: CryptoContext,
    open_files: HashMap<FileHandleId, ()>,
    next_handle: u64,
}

fn metadata_path(base: &Path) -> PathBuf {
    base.join(METADATA_FILE_NAME)
}

fn parse_uid_hex(uid_hex: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(uid_hex).map_err(|_| VaultError::BadUid(uid_hex.to_string()))?;
    if bytes.len() != 16 {
        return Err(VaultError::BadUid(uid_hex.to_string()));
    }
    let mut uid = [0u8; 16];
    uid.copy_from_slice(&bytes);
    Ok(uid)
}

fn require_directory(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|_| VaultError::NotFound(path.to_path_buf()))?;
    if !meta.is_dir() {
        return Err(VaultError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Envelope-wraps K_e under K_p for transit to the escrow server. Always
/// uses AES-256-GCM regardless of the vault's chosen payload cipher — the
/// envelope and the payload cipher are independent concerns.
fn wrap_key_e(k_p: &KeyMaterial, k_e: &KeyMaterial) -> Result<Vec<u8>> {
    let mut ctx = CryptoContext::create(CipherId::Aes256Gcm)?;
    ctx.gen_iv()?;
    ctx.set_key(k_p.as_bytes())?;
    let (ciphertext, tag) = ctx.encrypt(k_e.as_bytes(), b"vault-envelope-key")?;
    let mut out = Vec::with_capacity(ctx.iv().len() + ciphertext.len() + tag.len());
    out.extend_from_slice(ctx.iv());
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Reverses [`wrap_key_e`].
fn unwrap_key_e(k_p: &KeyMaterial, wrapped: &[u8]) -> Result<KeyMaterial> {
    let mut ctx = CryptoContext::create(CipherId::Aes256Gcm)?;
    let iv_len = ctx.cipher().iv_len();
    let tag_len = ctx.cipher().tag_len();
    if wrapped.len() < iv_len + tag_len {
        return Err(VaultError::CorruptMetadata("wrapped key too short"));
    }
    let (iv, rest) = wrapped.split_at(iv_len);
    let (ciphertext, tag) = rest.split_at(rest.len() - tag_len);
    ctx.set_iv(iv)?;
    ctx.set_key(k_p.as_bytes())?;
    let plaintext = ctx.decrypt(ciphertext, tag, b"vault-envelope-key")?;
    KeyMaterial::from_slice(&plaintext)
}

impl Vault {
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn uid(&self) -> [u8; 16] {
        self.uid
    }

    pub const fn cipher(&self) -> CipherId {
        self.crypto.cipher()
    }

    pub const fn is_noauth(&self) -> bool {
        self.flags & FLAG_NOAUTH != 0
    }

    pub fn crypto(&self) -> &CryptoContext {
        &self.crypto
    }

    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }

    /// Registers a new open file object, returning an opaque handle.
    pub fn register_open_file(&mut self) -> FileHandleId {
        let id = FileHandleId(self.next_handle);
        self.next_handle += 1;
        self.open_files.insert(id, ());
        id
    }

    /// Closes a single open file object, removing it from the vault's list.
    ///
    /// # Errors
    /// Returns [`VaultError::CorruptMetadata`] if `id` is not currently
    /// registered — a caller bug, not a disk-corruption condition; the
    /// variant is reused here rather than adding a dedicated one for a path
    /// that should never be reachable outside of a logic error.
    pub fn close_file(&mut self, id: FileHandleId) -> Result<()> {
        self.open_files
            .remove(&id)
            .map(|_| ())
            .ok_or(VaultError::CorruptMetadata("file handle not registered"))
    }

    /// Initializes a new vault at `opts.base_path`.
    ///
    /// `auth_setup` is an opaque blob (e.g. a TOTP seed) established out of
    /// band with the escrow server; this core forwards it without
    /// interpreting it. Ignored entirely when `opts.noauth` is set.
    ///
    /// `init` never hands back a live handle — it only reaches the
    /// `Initialized` state on disk. Call [`Vault::open`] afterward to get
    /// one, the same as every other caller of this function.
    #[instrument(skip(opts, passphrase, uid_hex, auth_setup, escrow), fields(base = %opts.base_path.display()))]
    pub fn init(
        opts: &InitOptions,
        passphrase: &str,
        uid_hex: &str,
        auth_setup: &[u8],
        escrow: &dyn EscrowClient,
    ) -> Result<()> {
        require_directory(&opts.base_path)?;
        let path = metadata_path(&opts.base_path);
        if path.exists() {
            return Err(VaultError::AlreadyExists(path));
        }

        let uid = parse_uid_hex(uid_hex)?;

        let mut ctx = CryptoContext::create(opts.cipher)?;
        ctx.gen_iv()?;
        let kdf = KdfParams::generate_default()?;
        ctx.set_passphrase_key(passphrase, &kdf)?;

        let mut flags = 0u8;
        if opts.noauth {
            flags |= FLAG_NOAUTH;
        } else {
            let result = (|| -> Result<()> {
                if opts.server_url.is_none() {
                    return Err(VaultError::MissingServer);
                }

                let k_p = KeyMaterial::from_slice(ctx.get_key().expect("just installed"))?;
                let k_e = KeyMaterial::random()?;
                let k_s = wrap_key_e(&k_p, &k_e)?;
                escrow.register(&uid, auth_setup, &k_s)?;
                ctx.set_key(k_e.as_bytes())?;
                Ok(())
            })();

            if let Err(e) = result {
                ctx.destroy();
                return Err(e);
            }
        }

        let record = MetadataRecord::new(opts.cipher, flags, uid, ctx.iv().to_vec(), kdf);
        let bytes = match record.to_bytes(ctx.get_key().expect("key installed above")) {
            Ok(bytes) => bytes,
            Err(e) => {
                ctx.destroy();
                return Err(e);
            }
        };

        let write_result = write_new_file(&path, &bytes);
        ctx.destroy();
        write_result?;

        info!(cipher = ?opts.cipher, noauth = opts.noauth, "vault initialized");
        Ok(())
    }

    /// Opens an existing vault with a passphrase (and, unless the vault was
    /// created with `NOAUTH`, a TOTP round trip to the escrow server).
    #[instrument(skip(opts, passphrase, totp_token, escrow), fields(base = %opts.base_path.display()))]
    pub fn open(opts: &OpenOptions, passphrase: &str, totp_token: &str, escrow: &dyn EscrowClient) -> Result<Self> {
        require_directory(&opts.base_path)?;
        let path = metadata_path(&opts.base_path);
        let file = std::fs::File::open(&path).map_err(|_| VaultError::NotFound(path.clone()))?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;

        let fields = MetadataRecord::parse_unverified(bytes).inspect_err(|e| {
            warn!(error = %e, "metadata parse failed");
        })?;

        let mut ctx = CryptoContext::create(fields.cipher)?;
        ctx.set_iv(&fields.iv)?;
        ctx.set_passphrase_key(passphrase, &fields.kdf)?;

        let server_url = if fields.is_noauth() {
            None
        } else {
            let url = opts.server_url.clone().ok_or(VaultError::MissingServer)?;
            let k_p = KeyMaterial::from_slice(ctx.get_key().expect("just installed"))?;
            let k_s = escrow.fetch(&fields.uid, totp_token)?;
            let k_e = unwrap_key_e(&k_p, &k_s)?;
            ctx.set_key(k_e.as_bytes())?;
            Some(url)
        };

        let verify_result = MetadataRecord::verify(bytes, ctx.get_key().expect("key installed above"));
        drop(mmap);

        if let Err(e) = &verify_result {
            warn!(error = %e, "metadata authentication failed");
            ctx.destroy();
            verify_result?;
        }

        debug!(cipher = ?fields.cipher, "vault opened");

        Ok(Self {
            base_path: opts.base_path.clone(),
            server_url,
            uid: fields.uid,
            flags: fields.flags,
            crypto: ctx,
            open_files: HashMap::new(),
            next_handle: 0,
        })
    }

    /// Opens a vault from a recovery bundle, bypassing the escrow server and
    /// the metadata HMAC check entirely. This is a trust-the-bundle escape
    /// hatch, not a normal open path.
    #[instrument(skip(bundle_text), fields(base = %base_path.as_ref().display()))]
    pub fn open_ekey(base_path: impl AsRef<Path>, bundle_text: &str) -> Result<Self> {
        let base_path = base_path.as_ref();
        require_directory(base_path)?;

        let bundle = RecoveryBundle::parse(bundle_text)?;
        let fields = MetadataRecord::parse_unverified(&bundle.metadata)?;

        let mut ctx = CryptoContext::create(fields.cipher)?;
        ctx.set_iv(&fields.iv)?;
        ctx.set_key(&bundle.ekey)?;

        info!(cipher = ?fields.cipher, "vault opened via recovery bundle");

        Ok(Self {
            base_path: base_path.to_path_buf(),
            server_url: None,
            uid: fields.uid,
            flags: fields.flags,
            crypto: ctx,
            open_files: HashMap::new(),
            next_handle: 0,
        })
    }

    /// Closes the vault: every open file object must already be closed, then
    /// key material is wiped. Consumes `self` so a closed vault cannot be
    /// used again.
    ///
    /// # Errors
    /// Returns [`VaultError::CorruptMetadata`] if any file object is still
    /// registered — callers must close all of them first.
    #[instrument(skip(self), fields(base = %self.base_path.display()))]
    pub fn close(mut self) -> Result<()> {
        if !self.open_files.is_empty() {
            return Err(VaultError::CorruptMetadata("open file objects remain"));
        }
        self.crypto.destroy();
        self.flags.zeroize();
        info!("vault closed");
        Ok(())
    }
}

fn write_new_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = FsOpenOptions::new()
        .write(true)
        .create_new(true)
        .mode_or_default()
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                VaultError::AlreadyExists(path.to_path_buf())
            } else {
                VaultError::Io(e)
            }
        })?;

    let result = (|| -> Result<()> {
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(path);
        return result;
    }

    fsync_parent_dir(path);
    Ok(())
}

#[cfg(unix)]
fn fsync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn fsync_parent_dir(_path: &Path) {}

trait OpenOptionsExt {
    fn mode_or_default(self) -> Self;
}

#[cfg(unix)]
impl OpenOptionsExt for FsOpenOptions {
    fn mode_or_default(mut self) -> Self {
        use std::os::unix::fs::OpenOptionsExt as _;
        self.mode(0o600);
        self
    }
}

#[cfg(not(unix))]
impl OpenOptionsExt for FsOpenOptions {
    fn mode_or_default(self) -> Self {
        self
    }
}
