//! Vault lifecycle and cryptographic envelope for an encrypted, authenticated
//! local secrets store.
//!
//! A vault is a directory holding one metadata record (see [`metadata`]) and
//! a tree of individually encrypted files (see [`fileobject`]). Opening it
//! needs a passphrase and, unless the vault was created with `NOAUTH`, a
//! round trip to a key-escrow server reached through the [`escrow`]
//! collaborator trait. [`vault::Vault`] ties these pieces into the
//! init/open/open_ekey/close state machine.
//!
//! The filesystem front-end, the CLI, the HTTP/TLS escrow client, and TOTP
//! computation are deliberately not part of this crate — see [`escrow`] for
//! the contract they implement against.

pub mod config;
pub mod crypto;
pub mod error;
pub mod escrow;
pub mod fileobject;
pub mod metadata;
pub mod recovery;
pub mod vault;

pub use config::{InitOptions, OpenOptions, VaultConfig};
pub use crypto::{CipherId, CryptoContext, KdfParams, KeyMaterial};
pub use error::{Result, VaultError};
pub use escrow::EscrowClient;
pub use metadata::MetadataRecord;
pub use recovery::RecoveryBundle;
pub use vault::{FileHandleId, Vault};
