//! Contract for the key-escrow server collaborator.
//!
//! This crate never speaks HTTP or TLS itself. Init and open drive an
//! `EscrowClient` implementation supplied by the caller; this module only
//! defines the shape of that contract and an in-memory fake for tests.

use crate::error::Result;

/// One-shot registration at `init`: envelope-wrap K_e under K_p and hand the
/// result to the server, keyed by `uid`.
///
/// One key fetch at `open`: present `uid` and a TOTP token, receive back the
/// wrapped key.
pub trait EscrowClient {
    /// Registers a freshly wrapped K_s (K_e encrypted under K_p) for `uid`.
    /// `auth_setup` is an opaque, collaborator-defined blob (e.g. a TOTP
    /// seed) established out of band; this core does not interpret it.
    fn register(&self, uid: &[u8; 16], auth_setup: &[u8], k_s: &[u8]) -> Result<()>;

    /// Fetches the wrapped key K_s previously registered for `uid`,
    /// authenticating with `totp_token`.
    ///
    /// # Errors
    /// Returns [`crate::error::VaultError::AuthFailed`] if the server
    /// rejects the token, or [`crate::error::VaultError::NetworkError`] on a
    /// transport fault.
    fn fetch(&self, uid: &[u8; 16], totp_token: &str) -> Result<Vec<u8>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::EscrowClient;
    use crate::error::{Result, VaultError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory stand-in for the real escrow server, used only by this
    /// crate's own tests. Accepts any non-empty TOTP token unless
    /// `reject_all` is set.
    #[derive(Default)]
    pub struct InMemoryEscrow {
        entries: Mutex<HashMap<[u8; 16], Vec<u8>>>,
        reject_all: bool,
    }

    impl InMemoryEscrow {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn rejecting() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                reject_all: true,
            }
        }
    }

    impl EscrowClient for InMemoryEscrow {
        fn register(&self, uid: &[u8; 16], _auth_setup: &[u8], k_s: &[u8]) -> Result<()> {
            self.entries.lock().unwrap().insert(*uid, k_s.to_vec());
            Ok(())
        }

        fn fetch(&self, uid: &[u8; 16], totp_token: &str) -> Result<Vec<u8>> {
            if self.reject_all || totp_token.is_empty() {
                return Err(VaultError::AuthFailed);
            }
            self.entries
                .lock()
                .unwrap()
                .get(uid)
                .cloned()
                .ok_or(VaultError::AuthFailed)
        }
    }
}
