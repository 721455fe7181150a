//! Recovery bundle parsing: the server-less escape hatch.
//!
//! A bundle is a small text container of `SECTION-NAME:` blocks, each
//! followed by one line of hex-encoded bytes. Only `METADATA` and `EKEY` are
//! required; any other section name is ignored, so future producers can add
//! sections without breaking old readers.

use crate::error::{Result, VaultError};

pub struct RecoveryBundle {
    pub metadata: Vec<u8>,
    pub ekey: Vec<u8>,
}

impl RecoveryBundle {
    /// Parses a recovery bundle's text contents.
    ///
    /// # Errors
    /// Returns [`VaultError::BadRecovery`] if either required section is
    /// missing or its hex payload doesn't decode.
    pub fn parse(text: &str) -> Result<Self> {
        let mut metadata: Option<Vec<u8>> = None;
        let mut ekey: Option<Vec<u8>> = None;

        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let Some(name) = line.strip_suffix(':') else {
                continue;
            };
            let Some(payload_line) = lines.next() else {
                return Err(VaultError::BadRecovery(format!("section {name} has no payload line")));
            };
            let bytes = hex::decode(payload_line.trim())
                .map_err(|e| VaultError::BadRecovery(format!("section {name}: {e}")))?;

            match name {
                "METADATA" => metadata = Some(bytes),
                "EKEY" => ekey = Some(bytes),
                _ => {}
            }
        }

        Ok(Self {
            metadata: metadata.ok_or_else(|| VaultError::BadRecovery("missing METADATA section".into()))?,
            ekey: ekey.ok_or_else(|| VaultError::BadRecovery("missing EKEY section".into()))?,
        })
    }

    /// Serializes a bundle back to the text format. Used by tests and by
    /// whatever collaborator produces bundles for a user to export.
    pub fn render(&self) -> String {
        format!(
            "METADATA:\n{}\nEKEY:\n{}\n",
            hex::encode(&self.metadata),
            hex::encode(&self.ekey)
        )
    }
}
