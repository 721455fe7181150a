//! End-to-end vault lifecycle scenarios (S1-S6).

use vaultcore::config::{InitOptions, OpenOptions};
use vaultcore::crypto::CipherId;
use vaultcore::escrow::fake::InMemoryEscrow;
use vaultcore::error::VaultError;
use vaultcore::vault::Vault;

fn metadata_path(dir: &std::path::Path) -> std::path::PathBuf {
    dir.join(vaultcore::vault::METADATA_FILE_NAME)
}

// S1: aes256-cbc, NOAUTH, passphrase "correct horse", fixed uid.
// init produces a metadata file of length >= 64+IV+kp+32; open with the
// right passphrase succeeds, with the wrong one fails AuthenticationFailed.
#[test]
fn s1_cbc_noauth_roundtrip_and_wrong_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path())
        .with_cipher_name("aes256-cbc")
        .unwrap()
        .noauth();
    let escrow = InMemoryEscrow::new();

    Vault::init(&opts, "correct horse", uid, b"", &escrow).unwrap();

    let bytes = std::fs::read(metadata_path(dir.path())).unwrap();
    assert!(bytes.len() >= 64 + CipherId::Aes256Cbc.iv_len() + 10 + 32);

    let open_opts = OpenOptions::new(dir.path());
    let opened = Vault::open(&open_opts, "correct horse", "", &escrow).unwrap();
    assert_eq!(opened.cipher(), CipherId::Aes256Cbc);
    opened.close().unwrap();

    let err = Vault::open(&open_opts, "wrong horse", "", &escrow).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailed));
}

// S2: chacha20-poly1305, NOAUTH. Flip byte 0 (ver); open fails IncompatibleVersion.
#[test]
fn s2_version_byte_flip_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path())
        .with_cipher_name("chacha20-poly1305")
        .unwrap()
        .noauth();
    let escrow = InMemoryEscrow::new();
    Vault::init(&opts, "pw", uid, b"", &escrow).unwrap();

    let path = metadata_path(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let open_opts = OpenOptions::new(dir.path());
    let err = Vault::open(&open_opts, "pw", "", &escrow).unwrap_err();
    assert!(matches!(err, VaultError::IncompatibleVersion { .. }));
}

// S3: successful init; flip the last byte of the stored HMAC; open fails AuthenticationFailed.
#[test]
fn s3_hmac_tail_flip_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path()).noauth();
    let escrow = InMemoryEscrow::new();
    Vault::init(&opts, "pw", uid, b"", &escrow).unwrap();

    let path = metadata_path(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let open_opts = OpenOptions::new(dir.path());
    let err = Vault::open(&open_opts, "pw", "", &escrow).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailed));
}

// S4: open_ekey with a bundle whose EKEY length != cipher key length -> BadKey.
#[test]
fn s4_recovery_bundle_bad_key_length() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path()).noauth();
    let escrow = InMemoryEscrow::new();
    Vault::init(&opts, "pw", uid, b"", &escrow).unwrap();
    let metadata_bytes = std::fs::read(metadata_path(dir.path())).unwrap();

    let bundle_text = format!("METADATA:\n{}\nEKEY:\n{}\n", hex::encode(&metadata_bytes), hex::encode([0u8; 5]));

    let err = Vault::open_ekey(dir.path(), &bundle_text).unwrap_err();
    assert!(matches!(err, VaultError::BadKey { .. }));
}

// S5: init with uid="not-hex" -> BadUid; no file created.
#[test]
fn s5_bad_uid_no_file_created() {
    let dir = tempfile::tempdir().unwrap();
    let opts = InitOptions::new(dir.path()).noauth();
    let escrow = InMemoryEscrow::new();

    let err = Vault::init(&opts, "pw", "not-hex", b"", &escrow).unwrap_err();
    assert!(matches!(err, VaultError::BadUid(_)));
    assert!(!metadata_path(dir.path()).exists());
}

// S6: init twice into the same directory; second call -> AlreadyExists;
// first metadata file unchanged (byte-compare).
#[test]
fn s6_double_init_preserves_first_file() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path()).noauth();
    let escrow = InMemoryEscrow::new();

    Vault::init(&opts, "first", uid, b"", &escrow).unwrap();
    let before = std::fs::read(metadata_path(dir.path())).unwrap();

    let err = Vault::init(&opts, "second", uid, b"", &escrow).unwrap_err();
    assert!(matches!(err, VaultError::AlreadyExists(_)));

    let after = std::fs::read(metadata_path(dir.path())).unwrap();
    assert_eq!(before, after);
}

#[test]
fn noauth_mode_never_requires_a_server_url() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path()).noauth();
    assert!(opts.server_url.is_none());
    let escrow = InMemoryEscrow::new();
    Vault::init(&opts, "pw", uid, b"", &escrow).unwrap();

    let open_opts = OpenOptions::new(dir.path());
    let vault = Vault::open(&open_opts, "pw", "", &escrow).unwrap();
    assert!(vault.server_url().is_none());
    vault.close().unwrap();
}

#[test]
fn recovery_open_exposes_same_cipher_and_uid_as_passphrase_open() {
    let dir = tempfile::tempdir().unwrap();
    let uid = "00112233445566778899aabbccddeeff";
    let opts = InitOptions::new(dir.path()).noauth();
    let escrow = InMemoryEscrow::new();

    Vault::init(&opts, "pw", uid, b"", &escrow).unwrap();

    let open_opts = OpenOptions::new(dir.path());
    let by_passphrase = Vault::open(&open_opts, "pw", "", &escrow).unwrap();
    let key = *by_passphrase.crypto().get_key().unwrap();
    let metadata_bytes = std::fs::read(metadata_path(dir.path())).unwrap();
    let cipher = by_passphrase.cipher();
    let uid_bytes = by_passphrase.uid();
    by_passphrase.close().unwrap();

    let bundle_text = format!("METADATA:\n{}\nEKEY:\n{}\n", hex::encode(&metadata_bytes), hex::encode(key));
    let by_recovery = Vault::open_ekey(dir.path(), &bundle_text).unwrap();
    assert_eq!(by_recovery.cipher(), cipher);
    assert_eq!(by_recovery.uid(), uid_bytes);
    by_recovery.close().unwrap();
}
