use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::time::Duration;
use vaultcore::crypto::{CipherId, CryptoContext, KdfParams, KeyMaterial};

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("random_key", |b| {
        b.iter(|| black_box(KeyMaterial::random().unwrap()));
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");
    group.measurement_time(Duration::from_secs(30)); // scrypt is slow

    let passwords = [
        "short",
        "medium_length_password",
        "very_long_password_that_might_be_used_by_someone",
    ];

    // (log_n, r, p) triples spanning fast-test cost up to the production default.
    let kdf_configs = [("fast", 10u8, 8u32, 1u32), ("secure", 15, 8, 1), ("high_security", 17, 8, 2)];

    for (config_name, log_n, r, p) in kdf_configs {
        let kdf = KdfParams::generate(log_n, r, p).unwrap();
        for password in &passwords {
            group.bench_with_input(
                BenchmarkId::new(config_name, password.len()),
                password,
                |b, password| {
                    b.iter(|| black_box(kdf.derive(password).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_envelope_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_key_wrap");
    group.measurement_time(Duration::from_secs(10));

    let k_p = KeyMaterial::random().unwrap();
    let k_e = KeyMaterial::random().unwrap();

    group.bench_function("wrap", |b| {
        b.iter(|| {
            let mut ctx = CryptoContext::create(CipherId::Aes256Gcm).unwrap();
            ctx.gen_iv().unwrap();
            ctx.set_key(k_p.as_bytes()).unwrap();
            black_box(ctx.encrypt(k_e.as_bytes(), b"vault-envelope-key").unwrap())
        });
    });

    let mut wrap_ctx = CryptoContext::create(CipherId::Aes256Gcm).unwrap();
    wrap_ctx.gen_iv().unwrap();
    wrap_ctx.set_key(k_p.as_bytes()).unwrap();
    let (ciphertext, tag) = wrap_ctx.encrypt(k_e.as_bytes(), b"vault-envelope-key").unwrap();
    let iv = wrap_ctx.iv().to_vec();

    group.bench_function("unwrap", |b| {
        b.iter(|| {
            let mut ctx = CryptoContext::create(CipherId::Aes256Gcm).unwrap();
            ctx.set_iv(&iv).unwrap();
            ctx.set_key(k_p.as_bytes()).unwrap();
            black_box(ctx.decrypt(&ciphertext, &tag, b"vault-envelope-key").unwrap())
        });
    });

    group.finish();
}

fn bench_payload_cipher_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_cipher_operations");
    group.measurement_time(Duration::from_secs(10));

    let associated_data = b"test associated data";
    let data_sizes = [16, 256, 1024, 8192, 65536]; // 16B to 64KB

    for cipher in [
        CipherId::Aes256Cbc,
        CipherId::ChaCha20,
        CipherId::Aes256Gcm,
        CipherId::ChaCha20Poly1305,
    ] {
        let key = KeyMaterial::random().unwrap();

        for &size in &data_sizes {
            let plaintext = vec![0u8; size];

            group.bench_with_input(
                BenchmarkId::new(format!("{cipher:?}/encrypt"), size),
                &plaintext,
                |b, plaintext| {
                    b.iter(|| {
                        let mut ctx = CryptoContext::create(cipher).unwrap();
                        ctx.gen_iv().unwrap();
                        ctx.set_key(key.as_bytes()).unwrap();
                        black_box(ctx.encrypt(plaintext, associated_data).unwrap())
                    });
                },
            );

            let mut ctx = CryptoContext::create(cipher).unwrap();
            ctx.gen_iv().unwrap();
            ctx.set_key(key.as_bytes()).unwrap();
            let (ciphertext, tag) = ctx.encrypt(&plaintext, associated_data).unwrap();
            let iv = ctx.iv().to_vec();

            group.bench_with_input(
                BenchmarkId::new(format!("{cipher:?}/decrypt"), size),
                &(&ciphertext, &tag),
                |b, (ciphertext, tag)| {
                    b.iter(|| {
                        let mut ctx = CryptoContext::create(cipher).unwrap();
                        ctx.set_iv(&iv).unwrap();
                        ctx.set_key(key.as_bytes()).unwrap();
                        black_box(ctx.decrypt(ciphertext, tag, associated_data).unwrap())
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_generation,
    bench_key_derivation,
    bench_envelope_roundtrip,
    bench_payload_cipher_operations
);
criterion_main!(benches);
