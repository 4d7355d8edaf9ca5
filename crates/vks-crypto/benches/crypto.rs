use secrecy::SecretString;
use vks_core::DerivationScheme;
use vks_crypto::{open, open_with, seal, seal_for, CipherKey, KeyDeriver, MasterSecret, RecipientSecretKey};

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                        abandon abandon abandon abandon abandon about";

#[divan::bench(args = [DerivationScheme::Standard, DerivationScheme::Legacy])]
fn bench_derive_signing_key(bencher: divan::Bencher, scheme: DerivationScheme) {
    let secret = MasterSecret::from_mnemonic(&SecretString::from(MNEMONIC)).unwrap();
    let deriver = KeyDeriver::new(&secret, scheme).unwrap();
    bencher.bench(|| deriver.derive(divan::black_box(42)));
}

#[divan::bench]
fn bench_seal_open_at_rest(bencher: divan::Bencher) {
    let key = CipherKey::generate();
    let scalar = [0x11u8; 32];
    bencher.bench(|| {
        let envelope = seal(divan::black_box(&key), divan::black_box(&scalar)).unwrap();
        open(&key, &envelope).unwrap()
    });
}

#[divan::bench]
fn bench_seal_open_transfer(bencher: divan::Bencher) {
    let recipient = RecipientSecretKey::generate();
    let public = recipient.public_key();
    let scalar = [0x11u8; 32];
    bencher.bench(|| {
        let envelope = seal_for(divan::black_box(&public), divan::black_box(&scalar)).unwrap();
        open_with(&recipient, &envelope).unwrap()
    });
}

fn main() {
    divan::main();
}
