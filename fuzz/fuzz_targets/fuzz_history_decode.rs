#![no_main]

use arbitrary::Arbitrary;
use keyharden::history::{decrypt_and_validate, derive_history_key, encrypt, HISTORY_SIZE};
use keyharden::Error;
use libfuzzer_sys::fuzz_target;
use num_bigint::BigInt;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    secret: u64,
    username: String,
    plaintext: Vec<u8>,
    feature_count: u8,
    raw_ciphertext: bool,
}

fuzz_target!(|input: FuzzInput| {
    let key = derive_history_key(&input.username, &BigInt::from(input.secret));

    // Either decrypt arbitrary bytes, or a valid encryption of arbitrary
    // plaintext so the line parser sees attacker-shaped content.
    let blob = if input.raw_ciphertext {
        input.plaintext.clone()
    } else {
        let mut block = input.plaintext.clone();
        block.truncate(HISTORY_SIZE);
        encrypt(&key, &block)
    };

    match decrypt_and_validate(&key, &blob, &input.username, input.feature_count as usize) {
        Ok(history) => {
            for vector in &history {
                assert_eq!(vector.len(), input.feature_count as usize);
            }
        }
        Err(Error::BadCredential) | Err(Error::CorruptHistory { .. }) => {}
        Err(other) => panic!("unexpected error kind: {:?}", other),
    }
});
