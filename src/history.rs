//! Encrypted rolling keystroke history.
//!
//! The plaintext is a fixed-size block:
//!
//! ```text
//! <HISTORY_HEADER>\n
//! <username>\n
//! <count>\n
//! <v0 v1 ... vF-1>\n      (count lines)
//! \0\0\0...               (padding up to the block size)
//! ```
//!
//! It is encrypted with AES-256-CBC under a key hashed from the username and
//! the hardened secret. The IV is a fixed constant; this is only acceptable
//! because every key is bound to one hardened secret, which is replaced on
//! re-enrollment. A matching header, username and line count is what proves
//! the candidate secret was right, so every decode failure is reported the
//! same way.

use std::fmt;

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, Iv, Key, KeyIvInit};
use num_bigint::BigInt;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{Error, FeatureVector};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// First line of every history plaintext.
pub const HISTORY_HEADER: &str = "keyharden/history/v1";

/// Separator between username and secret in the key derivation input.
pub const KEY_DELIMITER: &str = ";;";

/// Fixed CBC initialisation vector.
pub const HISTORY_IV: [u8; 16] = *b"kh/history/iv/01";

/// Default plaintext block size in bytes.
pub const HISTORY_SIZE: usize = 2000;

/// AES-256 key protecting one user's history.
#[derive(Clone)]
pub struct HistoryKey(Zeroizing<[u8; 32]>);

impl HistoryKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HistoryKey(..)")
    }
}

impl PartialEq for HistoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for HistoryKey {}

/// SHA-256 of `username || KEY_DELIMITER || decimal(hpwd)`.
pub fn derive_history_key(username: &str, hpwd: &BigInt) -> HistoryKey {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(KEY_DELIMITER.as_bytes());
    hasher.update(Zeroizing::new(hpwd.to_string()).as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&hasher.finalize());
    HistoryKey(key)
}

/// Lay out the plaintext block for `history`, null-padded to `size` bytes.
///
/// Fails with [`Error::HistoryOverflow`] if the content does not fit.
pub fn serialize(
    username: &str,
    history: &[FeatureVector],
    size: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut text = Zeroizing::new(String::with_capacity(size));
    text.push_str(HISTORY_HEADER);
    text.push('\n');
    text.push_str(username);
    text.push('\n');
    text.push_str(&history.len().to_string());
    text.push('\n');
    for vector in history {
        let line = vector
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        text.push_str(&line);
        text.push('\n');
    }

    if text.len() > size {
        return Err(Error::HistoryOverflow {
            size: text.len(),
            limit: size,
        });
    }

    let mut block = Zeroizing::new(Vec::with_capacity(size));
    block.extend_from_slice(text.as_bytes());
    block.resize(size, 0);
    Ok(block)
}

/// Block size needed for `lines` entries of `feature_count` values, each
/// printed `value_width` characters wide, with an empty username line.
pub fn block_size_for(feature_count: usize, lines: usize, value_width: usize) -> usize {
    let preamble = HISTORY_HEADER.len() + 1 + 1 + lines.to_string().len() + 1;
    preamble + lines * feature_count * (value_width + 1)
}

/// Encrypt a plaintext block (AES-256-CBC, PKCS#7, fixed IV).
pub fn encrypt(key: &HistoryKey, plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(
        Key::<Aes256CbcEnc>::from_slice(key.as_bytes()),
        Iv::<Aes256CbcEnc>::from_slice(&HISTORY_IV),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Serialize and encrypt in one step.
pub fn seal(
    key: &HistoryKey,
    username: &str,
    history: &[FeatureVector],
    size: usize,
) -> Result<Vec<u8>, Error> {
    let plaintext = serialize(username, history, size)?;
    Ok(encrypt(key, &plaintext))
}

/// Decrypt a history blob and check it belongs to `username`.
///
/// Every failure is [`Error::BadCredential`] except a declared count that
/// disagrees with the stored lines, which is [`Error::CorruptHistory`] so
/// diagnostic callers can tell the two apart.
pub fn decrypt_and_validate(
    key: &HistoryKey,
    ciphertext: &[u8],
    username: &str,
    feature_count: usize,
) -> Result<Vec<FeatureVector>, Error> {
    let plaintext = Zeroizing::new(
        Aes256CbcDec::new(
            Key::<Aes256CbcDec>::from_slice(key.as_bytes()),
            Iv::<Aes256CbcDec>::from_slice(&HISTORY_IV),
        )
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::BadCredential)?,
    );
    let text = std::str::from_utf8(&plaintext).map_err(|_| Error::BadCredential)?;
    let mut lines = text.trim_end_matches('\0').lines();

    let header = lines.next().ok_or(Error::BadCredential)?;
    if !bool::from(header.as_bytes().ct_eq(HISTORY_HEADER.as_bytes())) {
        return Err(Error::BadCredential);
    }
    let stored_user = lines.next().ok_or(Error::BadCredential)?;
    if !bool::from(stored_user.as_bytes().ct_eq(username.as_bytes())) {
        return Err(Error::BadCredential);
    }
    let declared: usize = lines
        .next()
        .and_then(|line| line.parse().ok())
        .ok_or(Error::BadCredential)?;

    let rows: Vec<&str> = lines.collect();
    if rows.len() != declared {
        return Err(Error::CorruptHistory {
            declared,
            found: rows.len(),
        });
    }

    rows.into_iter()
        .map(|row| {
            let vector = row
                .split(' ')
                .map(str::parse::<f64>)
                .collect::<Result<FeatureVector, _>>()
                .map_err(|_| Error::BadCredential)?;
            if vector.len() != feature_count {
                return Err(Error::BadCredential);
            }
            Ok(vector)
        })
        .collect()
}
