//! Low-level cryptographic operations.
//!
//! This is the only module of the crate that imports `ring`. Every other module signs, derives,
//! seals and opens exclusively through the functions exposed here.
//!
//! Primitive choices:
//! - **MAC**: HMAC-SHA256 (API key signature chains and hierarchical path keys).
//! - **Passphrase KDF**: PBKDF2-HMAC-SHA256 with the project salt.
//! - **Cipher**: AES-256-GCM with a random 96-bit nonce per sealed chunk.

use crate::{Error, Result};

use std::num::NonZeroU32;

use ring::rand::{SecureRandom, SystemRandom};
use ring::{aead, digest, hmac, pbkdf2};

/// Size of a symmetric key and of a MAC in bytes (256 bits).
pub(crate) const KEY_LEN: usize = 32;

/// Size of the nonce in bytes (96 bits).
pub(crate) const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub(crate) const TAG_LEN: usize = 16;

/// Number of PBKDF2 rounds applied to a passphrase.
const PASSPHRASE_ROUNDS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(rounds) => rounds,
    None => panic!("passphrase rounds must be greater than zero"),
};

/// Fills a new array with bytes from the system's secure random generator.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| Error::new_internal("filling random bytes", "system RNG failure".into()))?;
    Ok(buf)
}

/// Signs `data` with `key` using HMAC-SHA256.
pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; KEY_LEN] {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, data);

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(tag.as_ref());
    out
}

/// Verifies in constant time that `tag` is the HMAC-SHA256 of `data` under `key`.
pub(crate) fn hmac_sha256_verify(key: &[u8], data: &[u8], tag: &[u8]) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, data, tag).is_ok()
}

/// Returns the SHA-256 digest of `data`.
pub(crate) fn sha256(data: &[u8]) -> [u8; KEY_LEN] {
    let d = digest::digest(&digest::SHA256, data);

    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(d.as_ref());
    out
}

/// Stretches `passphrase` into a key bound to `salt`.
pub(crate) fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PASSPHRASE_ROUNDS,
        salt,
        passphrase,
        &mut out,
    );
    out
}

/// Encrypts `plaintext` with AES-256-GCM under `key`.
///
/// The fresh nonce is prepended to the output:
///
/// ```text
/// [ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
/// ```
pub(crate) fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = aead_key(key)?;
    let nonce = random_bytes::<NONCE_LEN>()?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce),
        aead::Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| Error::new_internal("sealing chunk", "AES-256-GCM failure".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypts a payload produced by [`seal`].
///
/// A wrong key or a tampered payload fails the GCM authentication check and no partial plaintext
/// is returned.
pub(crate) fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::new_internal(
            "opening chunk",
            "sealed payload is shorter than nonce and tag".into(),
        ));
    }

    let key = aead_key(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&sealed[..NONCE_LEN]);

    let mut payload = sealed[NONCE_LEN..].to_vec();
    let plaintext = key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(nonce),
            aead::Aad::empty(),
            &mut payload,
        )
        .map_err(|_| Error::new_internal("opening chunk", "authentication failed".into()))?;

    Ok(plaintext.to_vec())
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<aead::LessSafeKey> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| Error::new_internal("building AES-256-GCM key", "invalid key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}
