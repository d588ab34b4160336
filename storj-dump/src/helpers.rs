//! Helper functions which are used across the modules of this crate.

use crate::crypto;
use crate::Error;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Number of checksum bytes appended to an encoded token.
const CHECKSUM_LEN: usize = 4;

/// Returns `arg_val` if it isn't empty, otherwise it returns an `Error::InvalidArguments` with the
/// passed argument's name.
pub(crate) fn non_empty_fn_arg<'a>(arg_name: &str, arg_val: &'a str) -> Result<&'a str, Error> {
    if arg_val.is_empty() {
        return Err(Error::new_invalid_arguments(arg_name, "cannot be empty"));
    }

    Ok(arg_val)
}

/// Encodes `payload` into a URL-safe token prefixed with `version` and suffixed with a truncated
/// SHA-256 checksum of both.
pub(crate) fn encode_token(version: u8, payload: &[u8]) -> String {
    let mut raw = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    raw.push(version);
    raw.extend_from_slice(payload);

    let checksum = crypto::sha256(&raw);
    raw.extend_from_slice(&checksum[..CHECKSUM_LEN]);

    URL_SAFE_NO_PAD.encode(raw)
}

/// Decodes a token produced by [`encode_token`] returning its payload.
///
/// It returns a human friendly message when the token isn't valid base64, the checksum doesn't
/// match or its version isn't `version`.
pub(crate) fn decode_token(version: u8, token: &str) -> Result<Vec<u8>, String> {
    let mut raw = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| format!("invalid encoding: {}", e))?;

    if raw.len() < 1 + CHECKSUM_LEN {
        return Err(String::from("too short"));
    }

    let checksum = raw.split_off(raw.len() - CHECKSUM_LEN);
    if crypto::sha256(&raw)[..CHECKSUM_LEN] != checksum[..] {
        return Err(String::from("checksum mismatch"));
    }

    if raw[0] != version {
        return Err(format!(
            "unsupported version {}, expected {}",
            raw[0], version
        ));
    }

    Ok(raw.split_off(1))
}

/// Validates a bucket name with the same rules that Storj satellites apply: between 3 and 63
/// characters, lowercase ASCII letters, digits, dashes and dots, starting and ending with a
/// letter or a digit.
pub(crate) fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(String::from("bucket name cannot be empty"));
    }

    if name.len() < 3 || name.len() > 63 {
        return Err(format!(
            "bucket name {:?} must be between 3 and 63 characters",
            name
        ));
    }

    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = name.as_bytes();

    if !valid_chars || !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return Err(format!(
            "bucket name {:?} may only contain lowercase letters, digits, dashes and dots, \
            and must start and end with a letter or a digit",
            name
        ));
    }

    Ok(())
}

/// Validates a path (prefix or object key) inside of a bucket: it must not start with a slash nor
/// contain empty, `.` or `..` components. A single trailing slash is allowed and the empty path is
/// valid.
pub(crate) fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Ok(());
    }

    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() || trimmed.split('/').any(|c| c.is_empty() || c == "." || c == "..") {
        return Err(format!(
            "path {:?} contains empty, \".\" or \"..\" components",
            path
        ));
    }

    Ok(())
}

/// Returns the non empty components of a slash separated path.
pub(crate) fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}
