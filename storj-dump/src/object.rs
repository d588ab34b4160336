//! Storj DCS Object naming, the sealed frame format of uploaded objects and their upload and
//! verification.

pub mod upload;
pub mod verify;

use crate::encryption_key::EncryptionKey;
use crate::{crypto, Error, Result};

use std::io::{self, Read};

use chrono::NaiveDateTime;

/// Format of the timestamp embedded in dump object keys; it sorts chronologically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// Size of the length header of every frame.
const FRAME_HEADER_LEN: usize = 4;

/// Largest length that a frame header can declare: a full chunk with its nonce and tag.
const MAX_SEALED_LEN: usize = upload::CHUNK_SIZE + crypto::NONCE_LEN + crypto::TAG_LEN;

/// Returns `prefix` with a trailing slash, appending one when it's missing.
///
/// It's idempotent and the empty prefix, which refers to the root of a bucket, remains empty.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        String::from(prefix)
    } else {
        format!("{}/", prefix)
    }
}

/// Returns the key of a dump of `database` taken at `timestamp`, relative to the upload path.
///
/// Two dumps of the same database taken within the same second get the same key.
pub fn dump_object_key(database: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}/mysqldump_{}.sql",
        database,
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Returns the full object key of a dump of `database` taken at `timestamp` under the upload path
/// `prefix`.
pub fn destination(prefix: &str, database: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{}{}",
        normalize_prefix(prefix),
        dump_object_key(database, timestamp)
    )
}

/// Seals `chunk` into a frame:
///
/// ```text
/// [ length (u32 BE) ][ nonce (12 bytes) ][ ciphertext ][ GCM tag (16 bytes) ]
/// ```
///
/// The length counts the bytes that follow the header.
pub(crate) fn seal_frame(key: &EncryptionKey, chunk: &[u8]) -> Result<Vec<u8>> {
    let sealed = crypto::seal(key.as_bytes(), chunk)?;
    let len = u32::try_from(sealed.len())
        .map_err(|e| Error::new_internal("framing sealed chunk", e.into()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + sealed.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&sealed);
    Ok(frame)
}

/// Reads and opens the next frame of `reader`.
///
/// It returns `None` when `reader` ends right at a frame boundary; ending in the middle of a frame
/// is an [`io::ErrorKind::UnexpectedEof`] error.
pub(crate) fn read_frame<R: Read>(
    reader: &mut R,
    key: &EncryptionKey,
) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len < crypto::NONCE_LEN + crypto::TAG_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes is shorter than its nonce and tag", len),
        ));
    }

    if len > MAX_SEALED_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds {} bytes", len, MAX_SEALED_LEN),
        ));
    }

    let mut sealed = vec![0u8; len];
    reader.read_exact(&mut sealed)?;
    crypto::open(key.as_bytes(), &sealed)
        .map(Some)
        .map_err(Error::into_io)
}
