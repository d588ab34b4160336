//! Downloading back uploaded objects for diagnostics.

use crate::access::Scope;
use crate::project::{self, Project, Satellite};
use crate::{helpers, object, Error, Result};

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use tempfile::NamedTempFile;

/// Describes a verified object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Number of plaintext bytes of the object.
    pub bytes: u64,
    /// The local file where the plaintext was mirrored, if requested.
    pub mirrored_to: Option<PathBuf>,
}

/// Downloads the object `key` of `bucket` and returns its plaintext.
pub fn read_back<S: Satellite>(
    satellite: &S,
    scope: &Scope,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>> {
    let mut plaintext = Vec::new();
    stream(satellite, scope, bucket, key, &mut plaintext)?;
    Ok(plaintext)
}

/// Downloads the object `key` of `bucket` checking that every frame opens with the object's key.
///
/// When `mirror_dir` is `Some`, the plaintext is also written to the local file returned by
/// [`mirror_path`].
pub fn verify<S: Satellite>(
    satellite: &S,
    scope: &Scope,
    bucket: &str,
    key: &str,
    mirror_dir: Option<&Path>,
) -> Result<Verification> {
    let Some(dir) = mirror_dir else {
        let bytes = stream(satellite, scope, bucket, key, &mut io::sink())?;
        info!("Verified {}/{}: {} bytes", bucket, key, bytes);
        return Ok(Verification {
            bytes,
            mirrored_to: None,
        });
    };

    let path = mirror_path(dir, key);
    let parent = path.parent().unwrap_or(dir);
    fs::create_dir_all(parent)
        .map_err(|e| Error::new_internal("creating mirror directory", e.into()))?;

    // The mirror only appears once the whole object verified.
    let mut staged = NamedTempFile::new_in(parent)
        .map_err(|e| Error::new_internal("creating mirror file", e.into()))?;
    let bytes = stream(satellite, scope, bucket, key, &mut staged)?;
    staged
        .flush()
        .map_err(|e| Error::new_internal("writing mirror file", e.into()))?;
    staged
        .persist(&path)
        .map_err(|e| Error::new_internal("persisting mirror file", e.error.into()))?;

    info!(
        "Verified {}/{}: {} bytes mirrored to {}",
        bucket,
        key,
        bytes,
        path.display()
    );
    Ok(Verification {
        bytes,
        mirrored_to: Some(path),
    })
}

/// Returns the local path where the object `key` is mirrored inside of `dir`.
///
/// The path keeps the last two components of the key, the database and the file name, and
/// replaces the colons of the file name by underscores.
pub fn mirror_path(dir: &Path, key: &str) -> PathBuf {
    let mut components: Vec<&str> = helpers::path_components(key).collect();
    let file_name = components.pop().unwrap_or_default().replace(':', "_");

    match components.pop() {
        Some(database) => dir.join(database).join(file_name),
        None => dir.join(file_name),
    }
}

fn stream<S: Satellite, W: Write>(
    satellite: &S,
    scope: &Scope,
    bucket: &str,
    key: &str,
    out: &mut W,
) -> Result<u64> {
    let object_key = scope
        .encryption_access()
        .key_for(bucket, key)
        .ok_or_else(|| {
            Error::new_invalid_arguments(
                "(bucket,key)",
                "the scope doesn't have an encryption key for the object",
            )
        })?;

    let project =
        project::open_authenticated(satellite, scope.satellite_address(), scope.api_key())?;
    let mut download = io::BufReader::new(project.download_object(bucket, key)?);

    let mut bytes = 0u64;
    while let Some(chunk) = read_next(&mut download, &object_key)? {
        out.write_all(&chunk)
            .map_err(|e| Error::new_internal("writing verified data", e.into()))?;
        bytes += chunk.len() as u64;
    }

    Ok(bytes)
}

fn read_next<R: Read>(
    reader: &mut R,
    key: &crate::EncryptionKey,
) -> Result<Option<Vec<u8>>> {
    object::read_frame(reader, key)
        .map_err(|e| Error::new_internal("reading uploaded frame", e.into()))
}
