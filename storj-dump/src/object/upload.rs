//! Streaming uploads of byte sources of unknown length.

use crate::access::Scope;
use crate::project::{self, Project, Satellite, Upload};
use crate::source::ByteSource;
use crate::{helpers, object, Bucket, Error, Result};

use std::io::{self, Write};

use log::{debug, info, trace};

/// Size of the buffer that receives every chunk read from a source.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Describes a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// The bucket where the object was uploaded.
    pub bucket: String,
    /// The key of the uploaded object.
    pub key: String,
    /// Number of bytes read from the source, i.e. the plaintext size of the object.
    pub bytes: u64,
    /// Number of non-empty chunks read from the source, one sealed frame each.
    pub chunks: u64,
}

/// Uploads byte sources as single objects with the authority of a scope.
pub struct StreamingUploader<'a, S> {
    satellite: &'a S,
}

impl<'a, S: Satellite> StreamingUploader<'a, S> {
    /// Creates an uploader that stores objects through `satellite`.
    pub fn new(satellite: &'a S) -> Self {
        Self { satellite }
    }

    /// Drains `source` into the object `key` of `bucket`.
    ///
    /// The bucket is created when it doesn't exist. The source is read into a buffer of
    /// [`CHUNK_SIZE`] bytes until it reports that no more data is pending; short chunks don't stop
    /// the upload. Every non-empty chunk is sealed with the object's key derived from the scope's
    /// encryption access and written as a frame.
    ///
    /// Errors:
    /// * [`Error::BucketUnavailable`] when the bucket can't be opened nor created.
    /// * [`Error::SourceRead`] when the source fails; the error is the source's one.
    /// * [`Error::Upload`] when the key is invalid, the scope doesn't cover the object or the
    ///   storage fails; uploads dropped before their commit are discarded.
    pub fn upload<B: ByteSource>(
        &self,
        scope: &Scope,
        bucket: &str,
        key: &str,
        mut source: B,
    ) -> Result<Summary> {
        let bucket = helpers::non_empty_fn_arg("bucket", bucket)?;
        let key = helpers::non_empty_fn_arg("key", key)?;
        project::check_object_key(key).map_err(|e| Error::new_upload(key, e))?;

        let object_key = scope.encryption_access().key_for(bucket, key).ok_or_else(|| {
            Error::new_upload(
                key,
                format!("the scope doesn't have an encryption key for {}/{}", bucket, key),
            )
        })?;

        let project = project::open_authenticated(
            self.satellite,
            scope.satellite_address(),
            scope.api_key(),
        )?;
        open_bucket(&project, bucket)?;

        info!("Uploading {}/{}", bucket, key);
        let mut upload = project
            .upload_object(bucket, key)
            .map_err(|e| Error::new_upload(key, e))?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut bytes = 0u64;
        let mut chunks = 0u64;
        loop {
            let chunk = source.read_chunk(&mut buf).map_err(Error::SourceRead)?;
            if chunk.bytes_read > buf.len() {
                return Err(Error::SourceRead(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "source reported {} bytes read into a buffer of {}",
                        chunk.bytes_read,
                        buf.len()
                    ),
                )));
            }

            if chunk.bytes_read > 0 {
                let frame = object::seal_frame(&object_key, &buf[..chunk.bytes_read])
                    .map_err(|e| Error::new_upload(key, e))?;
                upload
                    .write_all(&frame)
                    .map_err(|e| Error::new_upload(key, e))?;

                bytes += chunk.bytes_read as u64;
                chunks += 1;
                trace!("Wrote chunk {} of {} bytes", chunks, chunk.bytes_read);
            }

            if !chunk.more_data_pending {
                break;
            }
        }

        upload.commit().map_err(|e| Error::new_upload(key, e))?;
        debug!("Committed {} chunks", chunks);
        info!("Uploaded {} bytes to {}/{}", bytes, bucket, key);

        Ok(Summary {
            bucket: String::from(bucket),
            key: String::from(key),
            bytes,
            chunks,
        })
    }
}

/// Opens `bucket` creating it if it doesn't exist.
///
/// The bucket is created at most once and opened again at most once; any other failure is a
/// [`BucketUnavailable` error](Error::BucketUnavailable).
pub(crate) fn open_bucket<P: Project>(project: &P, bucket: &str) -> Result<Bucket> {
    info!("Opening bucket {}", bucket);
    match project.stat_bucket(bucket) {
        Ok(info) => return Ok(info),
        Err(e) if e.is_bucket_not_found() => {}
        Err(e) => return Err(unavailable(bucket, e)),
    }

    info!("Bucket {} doesn't exist, creating it", bucket);
    project
        .create_bucket(bucket)
        .map_err(|e| unavailable(bucket, e))?;
    project
        .stat_bucket(bucket)
        .map_err(|e| unavailable(bucket, e))
}

fn unavailable(bucket: &str, cause: Error) -> Error {
    Error::BucketUnavailable {
        bucket: String::from(bucket),
        cause: Box::new(cause),
    }
}
