//! Storj DCS Project and the satellite seam that storage backends implement.
//!
//! A [`Satellite`] authenticates API keys and opens [`Project`] sessions. A project session gives
//! access to buckets and objects. Every handle releases its resources when it drops, hence a
//! session opened on any exit path is always closed.

pub mod local;
pub mod memory;

use crate::access::{Action, ApiKey, Operation};
use crate::error::Network;
use crate::{crypto, helpers, Bucket, Error, Result};

use std::io;

/// A service that authenticates API keys and holds the metadata of the projects.
pub trait Satellite {
    /// The project session type that this satellite opens.
    type Project: Project;

    /// Opens a project session authenticated with `api_key`.
    ///
    /// It returns a [`Network::Unauthenticated`] error when `address` isn't the address of this
    /// satellite, `api_key` doesn't belong to any of its projects or its signature isn't valid.
    fn open_project(&self, address: &str, api_key: &ApiKey) -> Result<Self::Project>;
}

/// Provides access to manage buckets and objects of a project.
///
/// The session closes when the instance drops.
pub trait Project {
    /// The upload type returned by [`Self::upload_object`].
    type Upload: Upload;
    /// The download type returned by [`Self::download_object`].
    type Download: io::Read;

    /// Returns the salt that the project uses for deriving encryption keys from passphrases.
    fn salt(&self) -> Result<Vec<u8>>;

    /// Returns the bucket's information.
    fn stat_bucket(&self, bucket: &str) -> Result<Bucket>;

    /// Creates a new bucket.
    ///
    /// It returns the bucket information and `true` when it's created or `false` if it already
    /// existed.
    fn create_bucket(&self, bucket: &str) -> Result<(Bucket, bool)>;

    /// Starts an object upload into `bucket` with the specified `key`.
    fn upload_object(&self, bucket: &str, key: &str) -> Result<Self::Upload>;

    /// Starts a download of the object inside of `bucket` and referenced with `key`.
    fn download_object(&self, bucket: &str, key: &str) -> Result<Self::Download>;
}

/// An object upload in progress.
///
/// The data written through [`io::Write`] only becomes visible once [`Self::commit`] succeeds;
/// an upload that drops without being committed is discarded.
pub trait Upload: io::Write {
    /// Commits the uploaded data to the object.
    ///
    /// It returns a [`Network::UploadDone`] error when the upload was already committed.
    fn commit(&mut self) -> Result<()>;
}

/// Opens a project session translating an authentication rejection of the satellite into an
/// [`AuthenticationFailed` error](Error::AuthenticationFailed).
pub(crate) fn open_authenticated<S: Satellite>(
    satellite: &S,
    address: &str,
    api_key: &ApiKey,
) -> Result<S::Project> {
    satellite
        .open_project(address, api_key)
        .map_err(|err| match err {
            Error::Network(Network::Unauthenticated(msg)) => Error::AuthenticationFailed(msg),
            err => err,
        })
}

/// Returns the salt of the project identified by `head`.
///
/// The salt is stable for the life of the project so that every client derives the same
/// encryption key from the same passphrase.
pub(crate) fn project_salt(head: &[u8]) -> Vec<u8> {
    crypto::sha256(head).to_vec()
}

/// Checks that the caveats of `api_key` allow `operation` over `bucket` and `key`.
pub(crate) fn authorize(
    api_key: &ApiKey,
    operation: Operation,
    bucket: &str,
    key: &str,
) -> Result<()> {
    if api_key.allows(&Action::new(operation, bucket, key)) {
        return Ok(());
    }

    Err(Network::PermissionDenied(format!(
        "the API key doesn't allow {:?} on {}/{}",
        operation, bucket, key
    ))
    .into())
}

/// Checks that `bucket` is a valid bucket name.
pub(crate) fn check_bucket_name(bucket: &str) -> Result<()> {
    helpers::validate_bucket_name(bucket).map_err(|msg| Network::BucketNameInvalid(msg).into())
}

/// Checks that `key` is a valid object key: non empty, without a trailing slash and without
/// empty, `.` or `..` components.
pub(crate) fn check_object_key(key: &str) -> Result<()> {
    if key.is_empty() || key.ends_with('/') {
        return Err(Network::ObjectKeyInvalid(format!(
            "object key {:?} must be non empty and not end with a slash",
            key
        ))
        .into());
    }

    helpers::validate_path(key).map_err(|msg| Network::ObjectKeyInvalid(msg).into())
}
