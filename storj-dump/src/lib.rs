//! Capability-scoped streaming uploads of database dumps to Storj-style object storage.
//!
//! A dump is uploaded with the authority of a [scope](access::Scope): the satellite address, a
//! macaroon API key and the encryption access needed for encrypting the object. Scopes are
//! derived from a root API key and a passphrase, optionally restricted and serialized into tokens
//! that can be reused or handed out.
//!
//! The [`pipeline::Pipeline`] wires a [`config::StorjConfig`] to the
//! [`access::ScopeFactory`] and the [`object::upload::StreamingUploader`], which drains a
//! [`source::ByteSource`] of unknown length into a single object.
//!
//! Satellites are abstracted by the [`project::Satellite`] trait. This crate ships an in-memory
//! implementation and one backed by a local directory.

#![deny(missing_docs)]

pub(crate) mod crypto;
pub(crate) mod encryption_key;
pub(crate) mod error;
pub(crate) mod helpers;

pub mod access;
pub mod bucket;
pub mod config;
pub mod object;
pub mod pipeline;
pub mod project;
pub mod source;

pub use access::{Caveat, Scope, ScopeFactory};
pub use bucket::Bucket;
pub use encryption_key::EncryptionKey;
pub use error::{Args, Error, Internal, Network};
pub use pipeline::{Pipeline, PipelineError};

/// A specialized [`Result`](https://doc.rust-lang.org/std/result/enum.Result.html)
/// type for the operations of this crate.
///
/// This type is broadly used across this crate for any operations which may
/// produce an error.
///
/// This type is generally used to avoid writing out `storj_dump::Error`
/// directly and reduce repetition making the signature functions more concise.
pub type Result<T> = std::result::Result<T, error::Error>;
