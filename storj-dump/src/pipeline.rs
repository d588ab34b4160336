//! Uploads a dump with the scope described by a configuration.

use crate::access::ScopeFactory;
use crate::config::{ScopeSource, StorjConfig};
use crate::object::upload::{StreamingUploader, Summary};
use crate::object::verify::{self, Verification};
use crate::project::Satellite;
use crate::source::ByteSource;
use crate::{helpers, object, Error};

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};

/// Options of a [`Pipeline`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Downloads back every uploaded object for verifying it.
    pub debug: bool,
    /// Directory where verified objects are mirrored; only used in debug mode.
    pub mirror_dir: Option<PathBuf>,
}

/// The result of a successful [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The serialized scope to hand out: the restricted one when a restriction was requested, the
    /// full one when a fresh scope was derived without restriction and `None` when a serialized
    /// scope was reused without restriction.
    pub token: Option<String>,
    /// The upload.
    pub upload: Summary,
    /// The verification of the upload, only in debug mode and when it succeeded.
    pub verification: Option<Verification>,
}

/// The error returned by [`Pipeline::run`]; the variant identifies the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration or the arguments are invalid.
    #[error("configuration: {0}")]
    Config(#[source] Error),
    /// The scope couldn't be derived, parsed, restricted or serialized.
    #[error("scope: {0}")]
    Scope(#[source] Error),
    /// The upload failed.
    #[error("upload: {0}")]
    Upload(#[source] Error),
}

impl PipelineError {
    /// Returns the error of the component that failed.
    pub fn kind(&self) -> &Error {
        match self {
            Self::Config(e) | Self::Scope(e) | Self::Upload(e) => e,
        }
    }

    /// Consumes the instance returning the error of the component that failed.
    pub fn into_kind(self) -> Error {
        match self {
            Self::Config(e) | Self::Scope(e) | Self::Upload(e) => e,
        }
    }
}

/// Wires a configuration to the scope factory and the streaming uploader.
pub struct Pipeline<S> {
    satellite: S,
    options: Options,
    clock: Box<dyn Fn() -> NaiveDateTime>,
}

impl<S: Satellite> Pipeline<S> {
    /// Creates a pipeline that uploads through `satellite` naming the objects with the local time.
    pub fn new(satellite: S, options: Options) -> Self {
        Self {
            satellite,
            options,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replaces the source of the timestamps embedded in the object keys.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the satellite of the pipeline.
    pub fn satellite(&self) -> &S {
        &self.satellite
    }

    /// Uploads the dump of `database` read from `source` to the bucket and upload path of
    /// `config`.
    ///
    /// When `config` has derivation inputs a fresh scope is derived, otherwise its serialized scope
    /// is parsed. When `restrict` is `true`, the scope is also restricted with
    /// [`StorjConfig::caveat`] and the restricted one is returned. The transfer always uses the
    /// unrestricted scope. See [`Outcome::token`].
    pub fn run<B: ByteSource>(
        &self,
        config: &StorjConfig,
        source: B,
        database: &str,
        restrict: bool,
    ) -> Result<Outcome, PipelineError> {
        let scope_source = config.validate().map_err(PipelineError::Config)?;
        let database =
            helpers::non_empty_fn_arg("database", database).map_err(PipelineError::Config)?;
        let factory = ScopeFactory::new(&self.satellite);

        let (scope, token) = match scope_source {
            ScopeSource::Reuse(serialized) => {
                info!("Parsing the serialized scope...");
                let scope = factory.parse(&serialized).map_err(PipelineError::Scope)?;

                let token = if restrict {
                    let restricted = factory
                        .restrict(&scope, &config.caveat())
                        .and_then(|s| factory.serialize(&s))
                        .map_err(PipelineError::Scope)?;
                    Some(restricted)
                } else {
                    None
                };
                (scope, token)
            }
            ScopeSource::Derive {
                satellite,
                api_key,
                passphrase,
            } => {
                let caveat = config.caveat();
                let issued = factory
                    .issue(
                        &satellite,
                        &api_key,
                        &passphrase,
                        restrict.then_some(&caveat),
                    )
                    .map_err(PipelineError::Scope)?;
                debug!(
                    "Derived scope for satellite {} (restricted: {})",
                    satellite,
                    issued.restricted().is_some()
                );

                let token = issued.chosen_token().to_owned();
                (issued.into_full(), Some(token))
            }
        };

        let key = object::destination(&config.upload_path, database, (self.clock)());
        info!("File path: {}", key);

        let upload = StreamingUploader::new(&self.satellite)
            .upload(&scope, &config.bucket, &key, source)
            .map_err(PipelineError::Upload)?;

        let verification = if self.options.debug {
            match verify::verify(
                &self.satellite,
                &scope,
                &config.bucket,
                &key,
                self.options.mirror_dir.as_deref(),
            ) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Verification of {}/{} failed: {}", config.bucket, key, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Outcome {
            token,
            upload,
            verification,
        })
    }
}
