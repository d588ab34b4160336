//! Scopes (access capabilities) and the factory that derives, restricts and serializes them.

mod api_key;
mod encryption;

pub use api_key::{Action, ApiKey, Operation};
pub use encryption::EncryptionAccess;

use crate::encryption_key::EncryptionKey;
use crate::project::{self, Project, Satellite};
use crate::{helpers, object, Error, Result};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Version byte of a serialized scope.
const SCOPE_VERSION: u8 = 2;

/// Represents a scope.
///
/// A scope contains everything that is needed for accessing a project and specific buckets: a
/// potentially-restricted API key, a potentially-restricted set of encryption information and the
/// address of the satellite responsible for the project's metadata.
///
/// A scope is immutable; restricting it produces a new one and the original stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    satellite_address: String,
    api_key: ApiKey,
    encryption_access: EncryptionAccess,
}

impl Scope {
    /// Creates a scope from its parts.
    pub fn new(
        satellite_address: &str,
        api_key: ApiKey,
        encryption_access: EncryptionAccess,
    ) -> Self {
        Self {
            satellite_address: String::from(satellite_address),
            api_key,
            encryption_access,
        }
    }

    /// Parses a serialized scope.
    ///
    /// It returns a [`MalformedScopeToken` error](Error::MalformedScopeToken) on any input that
    /// doesn't decode into a satellite address, an API key and an encryption access.
    pub fn parse(serialized: &str) -> Result<Self> {
        let payload = helpers::decode_token(SCOPE_VERSION, serialized)
            .map_err(Error::MalformedScopeToken)?;
        let scope: Self = bincode::deserialize(&payload)
            .map_err(|e| Error::MalformedScopeToken(format!("invalid structure: {}", e)))?;

        if scope.satellite_address.is_empty() {
            return Err(Error::MalformedScopeToken(String::from(
                "missing satellite address",
            )));
        }

        scope
            .api_key
            .check_structure()
            .map_err(|msg| Error::MalformedScopeToken(format!("API key: {}", msg)))?;

        if scope.encryption_access.is_empty() {
            return Err(Error::MalformedScopeToken(String::from(
                "the encryption access doesn't contain any key",
            )));
        }

        Ok(scope)
    }

    /// Serializes the scope such that it can be parsed with [`Self::parse`] or shared with other
    /// tools.
    pub fn serialize(&self) -> Result<String> {
        let payload =
            bincode::serialize(self).map_err(|e| Error::new_internal("encoding scope", e))?;
        Ok(helpers::encode_token(SCOPE_VERSION, &payload))
    }

    /// Returns the satellite address associated with this scope.
    pub fn satellite_address(&self) -> &str {
        &self.satellite_address
    }

    /// Returns the API key of this scope.
    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    /// Returns the encryption access of this scope.
    pub fn encryption_access(&self) -> &EncryptionAccess {
        &self.encryption_access
    }
}

/// Describes how a scope gets restricted.
///
/// The permission flags restrict the API key; `bucket` and `path_prefix` restrict both, the API
/// key and the encryption access. Restrictions only accumulate, a restricted scope can never
/// allow more than its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    /// Disallows downloading objects.
    pub disallow_reads: bool,
    /// Disallows creating buckets and uploading objects.
    pub disallow_writes: bool,
    /// Disallows deleting buckets and objects.
    pub disallow_deletes: bool,
    /// The only bucket allowed. An empty bucket doesn't restrict by path at all, which is only
    /// valid for caveats appended directly to an [`ApiKey`].
    pub bucket: String,
    /// The only path prefix allowed inside of `bucket`; empty for the whole bucket.
    pub path_prefix: String,
}

impl Caveat {
    /// Creates a caveat which only allows `bucket` and `path_prefix` without restricting any
    /// operation.
    pub fn for_path(bucket: &str, path_prefix: &str) -> Self {
        Self {
            bucket: String::from(bucket),
            path_prefix: String::from(path_prefix),
            ..Self::default()
        }
    }

    /// Validates that the caveat can restrict a scope.
    ///
    /// It returns an [`InvalidRestriction` error](Error::InvalidRestriction) if the bucket is
    /// empty or isn't a valid bucket name, or if the path prefix isn't a valid path.
    pub fn validate(&self) -> Result<()> {
        helpers::validate_bucket_name(&self.bucket).map_err(Error::InvalidRestriction)?;
        helpers::validate_path(&self.path_prefix).map_err(Error::InvalidRestriction)
    }

    /// Returns `true` if the caveat allows `action`.
    pub fn allows(&self, action: &Action) -> bool {
        let denied = match action.operation {
            Operation::Read => self.disallow_reads,
            Operation::Write => self.disallow_writes,
            Operation::Delete => self.disallow_deletes,
            Operation::Stat => false,
        };

        if denied {
            return false;
        }

        if self.bucket.is_empty() {
            return true;
        }

        if action.bucket != self.bucket {
            return false;
        }

        // Bucket level actions are allowed in the restricted bucket.
        if action.key.is_empty() {
            return true;
        }

        action
            .key
            .starts_with(&object::normalize_prefix(&self.path_prefix))
    }
}

/// Derives, restricts, serializes and parses scopes.
///
/// Deriving needs an authenticated session with the satellite; the rest of operations are pure.
pub struct ScopeFactory<'a, S> {
    satellite: &'a S,
}

impl<'a, S: Satellite> ScopeFactory<'a, S> {
    /// Creates a factory which derives scopes through `satellite`.
    pub fn new(satellite: &'a S) -> Self {
        Self { satellite }
    }

    /// Derives a full access scope from a root API key and an encryption passphrase.
    ///
    /// It opens a project session for getting the project-based salt, derives the encryption key
    /// from the passphrase and releases the session before returning.
    ///
    /// Errors:
    /// * [`Error::InvalidKeyFormat`] when `api_key` can't be parsed.
    /// * [`Error::AuthenticationFailed`] when the satellite rejects the key or the address.
    /// * [`Error::KeyDerivationFailed`] when the salt can't be retrieved or the passphrase is
    ///   empty.
    pub fn derive(&self, satellite_addr: &str, api_key: &str, passphrase: &str) -> Result<Scope> {
        let satellite_addr = helpers::non_empty_fn_arg("satellite_addr", satellite_addr)?;

        debug!("Parsing the API key...");
        let api_key = ApiKey::parse(api_key)?;

        info!("Opening project on satellite {}", satellite_addr);
        let key = {
            let project = project::open_authenticated(self.satellite, satellite_addr, &api_key)?;

            debug!("Getting encryption key from passphrase...");
            let salt = project
                .salt()
                .map_err(|e| Error::KeyDerivationFailed(format!("project salt: {}", e)))?;
            EncryptionKey::derive(passphrase, &salt)?
        };

        Ok(Scope::new(
            satellite_addr,
            api_key,
            EncryptionAccess::with_default_key(key),
        ))
    }

    /// Restricts `scope` with `caveat` returning a new scope; `scope` is left untouched.
    ///
    /// It returns an [`InvalidRestriction` error](Error::InvalidRestriction) when the caveat
    /// doesn't validate or `scope` doesn't cover the caveat's bucket and prefix.
    pub fn restrict(&self, scope: &Scope, caveat: &Caveat) -> Result<Scope> {
        caveat.validate()?;

        let api_key = scope.api_key.restrict(caveat.clone())?;
        let encryption_access = scope
            .encryption_access
            .restrict(&caveat.bucket, &caveat.path_prefix)?;

        debug!(
            "Restricted scope to {}/{} (reads: {}, writes: {}, deletes: {})",
            caveat.bucket,
            caveat.path_prefix,
            !caveat.disallow_reads,
            !caveat.disallow_writes,
            !caveat.disallow_deletes,
        );

        Ok(Scope::new(&scope.satellite_address, api_key, encryption_access))
    }

    /// Serializes `scope`. See [`Scope::serialize`].
    pub fn serialize(&self, scope: &Scope) -> Result<String> {
        scope.serialize()
    }

    /// Parses a serialized scope. See [`Scope::parse`].
    pub fn parse(&self, serialized: &str) -> Result<Scope> {
        Scope::parse(serialized)
    }

    /// Derives a full access scope and, when `caveat` is `Some`, its restricted variant too.
    ///
    /// Both scopes are serialized so that the caller decides which one to persist or report.
    pub fn issue(
        &self,
        satellite_addr: &str,
        api_key: &str,
        passphrase: &str,
        caveat: Option<&Caveat>,
    ) -> Result<Issued> {
        let full = self.derive(satellite_addr, api_key, passphrase)?;
        let full_token = full.serialize()?;

        let restricted = match caveat {
            Some(caveat) => {
                let scope = self.restrict(&full, caveat)?;
                let token = scope.serialize()?;
                Some((scope, token))
            }
            None => None,
        };

        Ok(Issued {
            full,
            full_token,
            restricted,
        })
    }
}

/// The scopes derived by [`ScopeFactory::issue`].
#[derive(Debug, Clone)]
pub struct Issued {
    full: Scope,
    full_token: String,
    restricted: Option<(Scope, String)>,
}

impl Issued {
    /// Returns the full access scope.
    pub fn full(&self) -> &Scope {
        &self.full
    }

    /// Returns the serialized full access scope.
    pub fn full_token(&self) -> &str {
        &self.full_token
    }

    /// Returns the restricted scope if a caveat was requested.
    pub fn restricted(&self) -> Option<&Scope> {
        self.restricted.as_ref().map(|(scope, _)| scope)
    }

    /// Returns the serialized restricted scope if a caveat was requested.
    pub fn restricted_token(&self) -> Option<&str> {
        self.restricted.as_ref().map(|(_, token)| token.as_str())
    }

    /// Returns the serialized restricted scope when a caveat was requested, otherwise the full
    /// one.
    pub fn chosen_token(&self) -> &str {
        self.restricted_token().unwrap_or(&self.full_token)
    }

    /// Consumes the instance returning the full access scope.
    pub fn into_full(self) -> Scope {
        self.full
    }
}
