//! Storj upload configuration.

use crate::access::Caveat;
use crate::{Error, Result};

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Defines the configuration of a dump upload, usually read from a `storj_config.json` file.
///
/// The JSON keys are the ones of the configuration files of the `storj-mariadb` tool, e.g.
///
/// ```json
/// {
///     "apikey": "change-me-to-the-api-key-created-in-satellite-gui",
///     "satellite": "us1.storj.io:7777",
///     "bucket": "change-me-to-desired-bucket-name",
///     "uploadPath": "optionalpath/requiredfilename",
///     "encryptionpassphrase": "you'll never guess this",
///     "serializedScope": "change-me-to-the-api-key-created-in-encryption-access-apiKey",
///     "disallowReads": "true/false-to-disallow-reads",
///     "disallowWrites": "true/false-to-disallow-writes",
///     "disallowDeletes": "true/false-to-disallow-deletes"
/// }
/// ```
///
/// The disallow flags accept JSON booleans or the strings accepted by [`parse_flag`]; missing
/// keys default to empty strings and `false`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorjConfig {
    /// The root API key used for deriving a fresh scope.
    #[serde(rename = "apikey")]
    pub api_key: String,
    /// The address of the satellite that handles the project.
    pub satellite: String,
    /// The bucket where the dump is uploaded.
    pub bucket: String,
    /// The path prefix inside of the bucket where the dump is uploaded.
    #[serde(rename = "uploadPath")]
    pub upload_path: String,
    /// The passphrase for deriving the encryption key of a fresh scope.
    #[serde(rename = "encryptionpassphrase")]
    pub encryption_passphrase: String,
    /// A previously serialized scope; it's used when no derivation inputs are set.
    #[serde(rename = "serializedScope")]
    pub serialized_scope: String,
    /// Restricted scopes don't allow downloads.
    #[serde(rename = "disallowReads", deserialize_with = "deserialize_flag")]
    pub disallow_reads: bool,
    /// Restricted scopes don't allow uploads.
    #[serde(rename = "disallowWrites", deserialize_with = "deserialize_flag")]
    pub disallow_writes: bool,
    /// Restricted scopes don't allow deletions.
    #[serde(rename = "disallowDeletes", deserialize_with = "deserialize_flag")]
    pub disallow_deletes: bool,
}

/// Where the scope of an upload comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum ScopeSource {
    /// A fresh scope is derived.
    Derive {
        /// The satellite address.
        satellite: String,
        /// The root API key.
        api_key: String,
        /// The encryption passphrase.
        passphrase: String,
    },
    /// A serialized scope is parsed and reused.
    Reuse(String),
}

impl StorjConfig {
    /// Reads the configuration from the JSON file at `path`.
    ///
    /// It returns a [`Config` error](Error::Config) if the file can't be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;

        Self::from_json(&content)
            .map_err(|e| Error::Config(format!("parsing {}: {}", path.display(), e)))
    }

    /// Parses the configuration from a JSON document.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validates that the configuration has a bucket and either derivation inputs or a serialized
    /// scope, returning where the scope comes from.
    ///
    /// Derivation inputs take precedence over a serialized scope.
    pub fn validate(&self) -> Result<ScopeSource> {
        if self.bucket.is_empty() {
            return Err(Error::Config(String::from("bucket is required")));
        }

        let derive = (
            !self.api_key.is_empty(),
            !self.encryption_passphrase.is_empty(),
        );
        match derive {
            (true, true) => {
                if self.satellite.is_empty() {
                    return Err(Error::Config(String::from(
                        "satellite is required for deriving a scope",
                    )));
                }

                Ok(ScopeSource::Derive {
                    satellite: self.satellite.clone(),
                    api_key: self.api_key.clone(),
                    passphrase: self.encryption_passphrase.clone(),
                })
            }
            (false, false) if !self.serialized_scope.is_empty() => {
                Ok(ScopeSource::Reuse(self.serialized_scope.clone()))
            }
            (false, false) => Err(Error::Config(String::from(
                "either apikey and encryptionpassphrase or serializedScope are required",
            ))),
            _ => Err(Error::Config(String::from(
                "apikey and encryptionpassphrase must be set together",
            ))),
        }
    }

    /// Returns the caveat that restricts a scope to the configured bucket, upload path and
    /// permissions.
    pub fn caveat(&self) -> Caveat {
        Caveat {
            disallow_reads: self.disallow_reads,
            disallow_writes: self.disallow_writes,
            disallow_deletes: self.disallow_deletes,
            bucket: self.bucket.clone(),
            path_prefix: self.upload_path.clone(),
        }
    }
}

impl fmt::Debug for StorjConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorjConfig")
            .field("api_key", &Redacted(&self.api_key))
            .field("satellite", &self.satellite)
            .field("bucket", &self.bucket)
            .field("upload_path", &self.upload_path)
            .field("encryption_passphrase", &Redacted(&self.encryption_passphrase))
            .field("serialized_scope", &Redacted(&self.serialized_scope))
            .field("disallow_reads", &self.disallow_reads)
            .field("disallow_writes", &self.disallow_writes)
            .field("disallow_deletes", &self.disallow_deletes)
            .finish()
    }
}

impl fmt::Debug for ScopeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Derive { satellite, .. } => f
                .debug_struct("Derive")
                .field("satellite", satellite)
                .finish_non_exhaustive(),
            Self::Reuse(_) => f.write_str("Reuse(<redacted>)"),
        }
    }
}

struct Redacted<'a>(&'a str);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("<redacted>")
        }
    }
}

/// Parses a textual flag. The empty string is `false`; otherwise it accepts `1`, `t` and `true`
/// or `0`, `f` and `false`, ignoring case and surrounding whitespaces.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "f" | "false" => Some(false),
        "1" | "t" | "true" => Some(true),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Flag::Bool(b)) => Ok(b),
        Some(Flag::Text(s)) => parse_flag(&s)
            .ok_or_else(|| D::Error::custom(format!("invalid boolean flag {:?}", s))),
    }
}
