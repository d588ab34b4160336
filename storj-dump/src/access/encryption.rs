//! Encryption access: the key material that a scope carries for encrypting objects.

use crate::encryption_key::EncryptionKey;
use crate::{helpers, object, Error, Result};

use serde::{Deserialize, Serialize};

/// Holds the keys which encrypt the objects' data of a set of buckets and prefixes.
///
/// The key of an object is derived from a base key walking the bucket name and, one by one, the
/// components of the object key:
///
/// ```text
/// key(bucket, "a/b/c") = HMAC(HMAC(HMAC(HMAC(base, bucket), "a"), "b"), "c")
/// ```
///
/// An unrestricted access has a default base key. A restricted access only stores the key of a
/// bucket and prefix, hence it derives exactly the same object keys as its parent under that
/// prefix and can't derive any other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionAccess {
    default_key: Option<EncryptionKey>,
    store: Vec<StoreEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreEntry {
    bucket: String,
    /// Always empty or ending with a slash.
    prefix: String,
    key: EncryptionKey,
}

impl EncryptionAccess {
    /// Creates an encryption access which uses `key` for every bucket and prefix.
    pub fn with_default_key(key: EncryptionKey) -> Self {
        Self {
            default_key: Some(key),
            store: Vec::new(),
        }
    }

    /// Returns `true` if the access has a default key, i.e. it isn't restricted.
    pub fn has_default_key(&self) -> bool {
        self.default_key.is_some()
    }

    /// Returns `true` if the access cannot derive any key.
    pub fn is_empty(&self) -> bool {
        self.default_key.is_none() && self.store.is_empty()
    }

    /// Returns a new access which only contains the key of `prefix` inside of `bucket`.
    ///
    /// `prefix` is normalized to end with a slash; an empty prefix restricts to the whole bucket.
    /// It returns an [`InvalidRestriction` error](Error::InvalidRestriction) when this access
    /// doesn't cover the bucket and prefix.
    pub fn restrict(&self, bucket: &str, prefix: &str) -> Result<Self> {
        let prefix = object::normalize_prefix(prefix);
        let key = self.key_for(bucket, &prefix).ok_or_else(|| {
            Error::InvalidRestriction(format!(
                "the encryption access doesn't cover {}/{}",
                bucket, prefix
            ))
        })?;

        Ok(Self {
            default_key: None,
            store: vec![StoreEntry {
                bucket: String::from(bucket),
                prefix,
                key,
            }],
        })
    }

    /// Returns the key of `path` inside of `bucket` or `None` when the access doesn't cover it.
    ///
    /// The most specific stored prefix wins; the default key is only used when no stored prefix
    /// matches.
    pub fn key_for(&self, bucket: &str, path: &str) -> Option<EncryptionKey> {
        let entry = self
            .store
            .iter()
            .filter(|e| e.bucket == bucket && path.starts_with(&e.prefix))
            .max_by_key(|e| e.prefix.len());

        match entry {
            Some(e) => Some(derive_path(&e.key, &path[e.prefix.len()..])),
            None => self
                .default_key
                .as_ref()
                .map(|k| derive_path(&k.derive_child(bucket), path)),
        }
    }
}

fn derive_path(base: &EncryptionKey, path: &str) -> EncryptionKey {
    helpers::path_components(path).fold(base.clone(), |key, component| {
        key.derive_child(component)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn access() -> EncryptionAccess {
        EncryptionAccess::with_default_key(
            EncryptionKey::derive("Rust test", &[0]).expect("derive encryption key"),
        )
    }

    #[test]
    fn test_restricted_derives_the_same_keys() {
        let full = access();
        let restricted = full.restrict("backups", "uploads").expect("restrict");

        assert!(!restricted.has_default_key(), "restricted default key");
        assert_eq!(
            full.key_for("backups", "uploads/testdb/dump.sql"),
            restricted.key_for("backups", "uploads/testdb/dump.sql"),
            "object key under the prefix"
        );

        let narrower = restricted
            .restrict("backups", "uploads/testdb/")
            .expect("restrict a restricted access");
        assert_eq!(
            full.key_for("backups", "uploads/testdb/dump.sql"),
            narrower.key_for("backups", "uploads/testdb/dump.sql"),
            "object key under the narrower prefix"
        );
    }

    #[test]
    fn test_restricted_does_not_cover_other_paths() {
        let restricted = access().restrict("backups", "uploads/").expect("restrict");

        assert!(restricted.key_for("other", "uploads/dump.sql").is_none());
        assert!(restricted.key_for("backups", "private/dump.sql").is_none());
        assert!(restricted.key_for("backups", "uploads-old/dump.sql").is_none());

        match restricted
            .restrict("backups", "private/")
            .expect_err("restrict outside of the prefix")
        {
            Error::InvalidRestriction(_) => {}
            err => panic!("expected an invalid restriction error, got {}", err),
        }
    }

    #[test]
    fn test_keys_are_path_specific() {
        let full = access();
        assert_ne!(
            full.key_for("backups", "a/dump.sql"),
            full.key_for("backups", "b/dump.sql"),
            "different paths"
        );
        assert_ne!(
            full.key_for("backups", "a/dump.sql"),
            full.key_for("uploads", "a/dump.sql"),
            "different buckets"
        );
    }

    #[test]
    fn test_whole_bucket_restriction() {
        let full = access();
        let restricted = full.restrict("backups", "").expect("restrict");

        assert_eq!(
            full.key_for("backups", "any/where.sql"),
            restricted.key_for("backups", "any/where.sql"),
        );
        assert!(!restricted.is_empty(), "restricted is empty");
        assert!(EncryptionAccess::default().is_empty(), "default is empty");
    }
}
