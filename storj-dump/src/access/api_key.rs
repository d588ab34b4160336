//! Macaroon based API keys.

use super::Caveat;
use crate::{crypto, helpers, Error, Result};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version byte of a serialized API key.
const API_KEY_VERSION: u8 = 1;

/// An API key signed by the satellite that issued it.
///
/// It's a macaroon: the `tail` is an HMAC-SHA256 chain that starts signing the `head` with the
/// project's root secret and continues signing every caveat with the previous `tail`. Any holder
/// can append caveats, nobody can remove them without the root secret, and only the satellite,
/// which knows the root secret, can verify the chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Identifies the project that the key belongs to.
    head: Vec<u8>,
    /// The caveats appended to the key, oldest first.
    caveats: Vec<Caveat>,
    /// The signature of the head and all the caveats.
    tail: Vec<u8>,
}

impl ApiKey {
    /// Creates a root API key, the key without any caveat that grants full access to the project
    /// identified by `head`.
    ///
    /// Only satellites call this constructor because it requires the project's root secret.
    pub fn new_root(head: &[u8], secret: &[u8]) -> Self {
        Self {
            head: head.to_vec(),
            caveats: Vec::new(),
            tail: crypto::hmac_sha256(secret, head).to_vec(),
        }
    }

    /// Parses a serialized API key.
    ///
    /// It returns an [`InvalidKeyFormat` error](Error::InvalidKeyFormat) when `serialized` isn't
    /// a well formed key; it doesn't verify its signature.
    pub fn parse(serialized: &str) -> Result<Self> {
        let payload = helpers::decode_token(API_KEY_VERSION, serialized)
            .map_err(Error::InvalidKeyFormat)?;
        let key: Self = bincode::deserialize(&payload)
            .map_err(|e| Error::InvalidKeyFormat(format!("invalid structure: {}", e)))?;

        key.check_structure().map_err(Error::InvalidKeyFormat)?;
        Ok(key)
    }

    /// Serializes the API key such that it can be parsed with [`Self::parse`].
    pub fn serialize(&self) -> Result<String> {
        let payload = bincode::serialize(self)
            .map_err(|e| Error::new_internal("encoding API key", e))?;
        Ok(helpers::encode_token(API_KEY_VERSION, &payload))
    }

    /// Returns the identifier of the project that the key belongs to.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Returns the caveats of the key, oldest first.
    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    /// Returns a new key with `caveat` appended; `self` is left untouched and remains valid.
    ///
    /// A restricted key only allows the intersection of all its caveats.
    pub fn restrict(&self, caveat: Caveat) -> Result<Self> {
        let encoded = encode_caveat(&caveat)?;
        let mut caveats = self.caveats.clone();
        caveats.push(caveat);

        Ok(Self {
            head: self.head.clone(),
            caveats,
            tail: crypto::hmac_sha256(&self.tail, &encoded).to_vec(),
        })
    }

    /// Verifies the signature chain of the key against the project's root secret.
    pub fn verify(&self, secret: &[u8]) -> bool {
        let Some((last, rest)) = self.caveats.split_last() else {
            return crypto::hmac_sha256_verify(secret, &self.head, &self.tail);
        };

        let mut tail = crypto::hmac_sha256(secret, &self.head);
        for caveat in rest {
            match encode_caveat(caveat) {
                Ok(encoded) => tail = crypto::hmac_sha256(&tail, &encoded),
                Err(_) => return false,
            }
        }

        match encode_caveat(last) {
            Ok(encoded) => crypto::hmac_sha256_verify(&tail, &encoded, &self.tail),
            Err(_) => false,
        }
    }

    /// Returns `true` if every caveat of the key allows `action`.
    ///
    /// It doesn't verify the signature, see [`Self::verify`].
    pub fn allows(&self, action: &Action) -> bool {
        self.caveats.iter().all(|c| c.allows(action))
    }

    pub(crate) fn check_structure(&self) -> std::result::Result<(), String> {
        if self.head.is_empty() {
            return Err(String::from("missing head"));
        }

        if self.tail.len() != crypto::KEY_LEN {
            return Err(format!(
                "signature of {} bytes, expected {}",
                self.tail.len(),
                crypto::KEY_LEN
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("head", &hex::encode(&self.head))
            .field("caveats", &self.caveats)
            .finish_non_exhaustive()
    }
}

/// The kind of operation that an [`Action`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Downloads objects' data.
    Read,
    /// Creates buckets and uploads objects.
    Write,
    /// Deletes buckets and objects.
    Delete,
    /// Looks up bucket information. Caveats only restrict it by bucket.
    Stat,
}

/// An operation that a satellite checks against an API key before performing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action<'a> {
    /// What the action does.
    pub operation: Operation,
    /// The bucket where the action happens.
    pub bucket: &'a str,
    /// The object key where the action happens; empty for bucket level actions.
    pub key: &'a str,
}

impl<'a> Action<'a> {
    /// Creates a new action.
    pub fn new(operation: Operation, bucket: &'a str, key: &'a str) -> Self {
        Self {
            operation,
            bucket,
            key,
        }
    }
}

fn encode_caveat(caveat: &Caveat) -> Result<Vec<u8>> {
    bincode::serialize(caveat).map_err(|e| Error::new_internal("encoding caveat", e))
}

#[cfg(test)]
mod test {
    use super::*;

    const SECRET: &[u8] = b"project root secret";

    fn root() -> ApiKey {
        ApiKey::new_root(b"project-1", SECRET)
    }

    #[test]
    fn test_root_key_verify() {
        let key = root();
        assert!(key.verify(SECRET), "verify with the root secret");
        assert!(!key.verify(b"another secret"), "verify with another secret");
        assert!(
            key.allows(&Action::new(Operation::Delete, "any", "thing")),
            "root key allows everything"
        );
    }

    #[test]
    fn test_restrict() {
        let key = root();
        let restricted = key
            .restrict(Caveat {
                disallow_writes: true,
                ..Caveat::default()
            })
            .expect("restrict");

        assert!(restricted.verify(SECRET), "restricted key verifies");
        assert!(key.caveats().is_empty(), "original key untouched");
        assert_eq!(restricted.caveats().len(), 1, "caveats");
        assert!(!restricted.allows(&Action::new(Operation::Write, "backups", "a")));
        assert!(restricted.allows(&Action::new(Operation::Read, "backups", "a")));

        let narrower = restricted
            .restrict(Caveat::for_path("backups", "uploads/"))
            .expect("restrict again");
        assert!(narrower.verify(SECRET), "twice restricted key verifies");
        assert!(!narrower.allows(&Action::new(Operation::Read, "other", "uploads/a")));
        assert!(narrower.allows(&Action::new(Operation::Read, "backups", "uploads/a")));
    }

    #[test]
    fn test_removing_caveats_breaks_the_signature() {
        let restricted = root()
            .restrict(Caveat {
                disallow_deletes: true,
                ..Caveat::default()
            })
            .expect("restrict");

        let mut forged = restricted.clone();
        forged.caveats.clear();
        assert!(!forged.verify(SECRET), "caveat removed");

        let mut forged = restricted;
        forged.caveats[0].disallow_deletes = false;
        assert!(!forged.verify(SECRET), "caveat altered");
    }

    #[test]
    fn test_serialize_parse() {
        let key = root()
            .restrict(Caveat::for_path("backups", "uploads/"))
            .expect("restrict");
        let serialized = key.serialize().expect("serialize");

        let parsed = ApiKey::parse(&serialized).expect("parse");
        assert_eq!(parsed, key, "parsed key");
        assert!(parsed.verify(SECRET), "parsed key verifies");
    }

    #[test]
    fn test_parse_invalid() {
        for serialized in ["", "definitely not a key", "AAAAAAAAAAAA"] {
            match ApiKey::parse(serialized).expect_err(serialized) {
                Error::InvalidKeyFormat(_) => {}
                err => panic!("expected an invalid key format error, got {}", err),
            }
        }

        // A well formed token whose payload isn't an API key.
        let token = helpers::encode_token(API_KEY_VERSION, b"\x01\x02");
        match ApiKey::parse(&token).expect_err("payload isn't a key") {
            Error::InvalidKeyFormat(msg) => assert!(msg.starts_with("invalid structure")),
            err => panic!("expected an invalid key format error, got {}", err),
        }
    }

    #[test]
    fn test_debug_hides_the_signature() {
        let debug = format!("{:?}", root());
        assert!(debug.contains(&hex::encode(b"project-1")), "{}", debug);
        assert!(!debug.contains("tail"), "{}", debug);
    }
}
