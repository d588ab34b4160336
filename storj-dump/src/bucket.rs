//! Storj DCS Bucket.

use std::time::Duration;

/// Contains information about a specific bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Name of the bucket.
    pub name: String,
    /// Unix Epoch time when the bucket was created.
    pub created_at: Duration,
}

impl Bucket {
    /// Creates a bucket created now.
    pub(crate) fn created_now(name: &str) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            name: String::from(name),
            created_at: Duration::from_secs(created_at.as_secs()),
        }
    }
}
