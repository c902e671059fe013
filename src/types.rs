//! Descriptor types returned by gateway operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Key path separator; keys ending in it are logical folder markers
pub const PREFIX_DELIMITER: char = '/';

/// Immutable snapshot of a bucket as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDescriptor {
    /// Bucket name
    pub name: String,

    /// Creation timestamp, when the transport reports one
    pub created_at: Option<DateTime<Utc>>,
}

/// Immutable snapshot of a stored object (or folder marker) in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    /// Full object key within its bucket
    pub key: String,

    /// Last modification timestamp
    pub last_modified: Option<DateTime<Utc>>,

    /// Transport checksum (ETag), quotes stripped
    pub checksum: Option<String>,

    /// Object size in bytes
    pub size_bytes: u64,

    /// A key ending in the path separator is a folder marker, not a stored
    /// payload; the flag mirrors the transport verbatim — the gateway never
    /// synthesizes folders.
    pub is_prefix_marker: bool,
}

impl ObjectDescriptor {
    /// Base name of the key (the part after the last separator)
    pub fn base_name(&self) -> &str {
        self.key
            .trim_end_matches(PREFIX_DELIMITER)
            .rsplit(PREFIX_DELIMITER)
            .next()
            .unwrap_or(&self.key)
    }
}

/// Convert a transport timestamp into a UTC timestamp
pub(crate) fn timestamp_from_transport(
    dt: &aws_sdk_s3::primitives::DateTime,
) -> Option<DateTime<Utc>> {
    SystemTime::try_from(*dt).ok().map(DateTime::<Utc>::from)
}
