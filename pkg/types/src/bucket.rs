use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;

/// Kind of an object-storage bucket (in the storage group).
pub const BUCKET_KIND: &str = "Bucket";
/// Plural resource name used in object-count quotas.
pub const BUCKET_RESOURCE: &str = "buckets";

/// Object-storage bucket. Only a bucket with a size limit consumes storage quota.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BucketSpec {
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub size_limit: Option<Quantity>,
    #[serde(default)]
    pub versioning: bool,
}
