use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;

/// API group of storage kinds.
pub const STORAGE_GROUP: &str = "storage";
/// Kind of a block volume.
pub const VOLUME_KIND: &str = "Volume";
/// Plural resource name used in object-count quotas.
pub const VOLUME_RESOURCE: &str = "volumes";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

/// Block volume, a request for persistent storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeSpec {
    /// Storage class name (e.g. "standard", "fast-ssd")
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub access_modes: Vec<AccessMode>,
    /// Requested capacity
    pub size: Quantity,
}
