use serde::{Deserialize, Serialize};

use crate::resources::ResourceList;

/// API group of compute kinds.
pub const COMPUTE_GROUP: &str = "compute";
/// Kind of a virtual machine instance.
pub const MACHINE_KIND: &str = "Machine";
/// Plural resource name used in object-count quotas.
pub const MACHINE_RESOURCE: &str = "machines";

// --- Resource requirements ---

/// Requested and maximum resources of a machine, keyed by `cpu`, `memory`, `gpu`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
}

// --- Machine spec ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MachineSpec {
    /// Machine class (instance type family), e.g. "general", "gpu-large".
    #[serde(default)]
    pub class: Option<String>,
    /// Spot/preemptible capacity that the provider may reclaim.
    #[serde(default)]
    pub preemptible: bool,
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Image the machine boots from.
    #[serde(default)]
    pub image: String,
}
