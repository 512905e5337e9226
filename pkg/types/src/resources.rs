//! `ResourceList` arithmetic.
//!
//! A missing key is treated as zero by every arithmetic operation. Callers that
//! need to know whether a resource is tracked at all must look at the key set.

use std::collections::{BTreeMap, BTreeSet};

use crate::quantity::Quantity;

pub type ResourceName = String;

/// Mapping of resource name to quantity, e.g. `requests.cpu -> 2`.
pub type ResourceList = BTreeMap<ResourceName, Quantity>;

// --- Well-known resource names ---

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_GPU: &str = "gpu";
pub const RESOURCE_STORAGE: &str = "storage";
pub const RESOURCE_REQUESTS_CPU: &str = "requests.cpu";
pub const RESOURCE_REQUESTS_MEMORY: &str = "requests.memory";
pub const RESOURCE_REQUESTS_GPU: &str = "requests.gpu";
pub const RESOURCE_REQUESTS_STORAGE: &str = "requests.storage";
pub const RESOURCE_LIMITS_CPU: &str = "limits.cpu";
pub const RESOURCE_LIMITS_MEMORY: &str = "limits.memory";

/// Object-count resource name, e.g. `count/machines.compute`.
pub fn object_count_name(group: &str, resource: &str) -> ResourceName {
    if group.is_empty() {
        format!("count/{}", resource)
    } else {
        format!("count/{}.{}", resource, group)
    }
}

/// Build a list from `(name, quantity)` string pairs. Panics on bad quantities,
/// so it is meant for literals.
pub fn resource_list(pairs: &[(&str, &str)]) -> ResourceList {
    pairs
        .iter()
        .map(|(name, qty)| {
            let qty = Quantity::parse(qty)
                .unwrap_or_else(|e| panic!("invalid literal quantity for {}: {}", name, e));
            (name.to_string(), qty)
        })
        .collect()
}

/// Union of keys with quantities summed.
pub fn add(a: &ResourceList, b: &ResourceList) -> ResourceList {
    let mut result = a.clone();
    for (name, qty) in b {
        let entry = result.entry(name.clone()).or_insert_with(Quantity::zero);
        *entry = *entry + *qty;
    }
    result
}

/// `a - b` over the union of keys. Keys only in `b` come out negative.
pub fn subtract(a: &ResourceList, b: &ResourceList) -> ResourceList {
    let mut result = a.clone();
    for (name, qty) in b {
        let entry = result.entry(name.clone()).or_insert_with(Quantity::zero);
        *entry = *entry - *qty;
    }
    result
}

/// `a - b`, with every negative result clamped to exactly zero.
pub fn subtract_non_negative(a: &ResourceList, b: &ResourceList) -> ResourceList {
    subtract(a, b)
        .into_iter()
        .map(|(name, qty)| {
            if qty.is_negative() {
                (name, Quantity::zero())
            } else {
                (name, qty)
            }
        })
        .collect()
}

/// Projection of `list` onto `names`.
pub fn mask(list: &ResourceList, names: &BTreeSet<ResourceName>) -> ResourceList {
    list.iter()
        .filter(|(name, _)| names.contains(*name))
        .map(|(name, qty)| (name.clone(), *qty))
        .collect()
}

/// Same key set and numerically equal quantities.
pub fn equals(a: &ResourceList, b: &ResourceList) -> bool {
    a.len() == b.len() && a.iter().all(|(name, qty)| b.get(name) == Some(qty))
}

/// Checks `a <= b` for every key of `b`. Returns the keys where `a` is larger.
pub fn less_than_or_equal(a: &ResourceList, b: &ResourceList) -> (bool, Vec<ResourceName>) {
    let zero = Quantity::zero();
    let exceeded: Vec<ResourceName> = b
        .iter()
        .filter(|(name, limit)| a.get(*name).unwrap_or(&zero) > *limit)
        .map(|(name, _)| name.clone())
        .collect();
    (exceeded.is_empty(), exceeded)
}

/// Names whose quantity is below zero.
pub fn is_negative(list: &ResourceList) -> Vec<ResourceName> {
    list.iter()
        .filter(|(_, qty)| qty.is_negative())
        .map(|(name, _)| name.clone())
        .collect()
}

/// Drop every zero-valued entry.
pub fn remove_zeros(list: &ResourceList) -> ResourceList {
    list.iter()
        .filter(|(_, qty)| !qty.is_zero())
        .map(|(name, qty)| (name.clone(), *qty))
        .collect()
}

/// True when every entry is zero (or the list is empty).
pub fn is_zero(list: &ResourceList) -> bool {
    list.values().all(Quantity::is_zero)
}

pub fn resource_names(list: &ResourceList) -> BTreeSet<ResourceName> {
    list.keys().cloned().collect()
}

/// Human-readable `name=qty,name=qty` form used in denial messages.
pub fn pretty_print(list: &ResourceList) -> String {
    list.iter()
        .map(|(name, qty)| format!("{}={}", name, qty))
        .collect::<Vec<_>>()
        .join(",")
}
