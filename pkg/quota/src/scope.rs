//! Scope matching shared by evaluators.

use pkg_types::object::DynamicObject;
use pkg_types::quota::{ResourceQuota, ScopeOperator, ScopeRequirement};

use crate::error::QuotaError;
use crate::evaluator::Evaluator;

/// Match an optional string attribute (such as a class name) against a requirement.
pub fn matches_value(requirement: &ScopeRequirement, value: Option<&str>) -> bool {
    let listed = value.is_some_and(|v| requirement.values.iter().any(|x| x == v));
    match requirement.operator {
        ScopeOperator::In => listed,
        ScopeOperator::NotIn => !listed,
        ScopeOperator::Exists => value.is_some(),
        ScopeOperator::DoesNotExist => value.is_none(),
    }
}

/// Match a boolean attribute. Only `Exists`/`DoesNotExist` make sense here.
pub fn matches_flag(requirement: &ScopeRequirement, flag: bool) -> Result<bool, QuotaError> {
    match requirement.operator {
        ScopeOperator::Exists => Ok(flag),
        ScopeOperator::DoesNotExist => Ok(!flag),
        op => Err(QuotaError::ScopeMatch {
            scope: requirement.scope_name,
            message: format!("operator {:?} is not supported", op),
        }),
    }
}

/// True when `object` satisfies every scope requirement of `quota`.
/// A quota without requirements matches everything.
pub fn quota_matches(
    evaluator: &dyn Evaluator,
    object: &DynamicObject,
    quota: &ResourceQuota,
) -> Result<bool, QuotaError> {
    for requirement in quota.scope_requirements() {
        if !evaluator.matches_scope_requirement(object, &requirement)? {
            return Ok(false);
        }
    }
    Ok(true)
}
