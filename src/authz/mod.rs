//! Role-based access control.
//!
//! Permissions are `resource:action` strings granted to roles. An endpoint
//! lists the permissions that may satisfy it; holding any one of them is
//! enough (any-of semantics). A super admin bypasses the check entirely.
//!
//! The decision is a pure function of the caller's flags, the role's current
//! granted set, and the required set. Grants are re-read from the store on
//! every call, so a grant change takes effect on the very next request.

use anyhow::Result;
use std::collections::HashSet;

use crate::store::{AdminIdentity, CredentialStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied,
}

/// Pure any-of decision. An empty `required` set means "authenticated only".
#[must_use]
pub fn decide(
    is_super_admin: bool,
    granted: &HashSet<String>,
    required: &[&str],
) -> AccessDecision {
    if is_super_admin || required.is_empty() {
        return AccessDecision::Allowed;
    }
    if required.iter().any(|needed| granted.contains(*needed)) {
        AccessDecision::Allowed
    } else {
        AccessDecision::Denied
    }
}

/// Resolve the caller's current grants and decide.
///
/// An identity without a role resolves to the empty grant set, which only an
/// empty `required` set (or the super-admin flag) can satisfy.
///
/// # Errors
/// Returns an error when the grant lookup fails; callers deny on error.
pub async fn authorize(
    store: &dyn CredentialStore,
    identity: &AdminIdentity,
    required: &[&str],
) -> Result<AccessDecision> {
    if identity.is_super_admin || required.is_empty() {
        return Ok(AccessDecision::Allowed);
    }
    let granted = match identity.role_id {
        Some(role_id) => store.role_permissions(role_id).await?,
        None => HashSet::new(),
    };
    Ok(decide(identity.is_super_admin, &granted, required))
}
