//! Permission aggregation: merging raw grants into one bitmask per resource.

use tracing::error;
use uuid::Uuid;

use crate::auth::model::PermissionEntry;
use crate::auth::repository::PermissionGrantRepository;

/// Collapse a sequence of grants sorted by `resource_id` into at most one
/// entry per resource, unioning bitmasks. Linear in the grant count; no map.
#[must_use]
pub fn merge_sorted_grants(entries: Vec<PermissionEntry>) -> Vec<PermissionEntry> {
    let mut merged: Vec<PermissionEntry> = Vec::with_capacity(entries.len());
    let mut pending: Option<PermissionEntry> = None;
    for entry in entries {
        match pending {
            None => pending = Some(entry),
            Some(ref mut current) => {
                if current.resource_id == entry.resource_id {
                    current.permissions = current.permissions.unify_with(entry.permissions);
                } else {
                    // Flush the finished resource and start collecting the next.
                    merged.push(std::mem::replace(current, entry));
                }
            }
        }
    }
    if let Some(current) = pending {
        merged.push(current);
    }
    merged
}

/// Resolves the consolidated permission list for an authenticated caller.
pub struct PermissionAggregator<'a, S> {
    store: &'a S,
}

impl<'a, S: PermissionGrantRepository> PermissionAggregator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// One entry per resource for the caller.
    ///
    /// With a pinned role (API key override, role claim) the role's grants
    /// are returned verbatim; a role has at most one grant per resource by
    /// construction. Otherwise grants from every role the user holds across
    /// the global tenant and `tenant_id` are merged.
    ///
    /// Any storage failure degrades to an empty list (fail-closed): a
    /// transient read error must never widen access.
    pub async fn effective_permissions(
        &self,
        user_ref: Uuid,
        user_id: &str,
        tenant_id: &str,
        role_restriction: Option<Uuid>,
    ) -> Vec<PermissionEntry> {
        let result = match role_restriction {
            Some(role_ref) => self.store.grants_for_role(role_ref).await,
            None => self
                .store
                .grants_for_user(user_ref, tenant_id)
                .await
                .map(merge_sorted_grants),
        };
        match result {
            Ok(entries) => entries,
            Err(err) => {
                error!(
                    "Failed to read permissions for userId {} in tenant {}: {err}",
                    user_id, tenant_id
                );
                Vec::new()
            }
        }
    }
}
