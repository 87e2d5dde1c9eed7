//! Tenant visibility: which tenants a user may operate in.

use anyhow::anyhow;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::model::{TenantDescription, User, GLOBAL_TENANT_ID};
use crate::auth::repository::{
    RoleRepository, TenantRepository, UserRepository, UserTenantRoleRepository,
};
use std::collections::BTreeSet;

pub struct TenantVisibilityResolver<'a, S> {
    store: &'a S,
}

impl<'a, S> TenantVisibilityResolver<'a, S>
where
    S: UserRepository + RoleRepository + TenantRepository + UserTenantRoleRepository,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve the set of tenants visible to `user_ref`, in strict priority
    /// order; the first matching branch decides:
    ///
    /// 1. A non-global tenant assignment on the user pins exactly that tenant.
    /// 2. A fixed role pins the role's tenant; a *global* fixed role opens
    ///    all tenants.
    /// 3. Otherwise the user's tenant/role memberships are walked: any
    ///    double-global pair opens all tenants; else the non-global sides
    ///    accumulate. No memberships at all either opens all tenants (the
    ///    wildcard-resource escape hatch) or yields the empty set ("no
    ///    access yet", not an error).
    ///
    /// # Errors
    /// `UserNotFound` for a dangling ref; `Store` when the user or role
    /// points at a tenant that does not exist.
    pub async fn visible_tenants(&self, user_ref: Uuid) -> Result<Vec<TenantDescription>, AuthError> {
        let user = self
            .store
            .user_by_ref(user_ref)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.tenant_id != GLOBAL_TENANT_ID {
            // Single tenant, pinned by the user record.
            let Some(tenant) = self.store.tenant_by_id(&user.tenant_id).await? else {
                error!(
                    "User {} maps to non existent tenant {}",
                    user.user_id, user.tenant_id
                );
                return Err(AuthError::Store(anyhow!(
                    "user {} references missing tenant {}",
                    user.user_id,
                    user.tenant_id
                )));
            };
            debug!(
                "Single possible tenant for userId {} is {} due to the user assignment",
                user.user_id, tenant.tenant_id
            );
            return Ok(vec![tenant]);
        }

        if let Some(role_ref) = user.role_ref {
            return self.tenants_for_fixed_role(&user, role_ref).await;
        }

        self.tenants_from_memberships(&user).await
    }

    async fn tenants_for_fixed_role(
        &self,
        user: &User,
        role_ref: Uuid,
    ) -> Result<Vec<TenantDescription>, AuthError> {
        let Some(role) = self.store.role_by_ref(role_ref).await? else {
            error!("User {} maps to non existent role {role_ref}", user.user_id);
            return Err(AuthError::Store(anyhow!(
                "user {} references missing role {role_ref}",
                user.user_id
            )));
        };
        if role.tenant_id != GLOBAL_TENANT_ID {
            let Some(tenant) = self.store.tenant_by_id(&role.tenant_id).await? else {
                error!(
                    "User {} maps to role {} with non existent tenant {}",
                    user.user_id, role.role_id, role.tenant_id
                );
                return Err(AuthError::Store(anyhow!(
                    "role {} references missing tenant {}",
                    role.role_id,
                    role.tenant_id
                )));
            };
            debug!(
                "Single possible tenant for userId {} is {} due to fixed role {}",
                user.user_id, tenant.tenant_id, role.role_id
            );
            return Ok(vec![tenant]);
        }
        debug!(
            "Access to all tenants for userId {} due to global fixed role {}",
            user.user_id, role.role_id
        );
        Ok(self.store.all_tenants().await?)
    }

    async fn tenants_from_memberships(
        &self,
        user: &User,
    ) -> Result<Vec<TenantDescription>, AuthError> {
        debug!(
            "Obtaining valid tenants for userId {} via tenant/role memberships",
            user.user_id
        );
        let pairs = self.store.tenant_role_pairs(user.user_ref).await?;
        debug!("Found {} tenant/role assignments", pairs.len());

        // Ordered so the result is deterministic; duplicates collapse.
        let mut effective: BTreeSet<String> = BTreeSet::new();
        for pair in &pairs {
            if pair.is_double_global() {
                debug!(
                    "Access to all tenants for userId {} due to unrestricted global assignment",
                    user.user_id
                );
                return Ok(self.store.all_tenants().await?);
            }
            effective.insert(pair.effective_tenant_id().to_string());
        }

        if effective.is_empty() {
            let wildcard = user
                .permissions
                .as_ref()
                .is_some_and(|p| p.resource_is_wildcard);
            if wildcard {
                return Ok(self.store.all_tenants().await?);
            }
            // A user under construction: no roles or tenants assigned yet.
            return Ok(Vec::new());
        }

        let mut tenants = Vec::with_capacity(effective.len());
        for tenant_id in &effective {
            if let Some(tenant) = self.store.tenant_by_id(tenant_id).await? {
                tenants.push(tenant);
            }
        }
        debug!(
            "UserId {} has selective access to {} tenants via role assignments",
            user.user_id,
            tenants.len()
        );
        Ok(tenants)
    }
}
