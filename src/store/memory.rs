//! In-memory [`AuthStore`] used by the integration tests and for local
//! experimentation. Not a durable store.
//!
//! [`AuthStore`]: crate::auth::repository::AuthStore

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::auth::model::{
    ApiKey, Password, PasswordHash, PermissionEntry, Role, TenantDescription, User, UserStatus,
    UserTenantRole, GLOBAL_TENANT_ID,
};
use crate::auth::repository::{
    ApiKeyRepository, PasswordRepository, PermissionGrantRepository, RoleRepository,
    TenantRepository, TenantRolePair, UserRepository, UserStatusRepository,
    UserTenantRoleRepository,
};

#[derive(Default)]
pub struct MemoryAuthStore {
    users: Mutex<Vec<User>>,
    statuses: Mutex<HashMap<Uuid, UserStatus>>,
    passwords: Mutex<Vec<Password>>,
    roles: Mutex<HashMap<Uuid, Role>>,
    tenants: Mutex<Vec<TenantDescription>>,
    user_tenant_roles: Mutex<Vec<UserTenantRole>>,
    role_grants: Mutex<HashMap<Uuid, Vec<PermissionEntry>>>,
    api_keys: Mutex<HashMap<Uuid, ApiKey>>,
    status_writes: AtomicUsize,
    fail_grant_reads: AtomicBool,
}

impl MemoryAuthStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().expect("users").push(user);
    }

    pub fn add_status(&self, status: UserStatus) {
        self.statuses
            .lock()
            .expect("statuses")
            .insert(status.user_ref, status);
    }

    pub fn add_password(&self, password: Password) {
        self.passwords.lock().expect("passwords").push(password);
    }

    pub fn add_role(&self, role: Role) {
        self.roles
            .lock()
            .expect("roles")
            .insert(role.role_ref, role);
    }

    pub fn add_tenant(&self, tenant: TenantDescription) {
        self.tenants.lock().expect("tenants").push(tenant);
    }

    pub fn assign_role(&self, assignment: UserTenantRole) {
        self.user_tenant_roles
            .lock()
            .expect("assignments")
            .push(assignment);
    }

    pub fn grant(&self, role_ref: Uuid, entry: PermissionEntry) {
        self.role_grants
            .lock()
            .expect("grants")
            .entry(role_ref)
            .or_default()
            .push(entry);
    }

    pub fn add_api_key(&self, key: ApiKey) {
        self.api_keys
            .lock()
            .expect("api keys")
            .insert(key.api_key, key);
    }

    /// Number of status-row writes observed, for asserting the stealth
    /// privacy exception.
    #[must_use]
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Make permission-grant reads fail, for the fail-closed tests.
    pub fn fail_grant_reads(&self, fail: bool) {
        self.fail_grant_reads.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn current_status(&self, user_ref: Uuid) -> Option<UserStatus> {
        self.statuses.lock().expect("statuses").get(&user_ref).cloned()
    }

    #[must_use]
    pub fn password_count(&self, user_ref: Uuid) -> usize {
        self.passwords
            .lock()
            .expect("passwords")
            .iter()
            .filter(|p| p.user_ref == user_ref)
            .count()
    }

    #[must_use]
    pub fn stored_user(&self, user_id: &str) -> Option<User> {
        self.users
            .lock()
            .expect("users")
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned()
    }
}

impl UserRepository for MemoryAuthStore {
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("users")
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    async fn user_by_ref(&self, user_ref: Uuid) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("users")
            .iter()
            .find(|u| u.user_ref == user_ref)
            .cloned())
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .expect("users")
            .iter()
            .find(|u| u.is_active && u.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().expect("users");
        match users.iter_mut().find(|u| u.user_ref == user.user_ref) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        Ok(())
    }
}

impl PasswordRepository for MemoryAuthStore {
    async fn current_password(&self, user_ref: Uuid) -> Result<Option<Password>> {
        let serial = self
            .statuses
            .lock()
            .expect("statuses")
            .get(&user_ref)
            .map(|s| s.current_password_serial);
        let Some(serial) = serial else {
            return Ok(None);
        };
        self.password_by_serial(user_ref, serial).await
    }

    async fn password_by_serial(&self, user_ref: Uuid, serial: i32) -> Result<Option<Password>> {
        Ok(self
            .passwords
            .lock()
            .expect("passwords")
            .iter()
            .find(|p| p.user_ref == user_ref && p.serial == serial)
            .cloned())
    }

    async fn recent_passwords(&self, user_ref: Uuid, n: u32) -> Result<Vec<Password>> {
        let mut rows: Vec<Password> = self
            .passwords
            .lock()
            .expect("passwords")
            .iter()
            .filter(|p| p.user_ref == user_ref)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.serial.cmp(&a.serial));
        rows.truncate(n as usize);
        Ok(rows)
    }

    async fn password_by_hash(
        &self,
        user_ref: Uuid,
        hash: &PasswordHash,
    ) -> Result<Option<Password>> {
        Ok(self
            .passwords
            .lock()
            .expect("passwords")
            .iter()
            .find(|p| p.user_ref == user_ref && p.password_hash == *hash)
            .cloned())
    }

    async fn save_password(&self, password: &Password) -> Result<()> {
        let mut rows = self.passwords.lock().expect("passwords");
        match rows
            .iter_mut()
            .find(|p| p.user_ref == password.user_ref && p.serial == password.serial)
        {
            Some(existing) => *existing = password.clone(),
            None => rows.push(password.clone()),
        }
        Ok(())
    }
}

impl UserStatusRepository for MemoryAuthStore {
    async fn status_by_user(&self, user_ref: Uuid) -> Result<Option<UserStatus>> {
        Ok(self.statuses.lock().expect("statuses").get(&user_ref).cloned())
    }

    async fn save_status(&self, status: &UserStatus) -> Result<()> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .expect("statuses")
            .insert(status.user_ref, status.clone());
        Ok(())
    }
}

impl RoleRepository for MemoryAuthStore {
    async fn role_by_ref(&self, role_ref: Uuid) -> Result<Option<Role>> {
        Ok(self.roles.lock().expect("roles").get(&role_ref).cloned())
    }
}

impl TenantRepository for MemoryAuthStore {
    async fn tenant_by_id(&self, tenant_id: &str) -> Result<Option<TenantDescription>> {
        Ok(self
            .tenants
            .lock()
            .expect("tenants")
            .iter()
            .find(|t| t.tenant_id == tenant_id)
            .cloned())
    }

    async fn all_tenants(&self) -> Result<Vec<TenantDescription>> {
        Ok(self.tenants.lock().expect("tenants").clone())
    }
}

impl UserTenantRoleRepository for MemoryAuthStore {
    async fn tenant_role_pairs(&self, user_ref: Uuid) -> Result<Vec<TenantRolePair>> {
        let roles = self.roles.lock().expect("roles");
        Ok(self
            .user_tenant_roles
            .lock()
            .expect("assignments")
            .iter()
            .filter(|a| a.user_ref == user_ref)
            .filter_map(|a| {
                roles.get(&a.role_ref).map(|role| TenantRolePair {
                    assignment_tenant_id: a.tenant_id.clone(),
                    role_tenant_id: role.tenant_id.clone(),
                })
            })
            .collect())
    }
}

impl PermissionGrantRepository for MemoryAuthStore {
    async fn grants_for_role(&self, role_ref: Uuid) -> Result<Vec<PermissionEntry>> {
        if self.fail_grant_reads.load(Ordering::SeqCst) {
            bail!("grant reads are failing");
        }
        Ok(self
            .role_grants
            .lock()
            .expect("grants")
            .get(&role_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn grants_for_user(&self, user_ref: Uuid, tenant_id: &str) -> Result<Vec<PermissionEntry>> {
        if self.fail_grant_reads.load(Ordering::SeqCst) {
            bail!("grant reads are failing");
        }
        let visible = |candidate: &str| candidate == GLOBAL_TENANT_ID || candidate == tenant_id;
        let roles = self.roles.lock().expect("roles");
        let grants = self.role_grants.lock().expect("grants");
        let mut entries: Vec<PermissionEntry> = self
            .user_tenant_roles
            .lock()
            .expect("assignments")
            .iter()
            .filter(|a| a.user_ref == user_ref && visible(&a.tenant_id))
            .filter(|a| {
                roles
                    .get(&a.role_ref)
                    .is_some_and(|role| visible(&role.tenant_id))
            })
            .flat_map(|a| grants.get(&a.role_ref).cloned().unwrap_or_default())
            .collect();
        entries.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        Ok(entries)
    }
}

impl ApiKeyRepository for MemoryAuthStore {
    async fn api_key_by_value(&self, key: Uuid) -> Result<Option<ApiKey>> {
        Ok(self.api_keys.lock().expect("api keys").get(&key).cloned())
    }
}
