//! Postgres-backed [`AuthStore`].
//!
//! Thin data access: each method is one statement (or one short
//! read-modify-write) so the caller's unit of work maps onto a single
//! transaction. Rows are mapped by hand; the domain types stay free of any
//! database derive.
//!
//! [`AuthStore`]: crate::auth::repository::AuthStore

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::model::{
    ApiKey, Password, PasswordHash, PermissionEntry, Permissionset, PermissionsProfile, Role,
    TenantDescription, User, UserLogLevel, UserStatus,
};
use crate::auth::repository::{
    ApiKeyRepository, PasswordRepository, PermissionGrantRepository, RoleRepository,
    TenantRepository, TenantRolePair, UserRepository, UserStatusRepository,
    UserTenantRoleRepository,
};

#[derive(Clone)]
pub struct PgAuthStore {
    pool: PgPool,
}

impl PgAuthStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn log_level_from_column(value: Option<&str>) -> Option<UserLogLevel> {
    match value {
        Some("stealth") => Some(UserLogLevel::Stealth),
        Some("message_entry") => Some(UserLogLevel::MessageEntry),
        Some("message") => Some(UserLogLevel::Message),
        Some("full") => Some(UserLogLevel::Full),
        _ => None,
    }
}

fn log_level_to_column(level: Option<UserLogLevel>) -> Option<&'static str> {
    match level {
        Some(UserLogLevel::Stealth) => Some("stealth"),
        Some(UserLogLevel::MessageEntry) => Some("message_entry"),
        Some(UserLogLevel::Message) => Some("message"),
        Some(UserLogLevel::Full) => Some("full"),
        None => None,
    }
}

fn profile_from_row(row: &sqlx::postgres::PgRow) -> Option<PermissionsProfile> {
    let log_level: Option<String> = row.get("log_level");
    let valid_to: Option<DateTime<Utc>> = row.get("valid_to");
    let resource_is_wildcard: Option<bool> = row.get("resource_is_wildcard");
    if log_level.is_none() && valid_to.is_none() && resource_is_wildcard.is_none() {
        return None;
    }
    Some(PermissionsProfile {
        log_level: log_level_from_column(log_level.as_deref()),
        valid_to,
        resource_is_wildcard: resource_is_wildcard.unwrap_or(false),
    })
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        user_ref: row.get("user_ref"),
        user_id: row.get("user_id"),
        tenant_id: row.get("tenant_id"),
        role_ref: row.get("role_ref"),
        is_active: row.get("is_active"),
        only_external_auth: row.get("only_external_auth"),
        external_auth: row.get("external_auth"),
        identity_provider: row.get("identity_provider"),
        external_id: row.get("external_id"),
        name: row.get("name"),
        email_address: row.get("email_address"),
        permissions: profile_from_row(row),
    }
}

fn status_from_row(row: &sqlx::postgres::PgRow) -> UserStatus {
    UserStatus {
        user_ref: row.get("user_ref"),
        current_password_serial: row.get("current_password_serial"),
        incorrect_attempts: row.get("incorrect_attempts"),
        account_throttled_until: row.get("account_throttled_until"),
        last_login: row.get("last_login"),
        prev_login: row.get("prev_login"),
        last_login_by_password: row.get("last_login_by_password"),
        prev_login_by_password: row.get("prev_login_by_password"),
        last_login_by_api_key: row.get("last_login_by_api_key"),
        prev_login_by_api_key: row.get("prev_login_by_api_key"),
        last_login_by_token: row.get("last_login_by_token"),
        prev_login_by_token: row.get("prev_login_by_token"),
    }
}

fn password_from_row(row: &sqlx::postgres::PgRow) -> Password {
    let reset: Option<Vec<u8>> = row.get("reset_password_hash");
    Password {
        user_ref: row.get("user_ref"),
        serial: row.get("serial"),
        password_hash: PasswordHash(row.get("password_hash")),
        created: row.get("created"),
        expires: row.get("expires"),
        user_expiry: row.get("user_expiry"),
        reset_password_hash: reset.map(PasswordHash),
        when_last_password_reset: row.get("when_last_password_reset"),
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> PermissionEntry {
    let bits: i64 = row.get("permission_bits");
    PermissionEntry {
        resource_id: row.get("resource_id"),
        permissions: Permissionset::from_bits(u32::try_from(bits).unwrap_or(0)),
    }
}

const USER_COLUMNS: &str = "user_ref, user_id, tenant_id, role_ref, is_active, \
    only_external_auth, external_auth, identity_provider, external_id, name, \
    email_address, log_level, valid_to, resource_is_wildcard";

impl UserRepository for PgAuthStore {
    async fn user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1");
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to look up user by id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn user_by_ref(&self, user_ref: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_ref = $1");
        let row = sqlx::query(&query)
            .bind(user_ref)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to look up user by ref")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = $1 AND is_active");
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to look up user by external id")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn save_user(&self, user: &User) -> Result<()> {
        let query = r"
            UPDATE users
            SET tenant_id = $2, role_ref = $3, is_active = $4,
                only_external_auth = $5, external_auth = $6,
                identity_provider = $7, external_id = $8, name = $9,
                email_address = $10, log_level = $11, valid_to = $12,
                resource_is_wildcard = $13
            WHERE user_ref = $1
        ";
        let profile = user.permissions.as_ref();
        sqlx::query(query)
            .bind(user.user_ref)
            .bind(&user.tenant_id)
            .bind(user.role_ref)
            .bind(user.is_active)
            .bind(user.only_external_auth)
            .bind(user.external_auth)
            .bind(&user.identity_provider)
            .bind(&user.external_id)
            .bind(&user.name)
            .bind(&user.email_address)
            .bind(log_level_to_column(profile.and_then(|p| p.log_level)))
            .bind(profile.and_then(|p| p.valid_to))
            .bind(profile.map(|p| p.resource_is_wildcard))
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to save user")?;
        Ok(())
    }
}

impl PasswordRepository for PgAuthStore {
    async fn current_password(&self, user_ref: Uuid) -> Result<Option<Password>> {
        let query = r"
            SELECT p.user_ref, p.serial, p.password_hash, p.created, p.expires,
                   p.user_expiry, p.reset_password_hash, p.when_last_password_reset
            FROM passwords p
            JOIN user_status s
              ON s.user_ref = p.user_ref
             AND s.current_password_serial = p.serial
            WHERE p.user_ref = $1
        ";
        let row = sqlx::query(query)
            .bind(user_ref)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up current password")?;
        Ok(row.as_ref().map(password_from_row))
    }

    async fn password_by_serial(&self, user_ref: Uuid, serial: i32) -> Result<Option<Password>> {
        let query = r"
            SELECT user_ref, serial, password_hash, created, expires, user_expiry,
                   reset_password_hash, when_last_password_reset
            FROM passwords WHERE user_ref = $1 AND serial = $2
        ";
        let row = sqlx::query(query)
            .bind(user_ref)
            .bind(serial)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up password by serial")?;
        Ok(row.as_ref().map(password_from_row))
    }

    async fn recent_passwords(&self, user_ref: Uuid, n: u32) -> Result<Vec<Password>> {
        let query = r"
            SELECT user_ref, serial, password_hash, created, expires, user_expiry,
                   reset_password_hash, when_last_password_reset
            FROM passwords WHERE user_ref = $1
            ORDER BY serial DESC
            LIMIT $2
        ";
        let rows = sqlx::query(query)
            .bind(user_ref)
            .bind(i64::from(n))
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list recent passwords")?;
        Ok(rows.iter().map(password_from_row).collect())
    }

    async fn password_by_hash(
        &self,
        user_ref: Uuid,
        hash: &PasswordHash,
    ) -> Result<Option<Password>> {
        let query = r"
            SELECT user_ref, serial, password_hash, created, expires, user_expiry,
                   reset_password_hash, when_last_password_reset
            FROM passwords WHERE user_ref = $1 AND password_hash = $2
            ORDER BY serial DESC
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(user_ref)
            .bind(hash.as_bytes())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up password by hash")?;
        Ok(row.as_ref().map(password_from_row))
    }

    async fn save_password(&self, password: &Password) -> Result<()> {
        let query = r"
            INSERT INTO passwords
                (user_ref, serial, password_hash, created, expires, user_expiry,
                 reset_password_hash, when_last_password_reset)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_ref, serial) DO UPDATE
            SET reset_password_hash = EXCLUDED.reset_password_hash,
                when_last_password_reset = EXCLUDED.when_last_password_reset
        ";
        sqlx::query(query)
            .bind(password.user_ref)
            .bind(password.serial)
            .bind(password.password_hash.as_bytes())
            .bind(password.created)
            .bind(password.expires)
            .bind(password.user_expiry)
            .bind(password.reset_password_hash.as_ref().map(PasswordHash::as_bytes))
            .bind(password.when_last_password_reset)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to save password")?;
        Ok(())
    }
}

impl UserStatusRepository for PgAuthStore {
    async fn status_by_user(&self, user_ref: Uuid) -> Result<Option<UserStatus>> {
        let query = r"
            SELECT user_ref, current_password_serial, incorrect_attempts,
                   account_throttled_until, last_login, prev_login,
                   last_login_by_password, prev_login_by_password,
                   last_login_by_api_key, prev_login_by_api_key,
                   last_login_by_token, prev_login_by_token
            FROM user_status WHERE user_ref = $1
        ";
        let row = sqlx::query(query)
            .bind(user_ref)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up user status")?;
        Ok(row.as_ref().map(status_from_row))
    }

    async fn save_status(&self, status: &UserStatus) -> Result<()> {
        let query = r"
            INSERT INTO user_status
                (user_ref, current_password_serial, incorrect_attempts,
                 account_throttled_until, last_login, prev_login,
                 last_login_by_password, prev_login_by_password,
                 last_login_by_api_key, prev_login_by_api_key,
                 last_login_by_token, prev_login_by_token)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (user_ref) DO UPDATE
            SET current_password_serial = EXCLUDED.current_password_serial,
                incorrect_attempts = EXCLUDED.incorrect_attempts,
                account_throttled_until = EXCLUDED.account_throttled_until,
                last_login = EXCLUDED.last_login,
                prev_login = EXCLUDED.prev_login,
                last_login_by_password = EXCLUDED.last_login_by_password,
                prev_login_by_password = EXCLUDED.prev_login_by_password,
                last_login_by_api_key = EXCLUDED.last_login_by_api_key,
                prev_login_by_api_key = EXCLUDED.prev_login_by_api_key,
                last_login_by_token = EXCLUDED.last_login_by_token,
                prev_login_by_token = EXCLUDED.prev_login_by_token
        ";
        sqlx::query(query)
            .bind(status.user_ref)
            .bind(status.current_password_serial)
            .bind(status.incorrect_attempts)
            .bind(status.account_throttled_until)
            .bind(status.last_login)
            .bind(status.prev_login)
            .bind(status.last_login_by_password)
            .bind(status.prev_login_by_password)
            .bind(status.last_login_by_api_key)
            .bind(status.prev_login_by_api_key)
            .bind(status.last_login_by_token)
            .bind(status.prev_login_by_token)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to save user status")?;
        Ok(())
    }
}

impl RoleRepository for PgAuthStore {
    async fn role_by_ref(&self, role_ref: Uuid) -> Result<Option<Role>> {
        let query = "SELECT role_ref, role_id, tenant_id, is_active FROM roles WHERE role_ref = $1";
        let row = sqlx::query(query)
            .bind(role_ref)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up role")?;
        Ok(row.map(|row| Role {
            role_ref: row.get("role_ref"),
            role_id: row.get("role_id"),
            tenant_id: row.get("tenant_id"),
            is_active: row.get("is_active"),
        }))
    }
}

impl TenantRepository for PgAuthStore {
    async fn tenant_by_id(&self, tenant_id: &str) -> Result<Option<TenantDescription>> {
        let query = "SELECT tenant_id, name, is_active FROM tenants WHERE tenant_id = $1";
        let row = sqlx::query(query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up tenant")?;
        Ok(row.map(|row| TenantDescription {
            tenant_id: row.get("tenant_id"),
            name: row.get("name"),
            is_active: row.get("is_active"),
        }))
    }

    async fn all_tenants(&self) -> Result<Vec<TenantDescription>> {
        let query = "SELECT tenant_id, name, is_active FROM tenants ORDER BY tenant_id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list tenants")?;
        Ok(rows
            .into_iter()
            .map(|row| TenantDescription {
                tenant_id: row.get("tenant_id"),
                name: row.get("name"),
                is_active: row.get("is_active"),
            })
            .collect())
    }
}

impl UserTenantRoleRepository for PgAuthStore {
    async fn tenant_role_pairs(&self, user_ref: Uuid) -> Result<Vec<TenantRolePair>> {
        let query = r"
            SELECT utr.tenant_id AS assignment_tenant_id, r.tenant_id AS role_tenant_id
            FROM user_tenant_roles utr
            JOIN roles r ON r.role_ref = utr.role_ref
            WHERE utr.user_ref = $1
        ";
        let rows = sqlx::query(query)
            .bind(user_ref)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list tenant/role pairs")?;
        Ok(rows
            .into_iter()
            .map(|row| TenantRolePair {
                assignment_tenant_id: row.get("assignment_tenant_id"),
                role_tenant_id: row.get("role_tenant_id"),
            })
            .collect())
    }
}

impl PermissionGrantRepository for PgAuthStore {
    async fn grants_for_role(&self, role_ref: Uuid) -> Result<Vec<PermissionEntry>> {
        let query = r"
            SELECT resource_id, permission_bits
            FROM role_permissions WHERE role_ref = $1
            ORDER BY resource_id
        ";
        let rows = sqlx::query(query)
            .bind(role_ref)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list role grants")?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn grants_for_user(&self, user_ref: Uuid, tenant_id: &str) -> Result<Vec<PermissionEntry>> {
        // Grouping by resource happens in the aggregator, since SQL has no
        // bit union; the ORDER BY is load-bearing here.
        let query = r"
            SELECT rp.resource_id, rp.permission_bits
            FROM role_permissions rp
            JOIN user_tenant_roles utr ON utr.role_ref = rp.role_ref
            JOIN roles r ON r.role_ref = rp.role_ref
            WHERE utr.user_ref = $1
              AND utr.tenant_id IN ('@', $2)
              AND r.tenant_id IN ('@', $2)
            ORDER BY rp.resource_id
        ";
        let rows = sqlx::query(query)
            .bind(user_ref)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to list user grants")?;
        Ok(rows.iter().map(entry_from_row).collect())
    }
}

impl ApiKeyRepository for PgAuthStore {
    async fn api_key_by_value(&self, key: Uuid) -> Result<Option<ApiKey>> {
        let query = r"
            SELECT api_key, user_ref, role_ref, is_active,
                   log_level, valid_to, resource_is_wildcard
            FROM api_keys WHERE api_key = $1
        ";
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to look up api key")?;
        Ok(row.map(|row| ApiKey {
            api_key: row.get("api_key"),
            user_ref: row.get("user_ref"),
            role_ref: row.get("role_ref"),
            is_active: row.get("is_active"),
            permissions: profile_from_row(&row),
        }))
    }
}
