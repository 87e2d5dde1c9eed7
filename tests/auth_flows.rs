//! End-to-end authentication flows over the in-memory store.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use uuid::Uuid;

use gardi::auth::model::{
    ApiKey, Password, PermissionEntry, Permissionset, PermissionsProfile, Role, TenantDescription,
    User, UserLogLevel, UserStatus, UserTenantRole, GLOBAL_TENANT_ID,
};
use gardi::auth::repository::{PasswordHasher, Sha512PasswordHasher, UserRepository};
use gardi::auth::{AuthConfig, AuthCoordinator, AuthError, ExternalTokenClaims, PasswordBlacklist};
use gardi::store::MemoryAuthStore;

const TENANT_ACME: &str = "acme";

type Coordinator = AuthCoordinator<MemoryAuthStore, Sha512PasswordHasher>;

fn coordinator(config: AuthConfig) -> Coordinator {
    AuthCoordinator::new(MemoryAuthStore::new(), Sha512PasswordHasher, config)
        .expect("valid configuration")
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn test_user(user_id: &str, tenant_id: &str) -> User {
    User {
        user_ref: Uuid::new_v4(),
        user_id: user_id.into(),
        tenant_id: tenant_id.into(),
        role_ref: None,
        is_active: true,
        only_external_auth: false,
        external_auth: false,
        identity_provider: None,
        external_id: None,
        name: None,
        email_address: None,
        permissions: None,
    }
}

/// Seed a user with a current password at the given serial, plus its tenant.
fn seed_password_user(
    coordinator: &Coordinator,
    user: &User,
    serial: i32,
    plaintext: &str,
    now: DateTime<Utc>,
) {
    let store = coordinator.store();
    store.add_user(user.clone());
    let mut status = UserStatus::new(user.user_ref);
    status.current_password_serial = serial;
    store.add_status(status);
    let hash = Sha512PasswordHasher.hash(&user.user_id, plaintext);
    store.add_password(Password {
        user_ref: user.user_ref,
        serial,
        password_hash: hash,
        created: now - Duration::days(1),
        expires: now + Duration::days(89),
        user_expiry: now + Duration::days(179),
        reset_password_hash: None,
        when_last_password_reset: None,
    });
    if user.tenant_id != GLOBAL_TENANT_ID {
        store.add_tenant(TenantDescription {
            tenant_id: user.tenant_id.clone(),
            name: format!("{} Inc", user.tenant_id),
            is_active: true,
        });
    }
}

// -----------------------------------------------------------------------
// Password authentication
// -----------------------------------------------------------------------

#[tokio::test]
async fn password_happy_path_keeps_serial_and_resets_attempts() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 3, "correct horse", now);

    let result = svc
        .authenticate_by_password(now, "alice", &secret("correct horse"), None)
        .await
        .expect("login succeeds");

    assert_eq!(result.user.user_id, "alice");
    assert_eq!(result.tenant_id, TENANT_ACME);
    assert!(!result.password_expired);
    let status = result.user_status.expect("status snapshot");
    assert_eq!(status.current_password_serial, 3);
    assert_eq!(status.incorrect_attempts, 0);
    assert_eq!(status.last_login_by_password, Some(now));
    // Single-tenant user sees exactly its own tenant.
    assert_eq!(result.visible_tenants.len(), 1);
    assert_eq!(result.visible_tenants[0].tenant_id, TENANT_ACME);
}

#[tokio::test]
async fn unknown_user_is_rejected() {
    let svc = coordinator(AuthConfig::default());
    let err = svc
        .authenticate_by_password(Utc::now(), "ghost", &secret("whatever"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
}

#[tokio::test]
async fn external_only_user_cannot_use_password() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let mut user = test_user("machine", TENANT_ACME);
    user.only_external_auth = true;
    seed_password_user(&svc, &user, 1, "irrelevant", now);

    let err = svc
        .authenticate_by_password(now, "machine", &secret("irrelevant"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));
}

#[tokio::test]
async fn inactive_user_is_denied_after_verification() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let mut user = test_user("dormant", TENANT_ACME);
    user.is_active = false;
    seed_password_user(&svc, &user, 1, "correct horse", now);

    let err = svc
        .authenticate_by_password(now, "dormant", &secret("correct horse"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn five_wrong_attempts_freeze_the_account() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    for attempt in 1..=5 {
        let err = svc
            .authenticate_by_password(now, "alice", &secret("bad guess"), None)
            .await
            .unwrap_err();
        match err {
            AuthError::WrongPassword { attempts } => assert_eq!(attempts, attempt),
            other => panic!("expected WrongPassword, got {other:?}"),
        }
    }

    // Even the correct password is rejected while frozen, before hashing.
    let err = svc
        .authenticate_by_password(
            now + Duration::minutes(4),
            "alice",
            &secret("correct horse"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountTemporarilyFrozen));

    // Past the window the attempt proceeds and success clears everything.
    let result = svc
        .authenticate_by_password(
            now + Duration::minutes(6),
            "alice",
            &secret("correct horse"),
            None,
        )
        .await
        .expect("login succeeds after the window");
    let status = result.user_status.expect("status");
    assert_eq!(status.incorrect_attempts, 0);
    assert!(status.account_throttled_until.is_none());
}

#[tokio::test]
async fn failure_counter_resets_on_success() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    for _ in 0..3 {
        let _ = svc
            .authenticate_by_password(now, "alice", &secret("bad guess"), None)
            .await;
    }
    let result = svc
        .authenticate_by_password(now, "alice", &secret("correct horse"), None)
        .await
        .expect("login succeeds");
    assert_eq!(result.user_status.expect("status").incorrect_attempts, 0);

    // Another failure starts counting from one again.
    let err = svc
        .authenticate_by_password(now, "alice", &secret("bad guess"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WrongPassword { attempts: 1 }));
}

#[tokio::test]
async fn expired_password_flags_must_change() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    // Seeded row is long expired relative to "now".
    seed_password_user(&svc, &alice, 1, "old and tired", now - Duration::days(300));

    let result = svc
        .authenticate_by_password(now, "alice", &secret("old and tired"), None)
        .await
        .expect("expired password still authenticates");
    assert!(result.password_expired);
    assert_eq!(
        result
            .user_status
            .as_ref()
            .expect("status")
            .current_password_serial,
        1
    );
}

#[tokio::test]
async fn expired_password_with_replacement_changes_in_login() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "old and tired", now - Duration::days(300));

    let result = svc
        .authenticate_by_password(
            now,
            "alice",
            &secret("old and tired"),
            Some(&secret("fresh and strong")),
        )
        .await
        .expect("login with change succeeds");
    assert!(!result.password_expired);
    let status = result.user_status.expect("status");
    assert_eq!(status.current_password_serial, 2);
    assert_eq!(svc.store().password_count(alice.user_ref), 2);

    // The new password is now the only one that works.
    let again = svc
        .authenticate_by_password(now, "alice", &secret("fresh and strong"), None)
        .await;
    assert!(again.is_ok());
    let old = svc
        .authenticate_by_password(now, "alice", &secret("old and tired"), None)
        .await;
    assert!(matches!(old, Err(AuthError::WrongPassword { .. })));
}

// -----------------------------------------------------------------------
// Password change and policy
// -----------------------------------------------------------------------

#[tokio::test]
async fn change_password_rejects_blank_candidate() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    let err = svc
        .change_password(now, "alice", &secret("correct horse"), &secret("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordValidationFailed { .. }));
}

#[tokio::test]
async fn change_password_enforces_minimum_length() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default().with_password_minimum_length(12));
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    let err = svc
        .change_password(now, "alice", &secret("correct horse"), &secret("short"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordValidationFailed { .. }));

    let ok = svc
        .change_password(
            now,
            "alice",
            &secret("correct horse"),
            &secret("long enough indeed"),
        )
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn change_password_enforces_blacklist_prefix() {
    let now = Utc::now();
    let blacklist = PasswordBlacklist {
        entries: vec!["qwerty".into()],
        case_insensitive: false,
        prefix_match: true,
    };
    let svc = coordinator(AuthConfig::default().with_blacklist(blacklist));
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    let err = svc
        .change_password(now, "alice", &secret("correct horse"), &secret("qwerty123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordValidationFailed { .. }));
}

#[tokio::test]
async fn history_depth_three_blocks_recent_reuse_only() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default().with_password_differ_previous_n(3));
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "password one", now);

    // one -> two -> three -> four; history depth 3 covers {four, three, two}.
    for (current, next) in [
        ("password one", "password two"),
        ("password two", "password three"),
        ("password three", "password four"),
    ] {
        svc.change_password(now, "alice", &secret(current), &secret(next))
            .await
            .expect("change succeeds");
    }

    // Used two changes ago: rejected.
    let err = svc
        .change_password(
            now,
            "alice",
            &secret("password four"),
            &secret("password three"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordValidationFailed { .. }));

    // Used four changes ago: outside the window, accepted.
    let ok = svc
        .change_password(
            now,
            "alice",
            &secret("password four"),
            &secret("password one"),
        )
        .await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn blocking_period_rejects_recent_hash_reuse() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default().with_password_blocking_period_days(30));
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "password one", now);

    svc.change_password(now, "alice", &secret("password one"), &secret("password two"))
        .await
        .expect("change succeeds");

    // "password one" was created a day ago; 30-day blocking still applies.
    let err = svc
        .change_password(now, "alice", &secret("password two"), &secret("password one"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordValidationFailed { .. }));
}

// -----------------------------------------------------------------------
// Reset-password flow
// -----------------------------------------------------------------------

fn reset_fixture(now: DateTime<Utc>) -> (Coordinator, User) {
    let svc = coordinator(AuthConfig::default());
    let mut alice = test_user("alice", TENANT_ACME);
    alice.email_address = Some("alice@example.com".into());
    seed_password_user(&svc, &alice, 1, "forgotten", now);
    (svc, alice)
}

#[tokio::test]
async fn reset_credential_works_within_validity_window() {
    let now = Utc::now();
    let (svc, _alice) = reset_fixture(now);

    let token = svc
        .request_password_reset(now, "alice", "alice@example.com")
        .await
        .expect("reset issued");

    let result = svc
        .authenticate_by_password(now + Duration::hours(23), "alice", &secret(&token), None)
        .await
        .expect("reset authenticates at T+23h");
    // The reset credential was promoted to the current password.
    assert_eq!(
        result.user_status.expect("status").current_password_serial,
        2
    );
}

#[tokio::test]
async fn reset_credential_expires_after_validity_window() {
    let now = Utc::now();
    let (svc, _alice) = reset_fixture(now);

    let token = svc
        .request_password_reset(now, "alice", "alice@example.com")
        .await
        .expect("reset issued");

    let err = svc
        .authenticate_by_password(now + Duration::hours(25), "alice", &secret(&token), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WrongPassword { .. }));
}

#[tokio::test]
async fn reset_requests_are_rate_limited_per_user() {
    let now = Utc::now();
    let (svc, _alice) = reset_fixture(now);

    svc.request_password_reset(now, "alice", "alice@example.com")
        .await
        .expect("first request");
    let err = svc
        .request_password_reset(now + Duration::minutes(10), "alice", "alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ResetRequestThrottled));

    // Past the interval a new credential can be issued.
    let again = svc
        .request_password_reset(now + Duration::minutes(20), "alice", "alice@example.com")
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn reset_request_requires_matching_email() {
    let now = Utc::now();
    let (svc, _alice) = reset_fixture(now);

    let err = svc
        .request_password_reset(now, "alice", "intruder@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn primary_login_clears_pending_reset() {
    let now = Utc::now();
    let (svc, _alice) = reset_fixture(now);

    let token = svc
        .request_password_reset(now, "alice", "alice@example.com")
        .await
        .expect("reset issued");

    // Logging in with the real password invalidates the reset credential.
    svc.authenticate_by_password(now, "alice", &secret("forgotten"), None)
        .await
        .expect("primary login succeeds");

    let err = svc
        .authenticate_by_password(now + Duration::hours(1), "alice", &secret(&token), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WrongPassword { .. }));
}

// -----------------------------------------------------------------------
// API keys
// -----------------------------------------------------------------------

fn seed_api_key(
    svc: &Coordinator,
    user: &User,
    key: Uuid,
    log_level: Option<UserLogLevel>,
    valid_to: Option<DateTime<Utc>>,
) {
    svc.store().add_api_key(ApiKey {
        api_key: key,
        user_ref: user.user_ref,
        role_ref: None,
        is_active: true,
        permissions: Some(PermissionsProfile {
            log_level,
            valid_to,
            resource_is_wildcard: false,
        }),
    });
}

#[tokio::test]
async fn api_key_login_records_status() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let carol = test_user("carol", TENANT_ACME);
    seed_password_user(&svc, &carol, 1, "unused", now);
    let key = Uuid::new_v4();
    seed_api_key(&svc, &carol, key, None, Some(now + Duration::days(30)));

    let writes_before = svc.store().status_writes();
    let result = svc
        .authenticate_by_api_key(now, key)
        .await
        .expect("key authenticates");
    assert_eq!(result.user.user_id, "carol");
    assert_eq!(result.auth_expires, Some(now + Duration::days(30)));
    let status = result.user_status.expect("status");
    assert_eq!(status.last_login_by_api_key, Some(now));
    assert_eq!(svc.store().status_writes(), writes_before + 1);
}

#[tokio::test]
async fn stealth_api_key_leaves_no_status_trace() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    // No status row seeded at all: stealth must not create one.
    let ghost = test_user("ghost", TENANT_ACME);
    svc.store().add_user(ghost.clone());
    svc.store().add_tenant(TenantDescription {
        tenant_id: TENANT_ACME.into(),
        name: "Acme Inc".into(),
        is_active: true,
    });
    let key = Uuid::new_v4();
    seed_api_key(&svc, &ghost, key, Some(UserLogLevel::Stealth), None);

    let result = svc
        .authenticate_by_api_key(now, key)
        .await
        .expect("stealth key authenticates");
    assert!(result.user_status.is_none());
    assert_eq!(svc.store().status_writes(), 0);
    assert!(svc.store().current_status(ghost.user_ref).is_none());
}

#[tokio::test]
async fn unknown_inactive_or_expired_keys_are_rejected() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let carol = test_user("carol", TENANT_ACME);
    seed_password_user(&svc, &carol, 1, "unused", now);

    // Unknown.
    let err = svc
        .authenticate_by_api_key(now, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));

    // Inactive.
    let inactive = Uuid::new_v4();
    svc.store().add_api_key(ApiKey {
        api_key: inactive,
        user_ref: carol.user_ref,
        role_ref: None,
        is_active: false,
        permissions: None,
    });
    let err = svc.authenticate_by_api_key(now, inactive).await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));

    // Outside the validity window.
    let expired = Uuid::new_v4();
    seed_api_key(&svc, &carol, expired, None, Some(now - Duration::hours(1)));
    let err = svc.authenticate_by_api_key(now, expired).await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn api_key_role_override_pins_permissions() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let carol = test_user("carol", TENANT_ACME);
    seed_password_user(&svc, &carol, 1, "unused", now);

    let pinned_role = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: pinned_role,
        role_id: "reporting".into(),
        tenant_id: TENANT_ACME.into(),
        is_active: true,
    });
    svc.store().grant(
        pinned_role,
        PermissionEntry {
            resource_id: "reports".into(),
            permissions: Permissionset::READ,
        },
    );

    let key = Uuid::new_v4();
    svc.store().add_api_key(ApiKey {
        api_key: key,
        user_ref: carol.user_ref,
        role_ref: Some(pinned_role),
        is_active: true,
        permissions: None,
    });

    let result = svc.authenticate_by_api_key(now, key).await.expect("key ok");
    assert_eq!(result.role_restriction, Some(pinned_role));
    assert_eq!(result.permissions.len(), 1);
    assert_eq!(result.permissions[0].resource_id, "reports");
    assert_eq!(result.permissions[0].permissions, Permissionset::READ);
}

// -----------------------------------------------------------------------
// Federated tokens
// -----------------------------------------------------------------------

fn federated_user(svc: &Coordinator, email: Option<&str>, idp: Option<&str>) -> User {
    let mut bob = test_user("bob", TENANT_ACME);
    bob.external_auth = true;
    bob.email_address = email.map(ToString::to_string);
    bob.identity_provider = idp.map(ToString::to_string);
    svc.store().add_user(bob.clone());
    svc.store().add_tenant(TenantDescription {
        tenant_id: TENANT_ACME.into(),
        name: "Acme Inc".into(),
        is_active: true,
    });
    bob
}

#[tokio::test]
async fn upn_with_mismatched_email_domain_is_rejected() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    federated_user(&svc, Some("bob@example.org"), None);

    let claims = ExternalTokenClaims {
        upn: Some("bob@example.com".into()),
        ..Default::default()
    };
    let err = svc
        .authenticate_by_external_token(now, &claims)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn upn_with_matching_email_domain_authenticates_and_reconciles() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let bob = federated_user(&svc, Some("bob@example.com"), None);

    let claims = ExternalTokenClaims {
        oid: Some("11111111-2222-3333-4444-555555555555".into()),
        upn: Some("bob@example.com".into()),
        idp: Some("https://login.example.com".into()),
        name: Some("Bob Example".into()),
        email_address: Some("robert@example.com".into()),
        expires_at: Some(now + Duration::hours(1)),
    };
    let result = svc
        .authenticate_by_external_token(now, &claims)
        .await
        .expect("federated login succeeds");
    assert_eq!(result.auth_expires, Some(now + Duration::hours(1)));
    assert_eq!(
        result.user_status.expect("status").last_login_by_token,
        Some(now)
    );

    let stored = svc.store().stored_user("bob").expect("bob persisted");
    assert_eq!(stored.user_ref, bob.user_ref);
    assert_eq!(
        stored.identity_provider.as_deref(),
        Some("https://login.example.com")
    );
    assert_eq!(
        stored.external_id.as_deref(),
        Some("11111111-2222-3333-4444-555555555555")
    );
    assert_eq!(stored.name.as_deref(), Some("Bob Example"));
    assert_eq!(stored.email_address.as_deref(), Some("robert@example.com"));
}

#[tokio::test]
async fn oid_binding_enforces_identity_provider() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let mut bob = test_user("bob", TENANT_ACME);
    bob.external_auth = true;
    bob.external_id = Some("ext-42".into());
    bob.identity_provider = Some("https://login.azure.example".into());
    svc.store().add_user(bob);
    svc.store().add_tenant(TenantDescription {
        tenant_id: TENANT_ACME.into(),
        name: "Acme Inc".into(),
        is_active: true,
    });

    let claims = ExternalTokenClaims {
        oid: Some("ext-42".into()),
        idp: Some("https://login.okta.example".into()),
        ..Default::default()
    };
    let err = svc
        .authenticate_by_external_token(now, &claims)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::IdentityProviderMismatch));
}

#[tokio::test]
async fn user_without_external_auth_flag_is_rejected() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let mut bob = federated_user(&svc, Some("bob@example.com"), None);
    bob.external_auth = false;
    svc.store()
        .save_user(&bob)
        .await
        .expect("save user");

    let claims = ExternalTokenClaims {
        upn: Some("bob@example.com".into()),
        ..Default::default()
    };
    let err = svc
        .authenticate_by_external_token(now, &claims)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

#[tokio::test]
async fn claims_without_usable_identifiers_are_rejected() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    federated_user(&svc, Some("bob@example.com"), None);

    let err = svc
        .authenticate_by_external_token(now, &ExternalTokenClaims::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated));
}

// -----------------------------------------------------------------------
// Tenant visibility
// -----------------------------------------------------------------------

fn seed_tenants(svc: &Coordinator, ids: &[&str]) {
    for id in ids {
        svc.store().add_tenant(TenantDescription {
            tenant_id: (*id).to_string(),
            name: format!("{id} Inc"),
            is_active: true,
        });
    }
}

#[tokio::test]
async fn global_fixed_role_opens_all_tenants() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme", "beta", "corp"]);

    let role_ref = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref,
        role_id: "admin".into(),
        tenant_id: GLOBAL_TENANT_ID.into(),
        is_active: true,
    });
    let mut root = test_user("root", GLOBAL_TENANT_ID);
    root.role_ref = Some(role_ref);
    svc.store().add_user(root.clone());

    let tenants = svc.visible_tenants(root.user_ref).await.expect("resolved");
    assert_eq!(tenants.len(), 3);
}

#[tokio::test]
async fn tenant_scoped_fixed_role_pins_one_tenant() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme", "beta"]);

    let role_ref = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref,
        role_id: "acme-admin".into(),
        tenant_id: "acme".into(),
        is_active: true,
    });
    let mut user = test_user("scoped", GLOBAL_TENANT_ID);
    user.role_ref = Some(role_ref);
    svc.store().add_user(user.clone());

    let tenants = svc.visible_tenants(user.user_ref).await.expect("resolved");
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].tenant_id, "acme");
}

#[tokio::test]
async fn double_global_membership_opens_all_tenants() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme", "beta", "corp"]);

    let global_role = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: global_role,
        role_id: "auditor".into(),
        tenant_id: GLOBAL_TENANT_ID.into(),
        is_active: true,
    });
    let user = test_user("auditor", GLOBAL_TENANT_ID);
    svc.store().add_user(user.clone());
    svc.store().assign_role(UserTenantRole {
        user_ref: user.user_ref,
        tenant_id: GLOBAL_TENANT_ID.into(),
        role_ref: global_role,
    });

    let tenants = svc.visible_tenants(user.user_ref).await.expect("resolved");
    assert_eq!(tenants.len(), 3);
}

#[tokio::test]
async fn specific_memberships_accumulate_effective_tenants() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme", "beta", "corp"]);

    // One role scoped to beta, one global role assigned under acme.
    let beta_role = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: beta_role,
        role_id: "beta-ops".into(),
        tenant_id: "beta".into(),
        is_active: true,
    });
    let global_role = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: global_role,
        role_id: "viewer".into(),
        tenant_id: GLOBAL_TENANT_ID.into(),
        is_active: true,
    });

    let user = test_user("multi", GLOBAL_TENANT_ID);
    svc.store().add_user(user.clone());
    svc.store().assign_role(UserTenantRole {
        user_ref: user.user_ref,
        tenant_id: GLOBAL_TENANT_ID.into(),
        role_ref: beta_role,
    });
    svc.store().assign_role(UserTenantRole {
        user_ref: user.user_ref,
        tenant_id: "acme".into(),
        role_ref: global_role,
    });

    let tenants = svc.visible_tenants(user.user_ref).await.expect("resolved");
    let mut ids: Vec<String> = tenants.into_iter().map(|t| t.tenant_id).collect();
    ids.sort();
    assert_eq!(ids, vec!["acme", "beta"]);
}

#[tokio::test]
async fn wildcard_user_without_memberships_sees_all_tenants() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme", "beta"]);

    let mut admin = test_user("wildcard", GLOBAL_TENANT_ID);
    admin.permissions = Some(PermissionsProfile {
        log_level: None,
        valid_to: None,
        resource_is_wildcard: true,
    });
    svc.store().add_user(admin.clone());

    let tenants = svc.visible_tenants(admin.user_ref).await.expect("resolved");
    assert_eq!(tenants.len(), 2);
}

#[tokio::test]
async fn user_without_memberships_or_wildcard_sees_nothing() {
    let svc = coordinator(AuthConfig::default());
    seed_tenants(&svc, &["acme"]);

    let user = test_user("underconstruction", GLOBAL_TENANT_ID);
    svc.store().add_user(user.clone());

    let tenants = svc.visible_tenants(user.user_ref).await.expect("resolved");
    assert!(tenants.is_empty());
}

// -----------------------------------------------------------------------
// Permission aggregation
// -----------------------------------------------------------------------

#[tokio::test]
async fn grants_for_same_resource_are_unioned() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);

    let reader = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: reader,
        role_id: "reader".into(),
        tenant_id: TENANT_ACME.into(),
        is_active: true,
    });
    svc.store().grant(
        reader,
        PermissionEntry {
            resource_id: "reports".into(),
            permissions: Permissionset::from_bits(0b01),
        },
    );
    let writer = Uuid::new_v4();
    svc.store().add_role(Role {
        role_ref: writer,
        role_id: "writer".into(),
        tenant_id: GLOBAL_TENANT_ID.into(),
        is_active: true,
    });
    svc.store().grant(
        writer,
        PermissionEntry {
            resource_id: "reports".into(),
            permissions: Permissionset::from_bits(0b10),
        },
    );
    for role_ref in [reader, writer] {
        svc.store().assign_role(UserTenantRole {
            user_ref: alice.user_ref,
            tenant_id: TENANT_ACME.into(),
            role_ref,
        });
    }

    let result = svc
        .authenticate_by_password(now, "alice", &secret("correct horse"), None)
        .await
        .expect("login succeeds");
    assert_eq!(result.permissions.len(), 1);
    assert_eq!(result.permissions[0].resource_id, "reports");
    assert_eq!(result.permissions[0].permissions.bits(), 0b11);
}

#[tokio::test]
async fn aggregation_fails_closed_on_storage_errors() {
    let now = Utc::now();
    let svc = coordinator(AuthConfig::default());
    let alice = test_user("alice", TENANT_ACME);
    seed_password_user(&svc, &alice, 1, "correct horse", now);
    svc.store().fail_grant_reads(true);

    // Login still succeeds, but with an empty permission set.
    let result = svc
        .authenticate_by_password(now, "alice", &secret("correct horse"), None)
        .await
        .expect("login succeeds");
    assert!(result.permissions.is_empty());

    let direct = svc
        .effective_permissions(alice.user_ref, "alice", TENANT_ACME, None)
        .await;
    assert!(direct.is_empty());
}
