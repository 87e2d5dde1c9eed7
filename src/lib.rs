//! # Gardi (Authentication & Authorization Core)
//!
//! `gardi` verifies a caller's identity through three credential methods and
//! computes the caller's effective, tenant-scoped permission set.
//!
//! ## Credential Methods
//!
//! - **Password**, with full lifecycle handling: expiry, in-login change,
//!   history/blacklist policy, and a self-service reset credential with its
//!   own validity window.
//! - **API key**: active flag, validity window, optional role override, and
//!   a stealth log tier that leaves no status trace.
//! - **Federated token**: claims validated upstream are bound to a local
//!   user by external id or UPN, corroborated by identity provider or email
//!   domain, with guarded reconciliation of the local record.
//!
//! ## Lockout
//!
//! Five consecutive wrong passwords freeze the account for five minutes.
//! Frozen accounts are rejected before any hashing happens.
//!
//! ## Tenant Model
//!
//! Tenants isolate roles and data; the distinguished `"@"` tenant denotes
//! cross-tenant scope. Permission grants are aggregated into one bitmask per
//! resource, and any storage failure during aggregation fails closed to an
//! empty permission set.
//!
//! ## Storage
//!
//! All persistence goes through the repository traits in
//! [`auth::repository`]; `store` ships a Postgres engine and an in-memory
//! test double.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
