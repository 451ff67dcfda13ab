//! Tenant/user aggregate (spec §4.7): lifecycle, lockout, and soft-delete
//! for the account behind every credential, session, and risk profile.
//! HTTP transport, GraphQL surface, and SMTP/SMS delivery are external
//! collaborators (spec §1 "Out of scope") and are not modeled here.

pub mod models;
pub mod repository;
pub mod service;
pub mod validation;

pub use models::{LoginOutcome, NewUser, Tenant, User};
pub use repository::{DatabaseTenantRepository, DatabaseUserRepository, TenantRepository, UserRepository};
pub use service::UserService;
