pub mod model;
pub mod repository;
pub mod service;

pub use model::{
    AttestationFormat, Credential, CredentialSecurityFlags, CredentialState, CredentialType,
    CounterCheckOutcome, DeviceType,
};
pub use repository::{CredentialRepository, DatabaseCredentialRepository};
pub use service::CredentialService;
