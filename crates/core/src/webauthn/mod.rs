//! WebAuthn/FIDO2 relying-party ceremonies: challenge issuance, attestation
//! and assertion verification, and the registration/authentication engine
//! facade. Credential persistence and the counter-rollback protocol live in
//! [`crate::credential`]; this module only covers what happens before a
//! credential row exists or is touched.

pub mod attestation;
pub mod ceremony;
pub mod challenge;
pub mod engine;
pub mod types;

pub use attestation::{AttestationMetadataService, MetadataStatement, ParsedAttestationObject};
pub use ceremony::VerifiedAssertion;
pub use challenge::{ChallengeStore, RedisChallengeStore};
pub use engine::{RelyingPartyPolicy, WebAuthnEngine};
pub use types::{
    AttestationConveyance, AuthenticationOptions, CeremonyFailure, ChallengePurpose, ClientData,
    ParsedAuthenticatorData, RegistrationOptions, RegistrationResult, StoredChallenge, VerifiedPrincipal,
};
