pub mod crypto_provider;
pub mod encryption;
pub mod hashing;

pub use crypto_provider::{CoseKey, CryptoProvider, RingCryptoProvider, SignatureAlgorithm};
pub use encryption::EncryptionService;
pub use hashing::PasswordHasher;
