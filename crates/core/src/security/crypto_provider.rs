use crate::error::{Error, ErrorKind, Result};
use async_trait::async_trait;
use ring::rand::SecureRandom;
use ring::{digest, rand, signature};

/// Signature algorithms named by COSE algorithm identifier.
///
/// Only the two algorithms authenticators are required to support in
/// practice are modeled; an unrecognized COSE `alg` value is rejected at
/// parse time rather than silently falling back to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// COSE alg -7, ECDSA over P-256 with SHA-256.
    Es256,
    /// COSE alg -257, RSASSA-PKCS1-v1_5 with SHA-256.
    Rs256,
}

impl SignatureAlgorithm {
    pub fn from_cose_alg(alg: i64) -> Result<Self> {
        match alg {
            -7 => Ok(Self::Es256),
            -257 => Ok(Self::Rs256),
            other => Err(Error::invalid_input(format!(
                "unsupported COSE algorithm identifier {}",
                other
            ))),
        }
    }
}

/// A public key extracted from a COSE_Key CBOR structure, as carried in an
/// attested credential public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoseKey {
    /// kty = EC2 (2), crv = P-256 (1).
    Ec2 { x: Vec<u8>, y: Vec<u8> },
    /// kty = RSA (3).
    Rsa { n: Vec<u8>, e: Vec<u8> },
}

impl CoseKey {
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            CoseKey::Ec2 { .. } => SignatureAlgorithm::Es256,
            CoseKey::Rsa { .. } => SignatureAlgorithm::Rs256,
        }
    }

    /// Uncompressed SEC1 point encoding (0x04 || x || y), as `ring` expects
    /// for P-256 verification.
    fn ec_public_key_bytes(&self) -> Result<Vec<u8>> {
        match self {
            CoseKey::Ec2 { x, y } => {
                let mut buf = Vec::with_capacity(1 + x.len() + y.len());
                buf.push(0x04);
                buf.extend_from_slice(x);
                buf.extend_from_slice(y);
                Ok(buf)
            }
            CoseKey::Rsa { .. } => Err(Error::internal("not an EC2 key")),
        }
    }
}

/// Abstraction over the cryptographic primitives the WebAuthn engine and
/// session manager need: hashing, random generation, and signature
/// verification over an authenticator's COSE public key.
///
/// Kept as a trait (rather than free functions) so tests can substitute a
/// deterministic provider without touching `ring`.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    fn sha256(&self, data: &[u8]) -> [u8; 32];
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>>;
    fn verify_signature(
        &self,
        key: &CoseKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()>;
    fn parse_cose_key(&self, cbor: &[u8]) -> Result<CoseKey>;
}

/// `ring`-backed implementation used everywhere outside of tests.
#[derive(Debug, Default)]
pub struct RingCryptoProvider {
    rng: rand::SystemRandom,
}

impl RingCryptoProvider {
    pub fn new() -> Self {
        Self {
            rng: rand::SystemRandom::new(),
        }
    }
}

#[async_trait]
impl CryptoProvider for RingCryptoProvider {
    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        let digest = digest::digest(&digest::SHA256, data);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_ref());
        out
    }

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.rng
            .fill(&mut buf)
            .map_err(|_| Error::internal("system random number generator failed"))?;
        Ok(buf)
    }

    fn verify_signature(&self, key: &CoseKey, message: &[u8], sig: &[u8]) -> Result<()> {
        match key {
            CoseKey::Ec2 { .. } => {
                let public_key_bytes = key.ec_public_key_bytes()?;
                let unparsed = signature::UnparsedPublicKey::new(
                    &signature::ECDSA_P256_SHA256_ASN1,
                    &public_key_bytes,
                );
                unparsed
                    .verify(message, sig)
                    .map_err(|_| Error::precondition_failed("signature verification failed"))
            }
            CoseKey::Rsa { n, e } => {
                let public_key_components =
                    signature::RsaPublicKeyComponents { n: n.as_slice(), e: e.as_slice() };
                public_key_components
                    .verify(&signature::RSA_PKCS1_2048_8192_SHA256, message, sig)
                    .map_err(|_| Error::precondition_failed("signature verification failed"))
            }
        }
    }

    fn parse_cose_key(&self, cbor: &[u8]) -> Result<CoseKey> {
        let value: ciborium::value::Value = ciborium::de::from_reader(cbor)
            .map_err(|e| Error::invalid_input(format!("malformed COSE key CBOR: {}", e)))?;

        let map = value
            .as_map()
            .ok_or_else(|| Error::invalid_input("COSE key is not a CBOR map"))?;

        let get = |label: i128| -> Option<&ciborium::value::Value> {
            map.iter().find_map(|(k, v)| {
                k.as_integer()
                    .and_then(|i| i128::try_from(i).ok())
                    .filter(|&i| i == label)
                    .map(|_| v)
            })
        };

        let kty = get(1)
            .and_then(|v| v.as_integer())
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| Error::invalid_input("COSE key missing kty (label 1)"))?;

        match kty {
            2 => {
                let crv = get(-1)
                    .and_then(|v| v.as_integer())
                    .and_then(|i| i64::try_from(i).ok())
                    .ok_or_else(|| Error::invalid_input("COSE EC2 key missing crv (label -1)"))?;
                if crv != 1 {
                    return Err(Error::invalid_input(format!(
                        "unsupported COSE EC2 curve {}, only P-256 (1) is supported",
                        crv
                    )));
                }
                let x = get(-2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| Error::invalid_input("COSE EC2 key missing x (label -2)"))?
                    .clone();
                let y = get(-3)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| Error::invalid_input("COSE EC2 key missing y (label -3)"))?
                    .clone();
                Ok(CoseKey::Ec2 { x, y })
            }
            3 => {
                let n = get(-1)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| Error::invalid_input("COSE RSA key missing n (label -1)"))?
                    .clone();
                let e = get(-2)
                    .and_then(|v| v.as_bytes())
                    .ok_or_else(|| Error::invalid_input("COSE RSA key missing e (label -2)"))?
                    .clone();
                Ok(CoseKey::Rsa { n, e })
            }
            other => Err(Error::invalid_input(format!(
                "unsupported COSE key type {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable() {
        let provider = RingCryptoProvider::new();
        let a = provider.sha256(b"hello world");
        let b = provider.sha256(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, provider.sha256(b"hello worlds"));
    }

    #[test]
    fn random_bytes_have_requested_length_and_differ() {
        let provider = RingCryptoProvider::new();
        let a = provider.random_bytes(32).unwrap();
        let b = provider.random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn algorithm_from_cose_alg_rejects_unknown() {
        assert!(SignatureAlgorithm::from_cose_alg(-7).is_ok());
        assert!(SignatureAlgorithm::from_cose_alg(-257).is_ok());
        assert!(SignatureAlgorithm::from_cose_alg(-999).is_err());
    }

    #[test]
    fn parse_cose_key_rejects_non_map() {
        let provider = RingCryptoProvider::new();
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&ciborium::value::Value::Integer(1.into()), &mut buf).unwrap();
        assert!(provider.parse_cose_key(&buf).is_err());
    }
}
