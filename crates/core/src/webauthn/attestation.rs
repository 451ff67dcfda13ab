use super::types::{AuthenticatorDataFlags, ParsedAuthenticatorData};
use crate::credential::AttestationFormat;
use crate::error::{Error, Result};
use crate::security::crypto_provider::CryptoProvider;
use ciborium::value::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Parsed `attestationObject`: the authenticator data plus the statement
/// format name and raw statement map, as produced by the authenticator at
/// registration time.
pub struct ParsedAttestationObject {
    pub auth_data: ParsedAuthenticatorData,
    pub format: AttestationFormat,
    pub statement: Value,
}

/// Decode the top-level CBOR map (`fmt`, `attStmt`, `authData`) of an
/// attestation object, then unpack `authData` into its component fields.
pub fn parse_attestation_object(cbor: &[u8]) -> Result<ParsedAttestationObject> {
    let value: Value = ciborium::de::from_reader(cbor)
        .map_err(|e| Error::invalid_input(format!("malformed attestation object CBOR: {}", e)))?;

    let map = value
        .as_map()
        .ok_or_else(|| Error::invalid_input("attestation object is not a CBOR map"))?;

    let get = |name: &str| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    };

    let fmt = get("fmt")
        .and_then(|v| v.as_text())
        .ok_or_else(|| Error::invalid_input("attestation object missing fmt"))?;
    let format = parse_format_name(fmt)?;

    let statement = get("attStmt")
        .ok_or_else(|| Error::invalid_input("attestation object missing attStmt"))?
        .clone();

    let auth_data_bytes = get("authData")
        .and_then(|v| v.as_bytes())
        .ok_or_else(|| Error::invalid_input("attestation object missing authData"))?;

    let auth_data = parse_authenticator_data(auth_data_bytes)?;

    Ok(ParsedAttestationObject {
        auth_data,
        format,
        statement,
    })
}

fn parse_format_name(name: &str) -> Result<AttestationFormat> {
    match name {
        "none" => Ok(AttestationFormat::None),
        "packed" => Ok(AttestationFormat::Packed),
        "fido-u2f" => Ok(AttestationFormat::FidoU2f),
        "android-key" => Ok(AttestationFormat::AndroidKey),
        "tpm" => Ok(AttestationFormat::Tpm),
        "apple" => Ok(AttestationFormat::Apple),
        "android-safetynet" => Ok(AttestationFormat::AndroidSafetynet),
        other => Err(Error::invalid_input(format!(
            "unrecognized attestation statement format {}",
            other
        ))),
    }
}

/// Unpack the raw `authenticatorData` byte layout:
/// `rpIdHash(32) || flags(1) || signCount(4) || [attestedCredentialData] || [extensions]`.
pub fn parse_authenticator_data(raw: &[u8]) -> Result<ParsedAuthenticatorData> {
    if raw.len() < 37 {
        return Err(Error::invalid_input("authenticatorData shorter than minimum 37 bytes"));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&raw[0..32]);
    let flags = AuthenticatorDataFlags::from_byte(raw[32]);
    let sign_count = u32::from_be_bytes([raw[33], raw[34], raw[35], raw[36]]);

    let mut offset = 37;
    let mut aaguid = None;
    let mut credential_id = None;
    let mut credential_public_key_cbor = None;

    if flags.attested_credential_data_included {
        if raw.len() < offset + 16 + 2 {
            return Err(Error::invalid_input("authenticatorData truncated in attested credential data"));
        }
        aaguid = Some(
            Uuid::from_slice(&raw[offset..offset + 16])
                .map_err(|e| Error::invalid_input(format!("invalid aaguid: {}", e)))?,
        );
        offset += 16;

        let cred_id_len = u16::from_be_bytes([raw[offset], raw[offset + 1]]) as usize;
        offset += 2;
        if raw.len() < offset + cred_id_len {
            return Err(Error::invalid_input("authenticatorData truncated in credential id"));
        }
        credential_id = Some(raw[offset..offset + cred_id_len].to_vec());
        offset += cred_id_len;

        // The public key is the first (and for our purposes, only) CBOR item
        // in the remainder; deserializing a `Value` from a reader over the
        // trailing slice stops naturally at the item boundary.
        let remainder = &raw[offset..];
        let mut cursor = std::io::Cursor::new(remainder);
        let key_value: Value = ciborium::de::from_reader(&mut cursor)
            .map_err(|e| Error::invalid_input(format!("malformed credential public key CBOR: {}", e)))?;
        let consumed = cursor.position() as usize;
        let mut key_bytes = Vec::with_capacity(consumed);
        ciborium::ser::into_writer(&key_value, &mut key_bytes)
            .map_err(|e| Error::internal(format!("failed to re-serialize COSE key: {}", e)))?;
        credential_public_key_cbor = Some(key_bytes);
    }

    Ok(ParsedAuthenticatorData {
        rp_id_hash,
        flags,
        sign_count,
        aaguid,
        credential_id,
        credential_public_key_cbor,
        raw: raw.to_vec(),
    })
}

/// Attestation-trust metadata for a given authenticator model, as returned
/// by an (optional) external attestation metadata service.
#[derive(Debug, Clone)]
pub struct MetadataStatement {
    pub aaguid: Uuid,
    pub trusted: bool,
    pub description: Option<String>,
}

/// Optional collaborator providing authenticator metadata (FIDO MDS-style
/// root-of-trust lookups) keyed by AAGUID. Treated as an external
/// dependency: absence or timeout degrades to "attestation unverifiable",
/// never to a hard failure of the ceremony.
#[async_trait::async_trait]
pub trait AttestationMetadataService: Send + Sync {
    async fn lookup(&self, aaguid: Uuid) -> Result<Option<MetadataStatement>>;
}

/// Verify an attestation statement against its authenticator data and the
/// client data hash, returning whether the result can be trusted against a
/// known root.
///
/// `none` attestation is always accepted as untrusted. `packed` and
/// `fido-u2f` (both raw ECDSA/RSA signatures over authData || clientDataHash)
/// are verified using the statement's own embedded certificate's public key
/// when self-attested, otherwise treated as untrusted pending root-of-trust
/// lookup. Other formats (android-key, tpm, apple, android-safetynet) are
/// parsed far enough to extract the signing key but are not validated
/// against a certificate chain; they are reported as attestation-present but
/// untrusted unless a metadata service confirms the AAGUID.
pub async fn verify_attestation_statement(
    crypto: &Arc<dyn CryptoProvider>,
    parsed: &ParsedAttestationObject,
    client_data_hash: &[u8; 32],
    metadata: Option<&Arc<dyn AttestationMetadataService>>,
) -> Result<bool> {
    match parsed.format {
        AttestationFormat::None => Ok(false),
        AttestationFormat::Packed | AttestationFormat::FidoU2f => {
            verify_signature_based_statement(crypto, parsed, client_data_hash)?;
            Ok(lookup_trusted(metadata, parsed.auth_data.aaguid).await)
        }
        AttestationFormat::AndroidKey
        | AttestationFormat::Tpm
        | AttestationFormat::Apple
        | AttestationFormat::AndroidSafetynet => Ok(lookup_trusted(metadata, parsed.auth_data.aaguid).await),
    }
}

async fn lookup_trusted(metadata: Option<&Arc<dyn AttestationMetadataService>>, aaguid: Option<Uuid>) -> bool {
    let (Some(service), Some(aaguid)) = (metadata, aaguid) else {
        return false;
    };

    let timeout = tokio::time::Duration::from_secs(2);
    match tokio::time::timeout(timeout, service.lookup(aaguid)).await {
        Ok(Ok(Some(statement))) => statement.trusted,
        Ok(Ok(None)) | Ok(Err(_)) | Err(_) => false,
    }
}

fn verify_signature_based_statement(
    crypto: &Arc<dyn CryptoProvider>,
    parsed: &ParsedAttestationObject,
    client_data_hash: &[u8; 32],
) -> Result<()> {
    let statement_map = parsed
        .statement
        .as_map()
        .ok_or_else(|| Error::invalid_input("attestation statement is not a CBOR map"))?;

    let get = |name: &str| -> Option<&Value> {
        statement_map
            .iter()
            .find(|(k, _)| k.as_text() == Some(name))
            .map(|(_, v)| v)
    };

    let sig = get("sig")
        .and_then(|v| v.as_bytes())
        .ok_or_else(|| Error::invalid_input("attestation statement missing sig"))?;

    let public_key_cose = parsed
        .auth_data
        .credential_public_key_cbor
        .as_ref()
        .ok_or_else(|| Error::invalid_input("no attested credential public key to verify statement against"))?;

    let key = crypto.parse_cose_key(public_key_cose)?;

    let mut signed_data = parsed.auth_data.raw.clone();
    signed_data.extend_from_slice(client_data_hash);

    crypto.verify_signature(&key, &signed_data, sig)
}
