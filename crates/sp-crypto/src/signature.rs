//! RSA PKCS#1 v1.5 and DSA signatures.
//!
//! XML-DSig signs the canonical `SignedInfo` bytes and the Redirect binding
//! signs the raw query string; both reduce to "hash these bytes, then sign
//! the digest". A DSA signature value is the XML-DSig encoding: `r` and `s`
//! as fixed-width big-endian integers, concatenated.

use dsa::signature::{DigestSigner, DigestVerifier};
use rsa::Pkcs1v15Sign;
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha384, Sha512};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::hash::digest;
use crate::keys::{PrivateKey, PrivateMaterial, PublicKey, PublicMaterial};

fn pkcs1v15(algorithm: SignatureAlgorithm) -> Option<Pkcs1v15Sign> {
    match algorithm {
        SignatureAlgorithm::RsaSha1 => Some(Pkcs1v15Sign::new::<Sha1>()),
        SignatureAlgorithm::RsaSha256 => Some(Pkcs1v15Sign::new::<Sha256>()),
        SignatureAlgorithm::RsaSha384 => Some(Pkcs1v15Sign::new::<Sha384>()),
        SignatureAlgorithm::RsaSha512 => Some(Pkcs1v15Sign::new::<Sha512>()),
        SignatureAlgorithm::DsaSha1 => None,
    }
}

/// Byte width of `r` and `s`, the size of the subgroup order `q`.
fn dsa_width(components: &dsa::Components) -> usize {
    components.q().bits().div_ceil(8)
}

fn fixed_width(value: &dsa::BigUint, width: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut out = vec![0; width.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

fn dsa_sign(key: &dsa::SigningKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
    let signature: dsa::Signature = key
        .try_sign_digest(Sha1::new_with_prefix(data))
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    let width = dsa_width(key.verifying_key().components());
    let mut value = fixed_width(signature.r(), width);
    value.extend(fixed_width(signature.s(), width));
    Ok(value)
}

fn dsa_verify(key: &dsa::VerifyingKey, data: &[u8], value: &[u8]) -> bool {
    let width = dsa_width(key.components());
    if value.len() != 2 * width {
        return false;
    }
    let (r, s) = value.split_at(width);
    let Ok(signature) =
        dsa::Signature::from_components(dsa::BigUint::from_bytes_be(r), dsa::BigUint::from_bytes_be(s))
    else {
        return false;
    };
    key.verify_digest(Sha1::new_with_prefix(data), &signature).is_ok()
}

/// Signs `data` with the given algorithm.
///
/// # Errors
///
/// Returns an error if the algorithm does not fit the key type or the key
/// is too small for the digest.
pub fn sign(key: &PrivateKey, algorithm: SignatureAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>> {
    match (key.material(), pkcs1v15(algorithm)) {
        (PrivateMaterial::Rsa(rsa), Some(scheme)) => rsa
            .sign(scheme, &digest(algorithm.hash(), data))
            .map_err(|e| CryptoError::SigningFailed(e.to_string())),
        (PrivateMaterial::Dsa(signing), None) => dsa_sign(signing, data),
        _ => Err(CryptoError::SigningFailed(format!(
            "{} cannot sign with a {} key",
            algorithm.uri(),
            key.key_type()
        ))),
    }
}

/// Verifies a signature over `data`.
///
/// Returns `false` for any mismatch, including an algorithm that does not fit
/// the key type; never errors on attacker-controlled input.
#[must_use]
pub fn verify(key: &PublicKey, algorithm: SignatureAlgorithm, data: &[u8], signature: &[u8]) -> bool {
    match (key.material(), pkcs1v15(algorithm)) {
        (PublicMaterial::Rsa(rsa), Some(scheme)) => rsa
            .verify(scheme, &digest(algorithm.hash(), data), signature)
            .is_ok(),
        (PublicMaterial::Dsa(verifying), None) => dsa_verify(verifying, data, signature),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDP_KEY: &str = include_str!("../../../tests/fixtures/idp-key.pem");
    const ROGUE_KEY: &str = include_str!("../../../tests/fixtures/rogue-key.pem");
    const DSA_KEY: &str = include_str!("../../../tests/fixtures/dsa-key.pem");

    #[test]
    fn sign_and_verify_each_algorithm() {
        let key = PrivateKey::from_pem(IDP_KEY).unwrap();
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
        ] {
            let sig = sign(&key, alg, b"payload").unwrap();
            assert_eq!(sig.len(), 256);
            assert!(verify(&key.public_key(), alg, b"payload", &sig));
        }
    }

    #[test]
    fn tampered_data_fails() {
        let key = PrivateKey::from_pem(IDP_KEY).unwrap();
        let sig = sign(&key, SignatureAlgorithm::RsaSha256, b"payload").unwrap();
        assert!(!verify(&key.public_key(), SignatureAlgorithm::RsaSha256, b"paylaod", &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let key = PrivateKey::from_pem(IDP_KEY).unwrap();
        let rogue = PrivateKey::from_pem(ROGUE_KEY).unwrap();
        let sig = sign(&rogue, SignatureAlgorithm::RsaSha256, b"payload").unwrap();
        assert!(!verify(&key.public_key(), SignatureAlgorithm::RsaSha256, b"payload", &sig));
    }

    #[test]
    fn algorithm_mismatch_fails() {
        let key = PrivateKey::from_pem(IDP_KEY).unwrap();
        let sig = sign(&key, SignatureAlgorithm::RsaSha256, b"payload").unwrap();
        assert!(!verify(&key.public_key(), SignatureAlgorithm::RsaSha512, b"payload", &sig));
    }

    #[test]
    fn dsa_sign_and_verify() {
        let key = PrivateKey::from_pem(DSA_KEY).unwrap();
        let sig = sign(&key, SignatureAlgorithm::DsaSha1, b"payload").unwrap();
        assert_eq!(sig.len(), 40, "r and s are 20 bytes each");
        assert!(verify(&key.public_key(), SignatureAlgorithm::DsaSha1, b"payload", &sig));
        assert!(!verify(&key.public_key(), SignatureAlgorithm::DsaSha1, b"paylaod", &sig));
        assert!(!verify(&key.public_key(), SignatureAlgorithm::DsaSha1, b"payload", &sig[..39]));
    }

    #[test]
    fn key_type_must_match_algorithm() {
        let dsa_key = PrivateKey::from_pem(DSA_KEY).unwrap();
        let rsa_key = PrivateKey::from_pem(IDP_KEY).unwrap();
        assert!(matches!(
            sign(&dsa_key, SignatureAlgorithm::RsaSha256, b"payload"),
            Err(CryptoError::SigningFailed(_))
        ));
        assert!(sign(&rsa_key, SignatureAlgorithm::DsaSha1, b"payload").is_err());

        let sig = sign(&rsa_key, SignatureAlgorithm::RsaSha1, b"payload").unwrap();
        assert!(!verify(&dsa_key.public_key(), SignatureAlgorithm::RsaSha1, b"payload", &sig));
    }
}
