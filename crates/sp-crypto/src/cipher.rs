//! XML Encryption algorithms.
//!
//! Key transport (RSA-OAEP, RSA PKCS#1 v1.5) recovers the content-encryption
//! key; block ciphers (AES-CBC, AES-GCM) recover the plaintext. Ciphertext
//! layouts follow XML Encryption: CBC output is `IV || ciphertext` with
//! ISO 10126 padding, GCM output is `nonce(12) || ciphertext || tag(16)`.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt};
use sha1::Sha1;
use sha2::Sha256;

use crate::algorithm::HashAlgorithm;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PrivateKey, PublicKey};
use crate::random::random_bytes;

const AES_BLOCK: usize = 16;
const GCM_NONCE: usize = 12;
const GCM_TAG: usize = 16;

/// Symmetric content-encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCipher {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-192 in CBC mode.
    Aes192Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
}

impl BlockCipher {
    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes192Cbc => "http://www.w3.org/2001/04/xmlenc#aes192-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
            Self::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            Self::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }

    /// Parses an `EncryptionMethod` URI.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or unsupported algorithms.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#aes128-cbc" => Ok(Self::Aes128Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes192-cbc" => Ok(Self::Aes192Cbc),
            "http://www.w3.org/2001/04/xmlenc#aes256-cbc" => Ok(Self::Aes256Cbc),
            "http://www.w3.org/2009/xmlenc11#aes128-gcm" => Ok(Self::Aes128Gcm),
            "http://www.w3.org/2009/xmlenc11#aes256-gcm" => Ok(Self::Aes256Gcm),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc | Self::Aes128Gcm => 16,
            Self::Aes192Cbc => 24,
            Self::Aes256Cbc | Self::Aes256Gcm => 32,
        }
    }
}

/// RSA key-transport algorithms for `EncryptedKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransport {
    /// RSA-OAEP with MGF1/SHA-1 (`xmlenc#rsa-oaep-mgf1p`).
    RsaOaepMgf1p,
    /// RSA-OAEP with explicit digest and MGF (`xmlenc11#rsa-oaep`).
    RsaOaep,
    /// RSA PKCS#1 v1.5 (`xmlenc#rsa-1_5`).
    RsaPkcs1v15,
}

impl KeyTransport {
    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p",
            Self::RsaOaep => "http://www.w3.org/2009/xmlenc11#rsa-oaep",
            Self::RsaPkcs1v15 => "http://www.w3.org/2001/04/xmlenc#rsa-1_5",
        }
    }

    /// Parses an `EncryptionMethod` URI.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or unsupported algorithms.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p" => Ok(Self::RsaOaepMgf1p),
            "http://www.w3.org/2009/xmlenc11#rsa-oaep" => Ok(Self::RsaOaep),
            "http://www.w3.org/2001/04/xmlenc#rsa-1_5" => Ok(Self::RsaPkcs1v15),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Digest choices for OAEP key transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OaepDigests {
    /// Digest applied to the label.
    pub digest: HashAlgorithm,
    /// Digest used by MGF1.
    pub mgf: HashAlgorithm,
}

impl Default for OaepDigests {
    fn default() -> Self {
        Self {
            digest: HashAlgorithm::Sha1,
            mgf: HashAlgorithm::Sha1,
        }
    }
}

/// Parses an `xmlenc11` MGF algorithm URI into its digest.
///
/// # Errors
///
/// Returns an error for unknown MGF identifiers.
pub fn mgf_from_uri(uri: &str) -> CryptoResult<HashAlgorithm> {
    match uri {
        "http://www.w3.org/2009/xmlenc11#mgf1sha1" => Ok(HashAlgorithm::Sha1),
        "http://www.w3.org/2009/xmlenc11#mgf1sha256" => Ok(HashAlgorithm::Sha256),
        "http://www.w3.org/2009/xmlenc11#mgf1sha384" => Ok(HashAlgorithm::Sha384),
        "http://www.w3.org/2009/xmlenc11#mgf1sha512" => Ok(HashAlgorithm::Sha512),
        other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn oaep(digests: OaepDigests) -> CryptoResult<Oaep> {
    match (digests.digest, digests.mgf) {
        (HashAlgorithm::Sha1, HashAlgorithm::Sha1) => Ok(Oaep::new::<Sha1>()),
        (HashAlgorithm::Sha256, HashAlgorithm::Sha1) => Ok(Oaep::new_with_mgf_hash::<Sha256, Sha1>()),
        (HashAlgorithm::Sha1, HashAlgorithm::Sha256) => Ok(Oaep::new_with_mgf_hash::<Sha1, Sha256>()),
        (HashAlgorithm::Sha256, HashAlgorithm::Sha256) => Ok(Oaep::new::<Sha256>()),
        (digest, mgf) => Err(CryptoError::UnsupportedAlgorithm(format!(
            "OAEP with {} / MGF1 {}",
            digest.uri(),
            mgf.uri()
        ))),
    }
}

/// Decrypts a transported content-encryption key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for a DSA key and
/// [`CryptoError::DecryptionFailed`] for a wrong key or corrupt input.
pub fn decrypt_key(
    key: &PrivateKey,
    transport: KeyTransport,
    digests: OaepDigests,
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let rsa = key.rsa()?;
    let result = match transport {
        KeyTransport::RsaOaepMgf1p => rsa.decrypt(Oaep::new::<Sha1>(), ciphertext),
        KeyTransport::RsaOaep => rsa.decrypt(oaep(digests)?, ciphertext),
        KeyTransport::RsaPkcs1v15 => rsa.decrypt(Pkcs1v15Encrypt, ciphertext),
    };
    result.map_err(|e| CryptoError::DecryptionFailed(format!("key transport: {e}")))
}

/// Encrypts a content-encryption key for the holder of `key`.
///
/// # Errors
///
/// Returns an error if the key material is too long for the RSA modulus.
pub fn encrypt_key(
    key: &PublicKey,
    transport: KeyTransport,
    digests: OaepDigests,
    content_key: &[u8],
) -> CryptoResult<Vec<u8>> {
    let mut rng = OsRng;
    let rsa = key.rsa()?;
    let result = match transport {
        KeyTransport::RsaOaepMgf1p => rsa.encrypt(&mut rng, Oaep::new::<Sha1>(), content_key),
        KeyTransport::RsaOaep => rsa.encrypt(&mut rng, oaep(digests)?, content_key),
        KeyTransport::RsaPkcs1v15 => rsa.encrypt(&mut rng, Pkcs1v15Encrypt, content_key),
    };
    result.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

macro_rules! cbc_decrypt {
    ($aes:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Decryptor::<$aes>::new_from_slices($key, $iv)
            .map_err(|e| CryptoError::DecryptionFailed(format!("key length: {e}")))?
            .decrypt_padded_vec_mut::<NoPadding>($data)
            .map_err(|_| CryptoError::DecryptionFailed("ciphertext is not block aligned".to_string()))?
    };
}

macro_rules! cbc_encrypt {
    ($aes:ty, $key:expr, $iv:expr, $data:expr) => {
        cbc::Encryptor::<$aes>::new_from_slices($key, $iv)
            .map_err(|e| CryptoError::EncryptionFailed(format!("key length: {e}")))?
            .encrypt_padded_vec_mut::<NoPadding>($data)
    };
}

/// Decrypts `CipherValue` bytes with a content-encryption key.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] on wrong key length, truncated
/// input, bad padding or authentication failure.
pub fn decrypt_content(cipher: BlockCipher, key: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::DecryptionFailed(format!(
            "expected a {}-byte key, got {}",
            cipher.key_len(),
            key.len()
        )));
    }

    match cipher {
        BlockCipher::Aes128Cbc | BlockCipher::Aes192Cbc | BlockCipher::Aes256Cbc => {
            if data.len() < 2 * AES_BLOCK {
                return Err(CryptoError::DecryptionFailed("ciphertext too short".to_string()));
            }
            let (iv, body) = data.split_at(AES_BLOCK);
            let padded = match cipher {
                BlockCipher::Aes128Cbc => cbc_decrypt!(aes::Aes128, key, iv, body),
                BlockCipher::Aes192Cbc => cbc_decrypt!(aes::Aes192, key, iv, body),
                _ => cbc_decrypt!(aes::Aes256, key, iv, body),
            };
            strip_iso10126(padded)
        }
        BlockCipher::Aes128Gcm | BlockCipher::Aes256Gcm => {
            if data.len() < GCM_NONCE + GCM_TAG {
                return Err(CryptoError::DecryptionFailed("ciphertext too short".to_string()));
            }
            let (nonce, body) = data.split_at(GCM_NONCE);
            let nonce = Nonce::from_slice(nonce);
            let result = if cipher == BlockCipher::Aes128Gcm {
                Aes128Gcm::new_from_slice(key)
                    .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
                    .decrypt(nonce, body)
            } else {
                Aes256Gcm::new_from_slice(key)
                    .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?
                    .decrypt(nonce, body)
            };
            result.map_err(|_| CryptoError::DecryptionFailed("authentication tag mismatch".to_string()))
        }
    }
}

/// Encrypts plaintext into `CipherValue` layout with a fresh IV or nonce.
///
/// # Errors
///
/// Returns an error on wrong key length.
pub fn encrypt_content(cipher: BlockCipher, key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != cipher.key_len() {
        return Err(CryptoError::EncryptionFailed(format!(
            "expected a {}-byte key, got {}",
            cipher.key_len(),
            key.len()
        )));
    }

    match cipher {
        BlockCipher::Aes128Cbc | BlockCipher::Aes192Cbc | BlockCipher::Aes256Cbc => {
            let iv = random_bytes(AES_BLOCK);
            let padded = pad_iso10126(plaintext);
            let body = match cipher {
                BlockCipher::Aes128Cbc => cbc_encrypt!(aes::Aes128, key, &iv, &padded),
                BlockCipher::Aes192Cbc => cbc_encrypt!(aes::Aes192, key, &iv, &padded),
                _ => cbc_encrypt!(aes::Aes256, key, &iv, &padded),
            };
            Ok([iv, body].concat())
        }
        BlockCipher::Aes128Gcm | BlockCipher::Aes256Gcm => {
            let nonce_bytes = random_bytes(GCM_NONCE);
            let nonce = Nonce::from_slice(&nonce_bytes);
            let result = if cipher == BlockCipher::Aes128Gcm {
                Aes128Gcm::new_from_slice(key)
                    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?
                    .encrypt(nonce, plaintext)
            } else {
                Aes256Gcm::new_from_slice(key)
                    .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?
                    .encrypt(nonce, plaintext)
            };
            let body = result.map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
            Ok([nonce_bytes, body].concat())
        }
    }
}

/// ISO 10126: random filler, final byte holds the pad length (1..=16).
fn pad_iso10126(plaintext: &[u8]) -> Vec<u8> {
    let pad = AES_BLOCK - plaintext.len() % AES_BLOCK;
    let mut padded = plaintext.to_vec();
    padded.extend(random_bytes(pad - 1));
    // pad is at most 16
    padded.push(u8::try_from(pad).unwrap_or(16));
    padded
}

fn strip_iso10126(mut padded: Vec<u8>) -> CryptoResult<Vec<u8>> {
    let pad = usize::from(*padded.last().ok_or_else(|| {
        CryptoError::DecryptionFailed("empty plaintext".to_string())
    })?);
    if pad == 0 || pad > AES_BLOCK || pad > padded.len() {
        return Err(CryptoError::DecryptionFailed("invalid padding".to_string()));
    }
    padded.truncate(padded.len() - pad);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP_KEY: &str = include_str!("../../../tests/fixtures/sp-key.pem");
    const ROGUE_KEY: &str = include_str!("../../../tests/fixtures/rogue-key.pem");

    #[test]
    fn content_roundtrip_each_cipher() {
        let plaintext = b"<saml:Assertion>confidential</saml:Assertion>";
        for cipher in [
            BlockCipher::Aes128Cbc,
            BlockCipher::Aes192Cbc,
            BlockCipher::Aes256Cbc,
            BlockCipher::Aes128Gcm,
            BlockCipher::Aes256Gcm,
        ] {
            let key = random_bytes(cipher.key_len());
            let ct = encrypt_content(cipher, &key, plaintext).unwrap();
            assert_eq!(decrypt_content(cipher, &key, &ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn block_aligned_plaintext_gets_full_pad_block() {
        let key = random_bytes(16);
        let plaintext = [7u8; 32];
        let ct = encrypt_content(BlockCipher::Aes128Cbc, &key, &plaintext).unwrap();
        assert_eq!(ct.len(), 16 + 48);
        assert_eq!(decrypt_content(BlockCipher::Aes128Cbc, &key, &ct).unwrap(), plaintext);
    }

    #[test]
    fn gcm_detects_tampering() {
        let key = random_bytes(32);
        let mut ct = encrypt_content(BlockCipher::Aes256Gcm, &key, b"secret").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(decrypt_content(BlockCipher::Aes256Gcm, &key, &ct).is_err());
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let err = decrypt_content(BlockCipher::Aes256Cbc, &[0u8; 16], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(_)));
    }

    #[test]
    fn key_transport_roundtrip() {
        let key = PrivateKey::from_pem(SP_KEY).unwrap();
        let content_key = random_bytes(16);
        for transport in [KeyTransport::RsaOaepMgf1p, KeyTransport::RsaOaep, KeyTransport::RsaPkcs1v15] {
            let wrapped =
                encrypt_key(&key.public_key(), transport, OaepDigests::default(), &content_key).unwrap();
            let unwrapped = decrypt_key(&key, transport, OaepDigests::default(), &wrapped).unwrap();
            assert_eq!(unwrapped, content_key);
        }
    }

    #[test]
    fn key_transport_with_wrong_key_fails() {
        let key = PrivateKey::from_pem(SP_KEY).unwrap();
        let rogue = PrivateKey::from_pem(ROGUE_KEY).unwrap();
        let wrapped = encrypt_key(
            &key.public_key(),
            KeyTransport::RsaOaepMgf1p,
            OaepDigests::default(),
            &[1u8; 16],
        )
        .unwrap();
        assert!(decrypt_key(&rogue, KeyTransport::RsaOaepMgf1p, OaepDigests::default(), &wrapped).is_err());
    }

    #[test]
    fn oaep_sha256_digest() {
        let key = PrivateKey::from_pem(SP_KEY).unwrap();
        let digests = OaepDigests {
            digest: HashAlgorithm::Sha256,
            mgf: HashAlgorithm::Sha1,
        };
        let wrapped = encrypt_key(&key.public_key(), KeyTransport::RsaOaep, digests, &[9u8; 32]).unwrap();
        assert_eq!(decrypt_key(&key, KeyTransport::RsaOaep, digests, &wrapped).unwrap(), [9u8; 32]);
    }

    #[test]
    fn uris_roundtrip() {
        assert_eq!(
            BlockCipher::from_uri(BlockCipher::Aes256Gcm.uri()).unwrap(),
            BlockCipher::Aes256Gcm
        );
        assert_eq!(
            KeyTransport::from_uri(KeyTransport::RsaPkcs1v15.uri()).unwrap(),
            KeyTransport::RsaPkcs1v15
        );
        assert!(BlockCipher::from_uri("http://www.w3.org/2001/04/xmlenc#tripledes-cbc").is_err());
    }
}
