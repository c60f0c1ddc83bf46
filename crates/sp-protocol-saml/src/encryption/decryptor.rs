//! Decryption of `EncryptedElementType` content.

use std::fmt::Display;

use base64::Engine;
use sp_crypto::cipher::{decrypt_content, decrypt_key, mgf_from_uri, BlockCipher, KeyTransport, OaepDigests};
use sp_crypto::{HashAlgorithm, PrivateKey};
use tracing::debug;

use crate::error::{SamlError, SamlResult};
use crate::types::{Assertion, Attribute, EncryptedElement, EncryptedKey, NameId};
use crate::xml::Document;

fn decryption(err: impl Display) -> SamlError {
    SamlError::Decryption(err.to_string())
}

/// Decrypts encrypted SAML elements with a borrowed private key.
#[derive(Debug, Clone, Copy)]
pub struct AssertionDecryptor<'k> {
    key: &'k PrivateKey,
}

impl<'k> AssertionDecryptor<'k> {
    /// Creates a decryptor using `key` for key transport.
    #[must_use]
    pub const fn new(key: &'k PrivateKey) -> Self {
        Self { key }
    }

    /// Decrypts the element and parses the plaintext. Prefixes used in the
    /// plaintext may be bound by the wrapper's namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Decryption`] for every failure: missing
    /// structure, unsupported algorithms, a key that does not fit, corrupt
    /// ciphertext or plaintext that is not XML.
    pub fn decrypt(&self, encrypted: &EncryptedElement) -> SamlResult<Document> {
        let data = encrypted
            .encrypted_data
            .as_ref()
            .ok_or_else(|| decryption("missing EncryptedData"))?;
        let method = data
            .encryption_method
            .as_ref()
            .ok_or_else(|| decryption("EncryptedData has no EncryptionMethod"))?;
        let cipher = BlockCipher::from_uri(&method.algorithm).map_err(decryption)?;
        let cipher_value = data
            .cipher_value
            .as_deref()
            .ok_or_else(|| decryption("EncryptedData has no CipherValue"))?;

        let candidates: Vec<&EncryptedKey> = data
            .key_info
            .iter()
            .flat_map(|key_info| key_info.encrypted_keys())
            .chain(encrypted.encrypted_keys.iter())
            .collect();
        if candidates.is_empty() {
            return Err(decryption("no EncryptedKey"));
        }

        let mut last_error = None;
        let content_key = candidates.iter().find_map(|candidate| {
            match self.unwrap_key(candidate, cipher) {
                Ok(key) => Some(key),
                Err(err) => {
                    debug!(error = %err, "EncryptedKey did not unwrap");
                    last_error = Some(err);
                    None
                }
            }
        });
        let content_key = match content_key {
            Some(key) => key,
            None => return Err(last_error.unwrap_or_else(|| decryption("no usable EncryptedKey"))),
        };

        let ciphertext = decode(cipher_value)?;
        let plaintext = decrypt_content(cipher, &content_key, &ciphertext).map_err(decryption)?;
        let plaintext = String::from_utf8(plaintext).map_err(decryption)?;
        Document::parse_fragment(&plaintext, &encrypted.namespaces).map_err(decryption)
    }

    /// Decrypts an `EncryptedAssertion`. The returned document keeps the
    /// plaintext so its signature can be checked.
    ///
    /// # Errors
    ///
    /// See [`AssertionDecryptor::decrypt`]; plaintext that is not an
    /// assertion is a [`SamlError::Decryption`] too.
    pub fn decrypt_assertion(&self, encrypted: &EncryptedElement) -> SamlResult<(Document, Assertion)> {
        let document = self.decrypt(encrypted)?;
        let assertion = Assertion::from_element(document.root()).map_err(decryption)?;
        Ok((document, assertion))
    }

    /// Decrypts an `EncryptedID`.
    ///
    /// # Errors
    ///
    /// See [`AssertionDecryptor::decrypt_assertion`].
    pub fn decrypt_name_id(&self, encrypted: &EncryptedElement) -> SamlResult<NameId> {
        let document = self.decrypt(encrypted)?;
        NameId::from_element(document.root()).map_err(decryption)
    }

    /// Decrypts an `EncryptedAttribute`.
    ///
    /// # Errors
    ///
    /// See [`AssertionDecryptor::decrypt_assertion`].
    pub fn decrypt_attribute(&self, encrypted: &EncryptedElement) -> SamlResult<Attribute> {
        let document = self.decrypt(encrypted)?;
        Attribute::from_element(document.root()).map_err(decryption)
    }

    fn unwrap_key(&self, encrypted_key: &EncryptedKey, cipher: BlockCipher) -> SamlResult<Vec<u8>> {
        let method = encrypted_key
            .encryption_method
            .as_ref()
            .ok_or_else(|| decryption("EncryptedKey has no EncryptionMethod"))?;
        let transport = KeyTransport::from_uri(&method.algorithm).map_err(decryption)?;
        let mut digests = OaepDigests::default();
        if let Some(digest) = &method.digest_method {
            digests.digest = HashAlgorithm::from_uri(digest).map_err(decryption)?;
        }
        if let Some(mgf) = &method.mgf {
            digests.mgf = mgf_from_uri(mgf).map_err(decryption)?;
        }
        let wrapped = decode(
            encrypted_key
                .cipher_value
                .as_deref()
                .ok_or_else(|| decryption("EncryptedKey has no CipherValue"))?,
        )?;
        let key = decrypt_key(self.key, transport, digests, &wrapped).map_err(decryption)?;
        if key.len() != cipher.key_len() {
            return Err(decryption(format!(
                "content key is {} bytes, {} needs {}",
                key.len(),
                cipher.uri(),
                cipher.key_len()
            )));
        }
        Ok(key)
    }
}

fn decode(value: &str) -> SamlResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| decryption(format!("CipherValue is not base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::AssertionEncryptor;
    use crate::test_support::{IDP_KEY, SP_KEY};
    use crate::types::{Subject, SAML_NS};
    use crate::ErrorKind;

    fn sp_key() -> PrivateKey {
        PrivateKey::from_pem(SP_KEY).unwrap()
    }

    fn assertion_xml() -> String {
        Assertion::new("https://idp.example.org")
            .with_subject(Subject::new(NameId::new("alice")))
            .to_xml()
    }

    #[test]
    fn decrypts_what_was_encrypted() {
        let key = sp_key();
        for (cipher, transport) in [
            (BlockCipher::Aes128Cbc, KeyTransport::RsaOaepMgf1p),
            (BlockCipher::Aes256Cbc, KeyTransport::RsaOaep),
            (BlockCipher::Aes128Gcm, KeyTransport::RsaOaepMgf1p),
            (BlockCipher::Aes256Gcm, KeyTransport::RsaPkcs1v15),
        ] {
            let encrypted = AssertionEncryptor::new(&key.public_key())
                .with_cipher(cipher)
                .with_transport(transport)
                .encrypt(&assertion_xml())
                .unwrap();
            let (document, assertion) = AssertionDecryptor::new(&key)
                .decrypt_assertion(&encrypted)
                .unwrap();
            assert!(document.root().is(SAML_NS, "Assertion"));
            assert_eq!(assertion.subject.unwrap().name_id().unwrap().value, "alice");
        }
    }

    #[test]
    fn wrong_key_is_a_decryption_error() {
        let encrypted = AssertionEncryptor::new(&sp_key().public_key())
            .encrypt(&assertion_xml())
            .unwrap();
        let other = PrivateKey::from_pem(IDP_KEY).unwrap();
        let err = AssertionDecryptor::new(&other).decrypt(&encrypted).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[test]
    fn corrupt_ciphertext_is_a_decryption_error() {
        let key = sp_key();
        let mut encrypted = AssertionEncryptor::new(&key.public_key())
            .with_cipher(BlockCipher::Aes128Gcm)
            .encrypt(&assertion_xml())
            .unwrap();
        let data = encrypted.encrypted_data.as_mut().unwrap();
        let mut bytes = decode(data.cipher_value.as_deref().unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        data.cipher_value = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
        assert!(matches!(
            AssertionDecryptor::new(&key).decrypt(&encrypted),
            Err(SamlError::Decryption(_))
        ));
    }

    #[test]
    fn unsupported_algorithm_is_a_decryption_error() {
        let key = sp_key();
        let mut encrypted = AssertionEncryptor::new(&key.public_key())
            .encrypt(&assertion_xml())
            .unwrap();
        encrypted
            .encrypted_data
            .as_mut()
            .unwrap()
            .encryption_method
            .as_mut()
            .unwrap()
            .algorithm = "http://www.w3.org/2001/04/xmlenc#tripledes-cbc".to_string();
        let err = AssertionDecryptor::new(&key).decrypt(&encrypted).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decryption);
    }

    #[test]
    fn missing_key_is_a_decryption_error() {
        let key = sp_key();
        let mut encrypted = AssertionEncryptor::new(&key.public_key())
            .encrypt(&assertion_xml())
            .unwrap();
        encrypted.encrypted_data.as_mut().unwrap().key_info = None;
        encrypted.encrypted_keys.clear();
        assert!(matches!(
            AssertionDecryptor::new(&key).decrypt(&encrypted),
            Err(SamlError::Decryption(_))
        ));
    }

    #[test]
    fn plaintext_inherits_wrapper_namespaces() {
        let key = sp_key();
        let inner =
            "<saml:NameID Format=\"urn:oasis:names:tc:SAML:2.0:nameid-format:persistent\">p-123</saml:NameID>";
        let wrapper = AssertionEncryptor::new(&key.public_key()).encrypt(inner).unwrap();
        let reparsed = EncryptedElement::from_element(
            Document::parse(&wrapper.to_xml("EncryptedID")).unwrap().root(),
        )
        .unwrap();
        let name_id = AssertionDecryptor::new(&key).decrypt_name_id(&reparsed).unwrap();
        assert_eq!(name_id.value, "p-123");
    }
}
