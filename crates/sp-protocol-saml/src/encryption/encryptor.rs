//! Producing `EncryptedElementType` content for a recipient's public key.

use base64::Engine;
use sp_crypto::cipher::{encrypt_content, encrypt_key, BlockCipher, KeyTransport, OaepDigests};
use sp_crypto::random::random_bytes;
use sp_crypto::{HashAlgorithm, PublicKey};

use crate::error::SamlResult;
use crate::types::{
    EncryptedData, EncryptedElement, EncryptedKey, EncryptionMethod, KeyInfo, KeyInfoItem,
    ENCRYPTED_ELEMENT_TYPE,
};

/// Encrypts serialized elements under a fresh content key.
///
/// The content key is wrapped for `recipient` and carried in the
/// `EncryptedData`'s `KeyInfo`.
#[derive(Debug, Clone, Copy)]
pub struct AssertionEncryptor<'k> {
    recipient: &'k PublicKey,
    cipher: BlockCipher,
    transport: KeyTransport,
}

impl<'k> AssertionEncryptor<'k> {
    /// AES-128-CBC content encryption with RSA-OAEP-MGF1P key transport.
    #[must_use]
    pub const fn new(recipient: &'k PublicKey) -> Self {
        Self {
            recipient,
            cipher: BlockCipher::Aes128Cbc,
            transport: KeyTransport::RsaOaepMgf1p,
        }
    }

    /// Sets the content encryption algorithm.
    #[must_use]
    pub const fn with_cipher(mut self, cipher: BlockCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Sets the key transport algorithm.
    #[must_use]
    pub const fn with_transport(mut self, transport: KeyTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Encrypts `xml`, an element serialization.
    ///
    /// # Errors
    ///
    /// Fails if the content key cannot be wrapped for the recipient.
    pub fn encrypt(&self, xml: &str) -> SamlResult<EncryptedElement> {
        let engine = &base64::engine::general_purpose::STANDARD;
        let content_key = random_bytes(self.cipher.key_len());
        let ciphertext = encrypt_content(self.cipher, &content_key, xml.as_bytes())?;
        let wrapped = encrypt_key(self.recipient, self.transport, OaepDigests::default(), &content_key)?;

        let key_method = match self.transport {
            // xmlenc 1.1 OAEP names its digest explicitly.
            KeyTransport::RsaOaep => EncryptionMethod {
                digest_method: Some(HashAlgorithm::Sha1.uri().to_string()),
                mgf: Some("http://www.w3.org/2009/xmlenc11#mgf1sha1".to_string()),
                ..EncryptionMethod::new(self.transport.uri())
            },
            _ => EncryptionMethod::new(self.transport.uri()),
        };
        let encrypted_key = EncryptedKey {
            id: None,
            recipient: None,
            encryption_method: Some(key_method),
            cipher_value: Some(engine.encode(wrapped)),
        };

        Ok(EncryptedElement {
            encrypted_data: Some(EncryptedData {
                id: Some(crate::types::new_id()),
                type_uri: Some(ENCRYPTED_ELEMENT_TYPE.to_string()),
                encryption_method: Some(EncryptionMethod::new(self.cipher.uri())),
                key_info: Some(KeyInfo {
                    items: vec![KeyInfoItem::EncryptedKey(Box::new(encrypted_key))],
                }),
                cipher_value: Some(engine.encode(ciphertext)),
            }),
            encrypted_keys: Vec::new(),
            namespaces: Vec::new(),
        })
    }
}
