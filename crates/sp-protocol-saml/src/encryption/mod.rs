//! XML Encryption of assertions and identifiers.
//!
//! [`AssertionDecryptor`] recovers the plaintext of an `EncryptedAssertion`,
//! `EncryptedID` or `EncryptedAttribute` with the service provider's private
//! key. Decryption proves nothing about the origin of the plaintext: a
//! decrypted assertion is signature-checked like any other.
//!
//! [`AssertionEncryptor`] produces the same structures and is used to build
//! fixtures and to exercise the decryptor.

mod decryptor;
mod encryptor;

pub use decryptor::AssertionDecryptor;
pub use encryptor::AssertionEncryptor;
