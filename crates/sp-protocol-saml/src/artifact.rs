//! SAML 2.0 artifact codec (type code `0x0004`).
//!
//! An artifact is 44 bytes, base64-encoded:
//!
//! | bytes  | field                                     |
//! |--------|-------------------------------------------|
//! | 0..2   | type code, big-endian                     |
//! | 2..4   | artifact resolution endpoint index, BE    |
//! | 4..24  | SHA-1 of the issuer's entity ID           |
//! | 24..44 | random message handle                     |

use base64::Engine;

/// Decoded artifact length in bytes.
pub const ARTIFACT_LENGTH: usize = 44;

/// Type code of SAML 2.0 artifacts.
pub const SAML2_ARTIFACT_TYPE: u16 = 0x0004;

/// A decoded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Artifact {
    /// Type code.
    pub type_code: u16,
    /// Index of the issuer's artifact resolution endpoint.
    pub endpoint_index: u16,
    /// SHA-1 of the issuer's entity ID.
    pub source_id: [u8; 20],
    /// Random handle naming the pending message.
    pub message_handle: [u8; 20],
}

impl Artifact {
    /// Mints a type `0x0004` artifact for `entity_id` with a fresh handle.
    #[must_use]
    pub fn mint(entity_id: &str, endpoint_index: u16) -> Self {
        Self {
            type_code: SAML2_ARTIFACT_TYPE,
            endpoint_index,
            source_id: generate_source_id_hash(entity_id),
            message_handle: generate_message_handle(),
        }
    }

    /// Packs the artifact into its 44 raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ARTIFACT_LENGTH] {
        let mut bytes = [0u8; ARTIFACT_LENGTH];
        bytes[0..2].copy_from_slice(&self.type_code.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.endpoint_index.to_be_bytes());
        bytes[4..24].copy_from_slice(&self.source_id);
        bytes[24..44].copy_from_slice(&self.message_handle);
        bytes
    }

    /// Unpacks raw bytes; `None` unless exactly 44 bytes long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; ARTIFACT_LENGTH] = bytes.try_into().ok()?;
        let mut source_id = [0u8; 20];
        let mut message_handle = [0u8; 20];
        source_id.copy_from_slice(&bytes[4..24]);
        message_handle.copy_from_slice(&bytes[24..44]);
        Some(Self {
            type_code: u16::from_be_bytes([bytes[0], bytes[1]]),
            endpoint_index: u16::from_be_bytes([bytes[2], bytes[3]]),
            source_id,
            message_handle,
        })
    }

    /// Returns the base64 form carried in `SAMLart`.
    #[must_use]
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    /// Returns true if the artifact was minted by `entity_id`.
    #[must_use]
    pub fn is_from(&self, entity_id: &str) -> bool {
        self.source_id == generate_source_id_hash(entity_id)
    }
}

/// Packs and base64-encodes an artifact.
#[must_use]
pub fn create_artifact(
    type_code: u16,
    endpoint_index: u16,
    source_id_hash: &[u8; 20],
    message_handle: &[u8; 20],
) -> String {
    Artifact {
        type_code,
        endpoint_index,
        source_id: *source_id_hash,
        message_handle: *message_handle,
    }
    .encode()
}

/// Decodes a base64 artifact. Returns `None` for invalid base64 or a
/// decoded length other than 44 bytes.
#[must_use]
pub fn try_parse_artifact(artifact: &str) -> Option<Artifact> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(artifact.trim())
        .ok()?;
    Artifact::from_bytes(&bytes)
}

/// SHA-1 of an entity ID, the artifact source ID.
#[must_use]
pub fn generate_source_id_hash(entity_id: &str) -> [u8; 20] {
    sp_crypto::sha1(entity_id.as_bytes())
}

/// 20 bytes from the operating system CSPRNG.
#[must_use]
pub fn generate_message_handle() -> [u8; 20] {
    sp_crypto::random::random_array::<20>()
}

/// Finds the entity whose source ID matches the artifact.
pub fn match_source<'a, T>(
    artifact: &Artifact,
    candidates: impl IntoIterator<Item = &'a T>,
    entity_id: impl Fn(&T) -> &str,
) -> Option<&'a T>
where
    T: 'a + ?Sized,
{
    candidates
        .into_iter()
        .find(|candidate| generate_source_id_hash(entity_id(*candidate)) == artifact.source_id)
}
