//! Identifier codec.
//!
//! Internal identifiers are 16-byte opaque values carried as `Uuid`.
//! Externally they appear as 32 lowercase hex characters. Key public ids
//! are a separate namespace: `apub_` + 16 lowercase hex characters.

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use uuid::Uuid;

/// Length of the external hex form of an internal id.
const EXTERNAL_LEN: usize = 32;

/// Prefix of the key public-id namespace.
pub const PUBLIC_ID_PREFIX: &str = "apub_";

/// Hex characters following the `apub_` prefix.
const PUBLIC_ID_HEX_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed identifier")]
pub struct BadIdFormat;

/// Draw a fresh identifier: 16 cryptographically random bytes.
pub fn fresh_id() -> Uuid {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    Uuid::from_bytes(bytes)
}

/// Render an internal id in its external hex32 form.
pub fn to_external(id: Uuid) -> String {
    id.simple().to_string()
}

/// Parse an external hex32 string back into an internal id.
///
/// Strict: exactly 32 characters from `[0-9a-f]`; uppercase is rejected.
pub fn from_external(s: &str) -> Result<Uuid, BadIdFormat> {
    if s.len() != EXTERNAL_LEN || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(BadIdFormat);
    }
    Uuid::try_parse(s).map_err(|_| BadIdFormat)
}

/// Generate a fresh key public id: `apub_` + hex of 8 random bytes.
pub fn fresh_public_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", PUBLIC_ID_PREFIX, hex::encode(bytes))
}

/// Validate the shape of a presented key public id.
pub fn is_public_id(s: &str) -> bool {
    s.strip_prefix(PUBLIC_ID_PREFIX).is_some_and(|rest| {
        rest.len() == PUBLIC_ID_HEX_LEN
            && rest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_round_trip() {
        let id = fresh_id();
        let ext = to_external(id);
        assert_eq!(ext.len(), 32);
        assert!(ext.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        assert_eq!(from_external(&ext).unwrap(), id);
    }

    #[test]
    fn test_from_external_rejects_bad_shapes() {
        assert_eq!(from_external(""), Err(BadIdFormat));
        assert_eq!(from_external("abc"), Err(BadIdFormat));
        // Uppercase hex is not the external form.
        assert_eq!(
            from_external("ABCDEF00112233445566778899AABBCC"),
            Err(BadIdFormat)
        );
        // Hyphenated uuid form is not accepted on the wire.
        assert_eq!(
            from_external("550e8400-e29b-41d4-a716-4466554400"),
            Err(BadIdFormat)
        );
        // 32 chars but not hex.
        assert_eq!(
            from_external("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"),
            Err(BadIdFormat)
        );
    }

    #[test]
    fn test_fresh_ids_are_distinct() {
        assert_ne!(fresh_id(), fresh_id());
    }

    #[test]
    fn test_public_id_shape() {
        let pid = fresh_public_id();
        assert!(pid.starts_with("apub_"));
        assert_eq!(pid.len(), 5 + 16);
        assert!(is_public_id(&pid));
    }

    #[test]
    fn test_public_id_validation_rejects_variants() {
        assert!(!is_public_id("apub_"));
        assert!(!is_public_id("apub_XYZ"));
        assert!(!is_public_id("pub_0011223344556677"));
        assert!(!is_public_id("apub_00112233445566778899"));
    }
}
