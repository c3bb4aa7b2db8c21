//! Capability catalog.
//!
//! The recognized capability strings are a closed enumeration split into
//! an owner scope and a key scope. Unknown strings are rejected on
//! ingress even when syntactically well-formed; the catalog is not a
//! lattice, and the delegation envelope is plain set containment.

use serde::Serialize;

/// Capabilities grantable to Owner principals (Console surface).
pub const OWNER_SCOPE: &[&str] = &[
    "owners:manage",
    "keys:issue",
    "keys:read",
    "keys:rotate",
    "keys:state:update",
    "groups:manage",
    "keychains:manage",
    "posts:admin:read",
    "posts:access:manage",
];

/// Capabilities grantable to Key principals (Gateway surface).
pub const KEY_SCOPE: &[&str] = &[
    "keys:issue",
    "posts:create",
    "posts:read",
    "comments:write",
    "groups:read",
    "keychains:manage",
    "posts:access:manage",
];

/// Capabilities a use key may never hold.
pub const USE_KEY_FORBIDDEN: &[&str] = &["posts:create", "keys:issue"];

/// A rejected capability request, carrying the offending strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CatalogViolation {
    /// Strings failing the `^[a-z]+(:[a-z_]+)+$` shape.
    Malformed(Vec<String>),
    /// Well-formed strings outside the closed enumeration.
    Unrecognized(Vec<String>),
    /// Child permissions not contained in the parent's set.
    OutsideEnvelope(Vec<String>),
    /// Requested permissions a use key may never hold.
    ForbiddenForUseKey(Vec<String>),
}

/// Syntactic shape check: `^[a-z]+(:[a-z_]+)+$`.
pub fn is_well_formed(s: &str) -> bool {
    let mut segments = s.split(':');
    let Some(head) = segments.next() else {
        return false;
    };
    if head.is_empty() || !head.bytes().all(|b| b.is_ascii_lowercase()) {
        return false;
    }
    let mut rest = 0usize;
    for seg in segments {
        if seg.is_empty() || !seg.bytes().all(|b| b.is_ascii_lowercase() || b == b'_') {
            return false;
        }
        rest += 1;
    }
    rest >= 1
}

/// Sort and de-duplicate a permission set for storage.
pub fn normalize(mut perms: Vec<String>) -> Vec<String> {
    perms.sort();
    perms.dedup();
    perms
}

/// Validate requested key-scope permissions: well-formed and recognized.
///
/// Returns the normalized (sorted, de-duplicated) set.
pub fn validate_key_scope(requested: &[String]) -> Result<Vec<String>, CatalogViolation> {
    let malformed: Vec<String> = requested
        .iter()
        .filter(|p| !is_well_formed(p))
        .cloned()
        .collect();
    if !malformed.is_empty() {
        return Err(CatalogViolation::Malformed(malformed));
    }

    let unrecognized: Vec<String> = requested
        .iter()
        .filter(|p| !KEY_SCOPE.contains(&p.as_str()))
        .cloned()
        .collect();
    if !unrecognized.is_empty() {
        return Err(CatalogViolation::Unrecognized(unrecognized));
    }

    Ok(normalize(requested.to_vec()))
}

/// Envelope rule: child permissions must be a subset of the parent's.
pub fn validate_envelope(child: &[String], parent: &[String]) -> Result<(), CatalogViolation> {
    let missing: Vec<String> = child
        .iter()
        .filter(|p| !parent.iter().any(|q| q == *p))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CatalogViolation::OutsideEnvelope(missing))
    }
}

/// Use keys may never carry the forbidden set.
pub fn validate_use_key(requested: &[String]) -> Result<(), CatalogViolation> {
    let offenders: Vec<String> = requested
        .iter()
        .filter(|p| USE_KEY_FORBIDDEN.contains(&p.as_str()))
        .cloned()
        .collect();
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(CatalogViolation::ForbiddenForUseKey(offenders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_well_formed_shapes() {
        assert!(is_well_formed("posts:read"));
        assert!(is_well_formed("keys:state:update"));
        assert!(is_well_formed("posts:access:manage"));
        assert!(is_well_formed("a:b_c"));

        assert!(!is_well_formed("posts"));
        assert!(!is_well_formed("posts:"));
        assert!(!is_well_formed(":read"));
        assert!(!is_well_formed("Posts:read"));
        assert!(!is_well_formed("posts:Read"));
        assert!(!is_well_formed("posts:re ad"));
        assert!(!is_well_formed("posts:read:"));
        assert!(!is_well_formed("po_sts:read"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn test_catalog_entries_are_well_formed() {
        for cap in OWNER_SCOPE.iter().chain(KEY_SCOPE.iter()) {
            assert!(is_well_formed(cap), "catalog entry {cap} fails shape check");
        }
    }

    #[test]
    fn test_validate_key_scope_rejects_unknown() {
        let err = validate_key_scope(&strings(&["posts:read", "posts:delete"])).unwrap_err();
        assert_eq!(
            err,
            CatalogViolation::Unrecognized(strings(&["posts:delete"]))
        );
    }

    #[test]
    fn test_validate_key_scope_rejects_malformed_before_unknown() {
        let err = validate_key_scope(&strings(&["POSTS:READ", "posts:delete"])).unwrap_err();
        assert_eq!(err, CatalogViolation::Malformed(strings(&["POSTS:READ"])));
    }

    #[test]
    fn test_validate_key_scope_normalizes() {
        let set =
            validate_key_scope(&strings(&["posts:read", "keys:issue", "posts:read"])).unwrap();
        assert_eq!(set, strings(&["keys:issue", "posts:read"]));
    }

    #[test]
    fn test_envelope_containment() {
        let parent = strings(&["posts:create", "posts:read"]);
        assert!(validate_envelope(&strings(&["posts:read"]), &parent).is_ok());

        let err = validate_envelope(&strings(&["posts:create", "keys:issue"]), &parent).unwrap_err();
        assert_eq!(err, CatalogViolation::OutsideEnvelope(strings(&["keys:issue"])));
    }

    #[test]
    fn test_use_key_forbiddens() {
        assert!(validate_use_key(&strings(&["posts:read", "comments:write"])).is_ok());

        let err = validate_use_key(&strings(&["posts:create", "comments:write"])).unwrap_err();
        assert_eq!(
            err,
            CatalogViolation::ForbiddenForUseKey(strings(&["posts:create"]))
        );
    }
}
