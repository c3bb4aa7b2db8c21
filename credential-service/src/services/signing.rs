//! Token signing service.
//!
//! Produces and verifies compact RS256 access tokens and publishes the
//! verification key set. The service is a value: it is constructed with
//! one private key and the full list of accepted public keys, and
//! rotation means constructing a new service with an extended list.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use uuid::Uuid;

use crate::config::{SigningConfig, TokenConfig};
use crate::models::{id, KeyType};

/// Token types bound to surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Owner,
    Key,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Owner => "owner",
            TokenType::Key => "key",
        }
    }
}

/// Why a presented token was rejected. For logging and tests only;
/// callers surface a single generic `unauthorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    Malformed,
    Algorithm,
    Signature,
    Expired,
    NotYetValid,
    Issuer,
    Audience,
    Type,
}

impl VerifyFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyFailure::Malformed => "malformed",
            VerifyFailure::Algorithm => "algorithm",
            VerifyFailure::Signature => "signature",
            VerifyFailure::Expired => "expired",
            VerifyFailure::NotYetValid => "not_yet_valid",
            VerifyFailure::Issuer => "issuer",
            VerifyFailure::Audience => "audience",
            VerifyFailure::Type => "type",
        }
    }
}

/// Claims carried by every access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub typ: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_public_id: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// JWK representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub r#use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// JWKS representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// RS256 signer/verifier with a published key set.
#[derive(Clone)]
pub struct SigningService {
    encoding_key: EncodingKey,
    active_kid: String,
    decoding_keys: HashMap<String, DecodingKey>,
    jwks: Jwks,
    issuer: String,
    console_audience: String,
    gateway_audience: String,
    access_token_ttl_seconds: i64,
    leeway_seconds: i64,
}

impl SigningService {
    /// Load keys from disk and build the verification set. Fails fast on
    /// unparseable key material.
    pub fn new(token: &TokenConfig, signing: &SigningConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&signing.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                signing.private_key_path,
                e
            )
        })?;
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

        let mut decoding_keys = HashMap::new();
        let mut jwks = Jwks { keys: Vec::new() };
        for public in &signing.public_keys {
            let pem = fs::read_to_string(&public.path).map_err(|e| {
                anyhow::anyhow!("Failed to read public key from {}: {}", public.path, e)
            })?;
            let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| anyhow::anyhow!("Failed to parse public key {}: {}", public.kid, e))?;
            decoding_keys.insert(public.kid.clone(), decoding_key);
            jwks.keys.push(jwk_from_pem(&public.kid, &pem)?);
        }

        tracing::info!(
            active_kid = %signing.active_kid,
            published_keys = jwks.keys.len(),
            "Signing service initialized with RS256 keys"
        );

        Ok(Self {
            encoding_key,
            active_kid: signing.active_kid.clone(),
            decoding_keys,
            jwks,
            issuer: token.issuer.clone(),
            console_audience: token.console_audience.clone(),
            gateway_audience: token.gateway_audience.clone(),
            access_token_ttl_seconds: token.access_token_ttl_seconds,
            leeway_seconds: token.leeway_seconds,
        })
    }

    /// The published verification key set. Only public keys appear.
    pub fn jwks(&self) -> &Jwks {
        &self.jwks
    }

    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub fn audience_for(&self, token_type: TokenType) -> &str {
        match token_type {
            TokenType::Owner => &self.console_audience,
            TokenType::Key => &self.gateway_audience,
        }
    }

    /// Issue an owner token for the Console surface.
    pub fn issue_owner_token(
        &self,
        owner_id: Uuid,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let external = id::to_external(owner_id);
        let claims = self.base_claims(
            format!("owner:{external}"),
            TokenType::Owner,
            vec!["owner".to_string()],
            permissions,
            now,
        );
        let claims = AccessTokenClaims {
            owner_id: Some(external),
            ..claims
        };
        self.sign(&claims)
    }

    /// Issue a key token for the Gateway surface.
    pub fn issue_key_token(
        &self,
        key_id: Uuid,
        key_type: KeyType,
        key_public_id: Option<String>,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let external = id::to_external(key_id);
        let claims = self.base_claims(
            format!("key:{external}"),
            TokenType::Key,
            vec![key_type.as_str().to_string()],
            permissions,
            now,
        );
        let claims = AccessTokenClaims {
            key_id: Some(external),
            key_public_id,
            ..claims
        };
        self.sign(&claims)
    }

    fn base_claims(
        &self,
        sub: String,
        token_type: TokenType,
        roles: Vec<String>,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> AccessTokenClaims {
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);
        AccessTokenClaims {
            iss: self.issuer.clone(),
            sub,
            aud: self.audience_for(token_type).to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            typ: token_type.as_str().to_string(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles,
            permissions,
        }
    }

    fn sign(&self, claims: &AccessTokenClaims) -> Result<String, anyhow::Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.active_kid.clone());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Verify a presented token for the given surface.
    ///
    /// Checks run in a fixed order: header shape and algorithm, key id
    /// resolution, signature, time window with leeway, issuer, audience,
    /// token type.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, VerifyFailure> {
        let header = decode_header(token).map_err(|_| VerifyFailure::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyFailure::Algorithm);
        }
        let kid = header.kid.ok_or(VerifyFailure::Signature)?;
        let decoding_key = self.decoding_keys.get(&kid).ok_or(VerifyFailure::Signature)?;

        // Time, issuer and audience are checked manually below against
        // the injected clock; the library only verifies the signature.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessTokenClaims>(token, decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => VerifyFailure::Signature,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => VerifyFailure::Algorithm,
                _ => VerifyFailure::Malformed,
            }
        })?;
        let claims = data.claims;

        let now_ts = now.timestamp();
        if now_ts < claims.nbf - self.leeway_seconds {
            return Err(VerifyFailure::NotYetValid);
        }
        if now_ts > claims.exp + self.leeway_seconds {
            return Err(VerifyFailure::Expired);
        }
        if claims.iss != self.issuer {
            return Err(VerifyFailure::Issuer);
        }
        if claims.aud != self.audience_for(expected) {
            return Err(VerifyFailure::Audience);
        }
        if claims.typ != expected.as_str() {
            return Err(VerifyFailure::Type);
        }

        Ok(claims)
    }
}

/// Build the JWK entry for one public key PEM.
fn jwk_from_pem(kid: &str, pem: &str) -> Result<Jwk, anyhow::Error> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use rsa::pkcs8::DecodePublicKey;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPublicKey;

    let public_key = RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA public key for JWKS: {}", e))?;

    Ok(Jwk {
        kty: "RSA".to_string(),
        r#use: "sig".to_string(),
        alg: "RS256".to_string(),
        kid: kid.to_string(),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningPublicKey;
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use rsa::RsaPrivateKey;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_pem(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write pem");
        file
    }

    struct TestKeys {
        service: SigningService,
        _files: Vec<NamedTempFile>,
        encoding_key: EncodingKey,
    }

    fn test_service() -> TestKeys {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("generate key");
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode private")
            .to_string();
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode public");

        let private_file = write_pem(&private_pem);
        let public_file = write_pem(&public_pem);

        let token = TokenConfig {
            issuer: "https://auth.example.test".into(),
            console_audience: "console".into(),
            gateway_audience: "gateway".into(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 2_592_000,
            leeway_seconds: 10,
        };
        let signing = SigningConfig {
            private_key_path: private_file.path().to_str().unwrap().to_string(),
            active_kid: "test-key".into(),
            public_keys: vec![SigningPublicKey {
                kid: "test-key".into(),
                path: public_file.path().to_str().unwrap().to_string(),
            }],
        };

        let service = SigningService::new(&token, &signing).expect("signing service");
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();

        TestKeys {
            service,
            _files: vec![private_file, public_file],
            encoding_key,
        }
    }

    fn sign_raw(keys: &TestKeys, kid: &str, claims: &AccessTokenClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &keys.encoding_key).unwrap()
    }

    #[test]
    fn test_owner_token_round_trip() {
        let keys = test_service();
        let now = Utc::now();
        let owner_id = id::fresh_id();
        let token = keys
            .service
            .issue_owner_token(owner_id, vec!["keys:issue".into()], now)
            .unwrap();

        let claims = keys.service.verify(&token, TokenType::Owner, now).unwrap();
        assert_eq!(claims.typ, "owner");
        assert_eq!(claims.sub, format!("owner:{}", id::to_external(owner_id)));
        assert_eq!(claims.owner_id.as_deref(), Some(id::to_external(owner_id).as_str()));
        assert_eq!(claims.aud, "console");
        assert_eq!(claims.roles, vec!["owner"]);
        assert_eq!(claims.permissions, vec!["keys:issue"]);
    }

    #[test]
    fn test_key_token_round_trip() {
        let keys = test_service();
        let now = Utc::now();
        let key_id = id::fresh_id();
        let token = keys
            .service
            .issue_key_token(
                key_id,
                KeyType::Secondary,
                Some("apub_0011223344556677".into()),
                vec!["posts:read".into()],
                now,
            )
            .unwrap();

        let claims = keys.service.verify(&token, TokenType::Key, now).unwrap();
        assert_eq!(claims.typ, "key");
        assert_eq!(claims.sub, format!("key:{}", id::to_external(key_id)));
        assert_eq!(claims.roles, vec!["secondary"]);
        assert_eq!(
            claims.key_public_id.as_deref(),
            Some("apub_0011223344556677")
        );
    }

    #[test]
    fn test_surface_mismatch_fails_on_audience() {
        let keys = test_service();
        let now = Utc::now();
        let token = keys
            .service
            .issue_owner_token(id::fresh_id(), vec![], now)
            .unwrap();

        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::Audience)
        );
    }

    #[test]
    fn test_type_mismatch_detected_after_audience() {
        let keys = test_service();
        let now = Utc::now();
        // Gateway audience but owner typ: only the typ check can catch it.
        let mut claims = AccessTokenClaims {
            iss: "https://auth.example.test".into(),
            sub: "owner:00000000000000000000000000000000".into(),
            aud: "gateway".into(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: now.timestamp() + 900,
            typ: "owner".into(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles: vec![],
            permissions: vec![],
        };
        let token = sign_raw(&keys, "test-key", &claims);
        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::Type)
        );

        claims.typ = "key".into();
        let token = sign_raw(&keys, "test-key", &claims);
        assert!(keys.service.verify(&token, TokenType::Key, now).is_ok());
    }

    #[test]
    fn test_expiry_with_leeway_boundary() {
        let keys = test_service();
        let now = Utc::now();
        let leeway = 10;

        let mut claims = AccessTokenClaims {
            iss: "https://auth.example.test".into(),
            sub: "key:00000000000000000000000000000000".into(),
            aud: "gateway".into(),
            iat: now.timestamp() - 900,
            nbf: now.timestamp() - 900,
            exp: now.timestamp() - leeway,
            typ: "key".into(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles: vec![],
            permissions: vec![],
        };

        // exp = now - leeway is still inside the window.
        let token = sign_raw(&keys, "test-key", &claims);
        assert!(keys.service.verify(&token, TokenType::Key, now).is_ok());

        // One second further is not.
        claims.exp -= 1;
        let token = sign_raw(&keys, "test-key", &claims);
        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::Expired)
        );
    }

    #[test]
    fn test_not_yet_valid() {
        let keys = test_service();
        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: "https://auth.example.test".into(),
            sub: "key:00000000000000000000000000000000".into(),
            aud: "gateway".into(),
            iat: now.timestamp() + 3600,
            nbf: now.timestamp() + 3600,
            exp: now.timestamp() + 4500,
            typ: "key".into(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles: vec![],
            permissions: vec![],
        };
        let token = sign_raw(&keys, "test-key", &claims);
        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::NotYetValid)
        );
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let keys = test_service();
        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: "https://rogue.example.test".into(),
            sub: "key:00000000000000000000000000000000".into(),
            aud: "gateway".into(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: now.timestamp() + 900,
            typ: "key".into(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles: vec![],
            permissions: vec![],
        };
        let token = sign_raw(&keys, "test-key", &claims);
        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::Issuer)
        );
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let keys = test_service();
        let now = Utc::now();
        let token = keys
            .service
            .issue_owner_token(id::fresh_id(), vec![], now)
            .unwrap();
        let claims = keys.service.verify(&token, TokenType::Owner, now).unwrap();

        let forged = sign_raw(&keys, "other-key", &claims);
        assert_eq!(
            keys.service.verify(&forged, TokenType::Owner, now),
            Err(VerifyFailure::Signature)
        );
    }

    #[test]
    fn test_non_rs256_rejected() {
        let keys = test_service();
        let now = Utc::now();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-key".into());
        let claims = AccessTokenClaims {
            iss: "https://auth.example.test".into(),
            sub: "key:00000000000000000000000000000000".into(),
            aud: "gateway".into(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: now.timestamp() + 900,
            typ: "key".into(),
            owner_id: None,
            key_id: None,
            key_public_id: None,
            roles: vec![],
            permissions: vec![],
        };
        let token = encode(&header, &claims, &EncodingKey::from_secret(b"hs-secret")).unwrap();
        assert_eq!(
            keys.service.verify(&token, TokenType::Key, now),
            Err(VerifyFailure::Algorithm)
        );
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let keys = test_service();
        assert_eq!(
            keys.service.verify("not-a-token", TokenType::Owner, Utc::now()),
            Err(VerifyFailure::Malformed)
        );
    }

    #[test]
    fn test_jwks_document_shape() {
        let keys = test_service();
        let jwks = keys.service.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.r#use, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, "test-key");
        assert!(!jwk.n.is_empty());
        assert!(!jwk.e.is_empty());
        // base64url without padding.
        assert!(!jwk.n.contains('='));
    }
}
