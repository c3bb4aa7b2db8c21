//! Secret hashing and opaque credential generation.
//!
//! Passwords, key secrets and refresh tokens share one memory-hard
//! (Argon2id) digest path. Refresh tokens additionally get a fast keyed
//! lookup digest so the row can be located without storing the
//! plaintext.

use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

use crate::config::HashingConfig;

/// Prefix on generated key secrets.
pub const KEY_SECRET_PREFIX: &str = "sec_";
/// Prefix on generated refresh tokens.
pub const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// Random characters appended after a secret prefix. 43 alphanumerics
/// carry just over 256 bits of entropy.
const SECRET_RANDOM_LEN: usize = 43;

type HmacSha256 = Hmac<Sha256>;

/// Memory-hard hasher configured from the service hashing parameters.
#[derive(Clone)]
pub struct SecretHasher {
    argon: Argon2<'static>,
    /// Digest of a throwaway secret, verified against when a principal
    /// does not exist so the two paths cost the same.
    dummy_digest: String,
    lookup_key: Vec<u8>,
}

impl SecretHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(
            config.memory_kib,
            config.time_cost,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;

        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let throwaway: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(SECRET_RANDOM_LEN)
            .map(char::from)
            .collect();
        let salt = SaltString::generate(&mut HashOsRng);
        let dummy_digest = argon
            .hash_password(throwaway.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to compute dummy digest: {}", e))?
            .to_string();

        Ok(Self {
            argon,
            dummy_digest,
            lookup_key: config.refresh_lookup_key.clone(),
        })
    }

    /// Hash a secret. The output embeds algorithm, parameters and salt.
    pub fn hash_secret(&self, plaintext: &str) -> Result<String, anyhow::Error> {
        let salt = SaltString::generate(&mut HashOsRng);
        let digest = self
            .argon
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
            .to_string();
        Ok(digest)
    }

    /// Constant-time verification against a stored digest.
    pub fn verify_secret(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burn a verification when the looked-up principal does not exist,
    /// equalizing timing between the absent and wrong-secret paths.
    pub fn dummy_verify(&self, plaintext: &str) {
        let _ = self.verify_secret(plaintext, &self.dummy_digest);
    }

    /// Keyed 256-bit digest used to locate a refresh-token row.
    pub fn refresh_lookup_digest(&self, token: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.lookup_key)
            .expect("HMAC accepts keys of any length");
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// 256-bit device fingerprint over request metadata.
pub fn device_fingerprint(ip: &str, user_agent: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_agent.as_bytes());
    hasher.finalize().to_vec()
}

/// Generate a fresh opaque key secret.
pub fn generate_key_secret() -> String {
    generate_opaque(KEY_SECRET_PREFIX)
}

/// Generate a fresh opaque refresh token.
pub fn generate_refresh_token() -> String {
    generate_opaque(REFRESH_TOKEN_PREFIX)
}

fn generate_opaque(prefix: &str) -> String {
    let random: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{random}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HashingConfig {
        // Small parameters keep the tests fast; production values come
        // from config.
        HashingConfig {
            memory_kib: 1024,
            time_cost: 1,
            parallelism: 1,
            refresh_lookup_key: vec![7u8; 32],
        }
    }

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hasher = SecretHasher::new(&test_config()).unwrap();
        let digest = hasher.hash_secret("CorrectHorseBatteryStaple!").unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify_secret("CorrectHorseBatteryStaple!", &digest));
        assert!(!hasher.verify_secret("wrong", &digest));
    }

    #[test]
    fn test_same_secret_different_digests() {
        let hasher = SecretHasher::new(&test_config()).unwrap();
        let a = hasher.hash_secret("secret").unwrap();
        let b = hasher.hash_secret("secret").unwrap();
        assert_ne!(a, b);
        assert!(hasher.verify_secret("secret", &a));
        assert!(hasher.verify_secret("secret", &b));
    }

    #[test]
    fn test_verify_rejects_garbage_digest() {
        let hasher = SecretHasher::new(&test_config()).unwrap();
        assert!(!hasher.verify_secret("secret", "not-a-digest"));
    }

    #[test]
    fn test_lookup_digest_is_deterministic_and_keyed() {
        let hasher = SecretHasher::new(&test_config()).unwrap();
        let d1 = hasher.refresh_lookup_digest("rt_abc");
        let d2 = hasher.refresh_lookup_digest("rt_abc");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 32);
        assert_ne!(d1, hasher.refresh_lookup_digest("rt_abd"));

        let mut other = test_config();
        other.refresh_lookup_key = vec![8u8; 32];
        let other_hasher = SecretHasher::new(&other).unwrap();
        assert_ne!(d1, other_hasher.refresh_lookup_digest("rt_abc"));
    }

    #[test]
    fn test_generated_secrets_have_shape() {
        let sec = generate_key_secret();
        assert!(sec.starts_with("sec_"));
        assert!(sec.len() >= 32 && sec.len() <= 128);
        assert!(sec.is_ascii());

        let rt = generate_refresh_token();
        assert!(rt.starts_with("rt_"));
        assert_ne!(generate_refresh_token(), rt);
    }

    #[test]
    fn test_device_fingerprint_distinguishes_inputs() {
        let a = device_fingerprint("10.0.0.1", "agent/1");
        assert_eq!(a.len(), 32);
        assert_eq!(a, device_fingerprint("10.0.0.1", "agent/1"));
        assert_ne!(a, device_fingerprint("10.0.0.2", "agent/1"));
        assert_ne!(a, device_fingerprint("10.0.0.1", "agent/2"));
    }
}
