use serde::Deserialize;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub signing: SigningConfig,
    pub hashing: HashingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Token issuance and verification parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub issuer: String,
    pub console_audience: String,
    pub gateway_audience: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub leeway_seconds: i64,
}

/// One published verification key.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningPublicKey {
    pub kid: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    pub private_key_path: String,
    /// `kid` the private key signs under; must appear in `public_keys`.
    pub active_kid: String,
    /// All currently accepted verification keys. During rotation both the
    /// old and new key stay listed for at least one access-token TTL plus
    /// the clock-skew budget.
    pub public_keys: Vec<SigningPublicKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    /// 256-bit key for the refresh-token lookup digest.
    pub refresh_lookup_key: Vec<u8>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let refresh_lookup_key_hex = get_env("REFRESH_LOOKUP_KEY", None, is_prod)?;
        let refresh_lookup_key = hex::decode(&refresh_lookup_key_hex).map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("REFRESH_LOOKUP_KEY must be hex"))
        })?;

        let public_keys = parse_public_keys(&get_env("SIGNING_PUBLIC_KEYS", None, is_prod)?)?;
        let active_kid = match env::var("SIGNING_KEY_ID") {
            Ok(kid) => kid,
            Err(_) => public_keys
                .first()
                .map(|k| k.kid.clone())
                .unwrap_or_default(),
        };

        let config = ServiceConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("credential-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: parse_env("PORT", Some("8080"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            token: TokenConfig {
                issuer: get_env("TOKEN_ISSUER", None, is_prod)?,
                console_audience: get_env("CONSOLE_AUDIENCE", None, is_prod)?,
                gateway_audience: get_env("GATEWAY_AUDIENCE", None, is_prod)?,
                access_token_ttl_seconds: parse_env(
                    "ACCESS_TOKEN_TTL_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                refresh_token_ttl_seconds: parse_env(
                    "REFRESH_TOKEN_TTL_SECONDS",
                    Some("2592000"),
                    is_prod,
                )?,
                leeway_seconds: parse_env("TOKEN_LEEWAY_SECONDS", Some("10"), is_prod)?,
            },
            signing: SigningConfig {
                private_key_path: get_env("SIGNING_PRIVATE_KEY_PATH", None, is_prod)?,
                active_kid,
                public_keys,
            },
            hashing: HashingConfig {
                memory_kib: parse_env("PASSWORD_HASH_MEMORY_KIB", Some("65536"), is_prod)?,
                time_cost: parse_env("PASSWORD_HASH_TIME_COST", Some("4"), is_prod)?,
                parallelism: parse_env("PASSWORD_HASH_PARALLELISM", Some("1"), is_prod)?,
                refresh_lookup_key,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation; a service with a malformed configuration
    /// never starts.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }
        if self.token.issuer.is_empty() {
            return Err(config_error("TOKEN_ISSUER must not be empty"));
        }
        if self.token.console_audience.is_empty() || self.token.gateway_audience.is_empty() {
            return Err(config_error("audiences must not be empty"));
        }
        if self.token.console_audience == self.token.gateway_audience {
            return Err(config_error(
                "CONSOLE_AUDIENCE and GATEWAY_AUDIENCE must differ",
            ));
        }
        if self.token.access_token_ttl_seconds <= 0 {
            return Err(config_error("ACCESS_TOKEN_TTL_SECONDS must be positive"));
        }
        if self.token.refresh_token_ttl_seconds <= 0 {
            return Err(config_error("REFRESH_TOKEN_TTL_SECONDS must be positive"));
        }
        if self.token.leeway_seconds < 0 {
            return Err(config_error("TOKEN_LEEWAY_SECONDS must not be negative"));
        }
        if self.signing.public_keys.is_empty() {
            return Err(config_error("SIGNING_PUBLIC_KEYS must list at least one key"));
        }
        if !self
            .signing
            .public_keys
            .iter()
            .any(|k| k.kid == self.signing.active_kid)
        {
            return Err(config_error(
                "SIGNING_KEY_ID must match a kid in SIGNING_PUBLIC_KEYS",
            ));
        }
        if self.hashing.refresh_lookup_key.len() != 32 {
            return Err(config_error("REFRESH_LOOKUP_KEY must be 32 bytes (64 hex chars)"));
        }
        if self.hashing.memory_kib < 8 * self.hashing.parallelism {
            return Err(config_error("PASSWORD_HASH_MEMORY_KIB too small"));
        }
        if self.hashing.time_cost == 0 || self.hashing.parallelism == 0 {
            return Err(config_error("hashing costs must be positive"));
        }
        Ok(())
    }
}

/// Parse `kid=path[,kid=path…]`.
fn parse_public_keys(raw: &str) -> Result<Vec<SigningPublicKey>, AppError> {
    raw.split(',')
        .map(|entry| {
            let (kid, path) = entry
                .trim()
                .split_once('=')
                .ok_or_else(|| config_error("SIGNING_PUBLIC_KEYS entries must be kid=path"))?;
            if kid.is_empty() || path.is_empty() {
                return Err(config_error("SIGNING_PUBLIC_KEYS entries must be kid=path"));
            }
            Ok(SigningPublicKey {
                kid: kid.to_string(),
                path: path.to_string(),
            })
        })
        .collect()
}

fn config_error(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.to_string()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    default: Option<&str>,
    is_prod: bool,
) -> Result<T, AppError> {
    get_env(key, default, is_prod)?.parse().map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!(format!("{} is malformed", key)))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServiceConfig {
        ServiceConfig {
            environment: Environment::Dev,
            service_name: "credential-service".into(),
            service_version: "0.0.0".into(),
            log_level: "debug".into(),
            port: 8080,
            database: DatabaseConfig {
                url: "postgres://localhost/credential_test".into(),
                max_connections: 5,
                min_connections: 1,
            },
            token: TokenConfig {
                issuer: "https://auth.example.test".into(),
                console_audience: "console".into(),
                gateway_audience: "gateway".into(),
                access_token_ttl_seconds: 900,
                refresh_token_ttl_seconds: 2_592_000,
                leeway_seconds: 10,
            },
            signing: SigningConfig {
                private_key_path: "/tmp/key.pem".into(),
                active_kid: "k1".into(),
                public_keys: vec![SigningPublicKey {
                    kid: "k1".into(),
                    path: "/tmp/key.pub.pem".into(),
                }],
            },
            hashing: HashingConfig {
                memory_kib: 65536,
                time_cost: 4,
                parallelism: 1,
                refresh_lookup_key: vec![1u8; 32],
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_equal_audiences_rejected() {
        let mut c = base_config();
        c.token.gateway_audience = c.token.console_audience.clone();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_active_kid_must_be_published() {
        let mut c = base_config();
        c.signing.active_kid = "missing".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_short_lookup_key_rejected() {
        let mut c = base_config();
        c.hashing.refresh_lookup_key = vec![1u8; 16];
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parse_public_keys() {
        let keys = parse_public_keys("k1=/a.pem, k2=/b.pem").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].kid, "k1");
        assert_eq!(keys[1].path, "/b.pem");

        assert!(parse_public_keys("no-equals").is_err());
        assert!(parse_public_keys("=path").is_err());
    }
}
