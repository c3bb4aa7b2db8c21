//! Services layer for the credential platform.
//!
//! Business logic for authentication, key lifecycle, authorization
//! evaluation, audit and persistence.

mod audit;
mod auth;
mod authz;
mod database;
pub mod error;
mod keys;
mod posts;
mod signing;

pub use audit::{sanitize_metadata, AuditService};
pub use auth::{AuthService, RequestMeta, TokenResponse};
pub use authz::{evaluate_masked, Action, AuthzService, Decision, DenyKind};
pub use database::{Database, UseGate};
pub use error::ServiceError;
pub use keys::KeyLifecycleService;
pub use posts::{PgPostStore, PostStore};
pub use signing::{AccessTokenClaims, Jwk, Jwks, SigningService, TokenType, VerifyFailure};

pub use crate::utils::SecretHasher;
