pub mod auth;

pub use auth::{console_auth, gateway_auth, AuthPrincipal, Meta};
