pub mod clock;
pub mod secret;

pub use clock::Clock;
pub use secret::{device_fingerprint, generate_key_secret, generate_refresh_token, SecretHasher};
