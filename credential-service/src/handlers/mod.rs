//! Surface adapters: thin JSON handlers over the service layer.

pub mod auth;
pub mod grants;
pub mod groups;
pub mod keys;
pub mod posts;
pub mod well_known;

use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{id, Principal};

/// Parse an external hex32 path or body id.
pub(crate) fn parse_id(s: &str) -> Result<Uuid, AppError> {
    id::from_external(s).map_err(|_| AppError::BadRequest(anyhow::anyhow!("malformed identifier")))
}

/// The Console gatekeeper only admits owners; anything else is a wiring
/// fault.
pub(crate) fn owner_id(principal: &Principal) -> Result<Uuid, AppError> {
    match principal {
        Principal::Owner { id, .. } => Ok(*id),
        Principal::Key { .. } => Err(AppError::Unauthorized),
    }
}

/// The Gateway gatekeeper only admits keys.
pub(crate) fn key_id(principal: &Principal) -> Result<Uuid, AppError> {
    match principal {
        Principal::Key { id, .. } => Ok(*id),
        Principal::Owner { .. } => Err(AppError::Unauthorized),
    }
}
