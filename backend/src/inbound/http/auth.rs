//! Caller identity extraction.
//!
//! Authentication lives in the surrounding deployment (gateway session or
//! service mesh); it forwards the authenticated member as an `X-User-Id`
//! header. Handlers that need an identity call [`require_caller`].

use actix_web::HttpRequest;
use uuid::Uuid;

use crate::domain::{Error, UserId};

/// Header carrying the authenticated caller's user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Resolve the caller's identity from the forwarded header.
pub fn require_caller(request: &HttpRequest) -> Result<UserId, Error> {
    let value = request
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| Error::unauthorized("missing X-User-Id header"))?;
    let raw = value
        .to_str()
        .map_err(|_| Error::unauthorized("X-User-Id header is not valid UTF-8"))?;
    let uuid = Uuid::parse_str(raw)
        .map_err(|_| Error::unauthorized("X-User-Id header must be a UUID"))?;
    Ok(UserId::from_uuid(uuid))
}
