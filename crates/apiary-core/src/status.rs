//! HTTP status codes carried by the error taxonomy.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status used by handlers that create a resource.
///
/// This is a success status. It can never appear on an [`crate::ApiError`].
pub const STATUS_CREATED: u16 = 201;

/// The closed set of statuses an [`crate::ApiError`] can carry.
///
/// Serializes as a bare integer (`400`, `409`, `500`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[repr(u16)]
pub enum ApiStatus {
    /// 400 Bad Request.
    BadRequest = 400,
    /// 409 Conflict.
    Conflict = 409,
    /// 500 Internal Server Error.
    InternalServerError = 500,
}

impl ApiStatus {
    /// Returns the numeric status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for statuses of 500 and above.
    #[must_use]
    pub const fn is_server_error(self) -> bool {
        self.as_u16() >= 500
    }

    /// Returns the equivalent [`http::StatusCode`].
    #[must_use]
    pub const fn to_status_code(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl From<ApiStatus> for u16 {
    fn from(status: ApiStatus) -> Self {
        status.as_u16()
    }
}

impl From<ApiStatus> for StatusCode {
    fn from(status: ApiStatus) -> Self {
        status.to_status_code()
    }
}

/// A numeric status outside the taxonomy's closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("status {0} is not part of the error taxonomy (expected 400, 409 or 500)")]
pub struct UnsupportedStatus(pub u16);

impl TryFrom<u16> for ApiStatus {
    type Error = UnsupportedStatus;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            400 => Ok(Self::BadRequest),
            409 => Ok(Self::Conflict),
            500 => Ok(Self::InternalServerError),
            other => Err(UnsupportedStatus(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values() {
        assert_eq!(ApiStatus::BadRequest.as_u16(), 400);
        assert_eq!(ApiStatus::Conflict.as_u16(), 409);
        assert_eq!(ApiStatus::InternalServerError.as_u16(), 500);
    }

    #[test]
    fn test_server_error_threshold() {
        assert!(!ApiStatus::BadRequest.is_server_error());
        assert!(!ApiStatus::Conflict.is_server_error());
        assert!(ApiStatus::InternalServerError.is_server_error());
    }

    #[test]
    fn test_rejects_statuses_outside_taxonomy() {
        assert_eq!(ApiStatus::try_from(409), Ok(ApiStatus::Conflict));
        assert_eq!(
            ApiStatus::try_from(STATUS_CREATED),
            Err(UnsupportedStatus(201))
        );
        assert_eq!(ApiStatus::try_from(404), Err(UnsupportedStatus(404)));
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&ApiStatus::Conflict).unwrap();
        assert_eq!(json, "409");

        let parsed: ApiStatus = serde_json::from_str("500").unwrap();
        assert_eq!(parsed, ApiStatus::InternalServerError);

        assert!(serde_json::from_str::<ApiStatus>("418").is_err());
    }

    #[test]
    fn test_http_status_conversion() {
        assert_eq!(StatusCode::from(ApiStatus::BadRequest), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiStatus::InternalServerError.to_status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
