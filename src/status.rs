//! Normalized request outcome.
//!
//! Alerting does not care whether a handler answered `403` or `422`. It cares
//! whether the client got it wrong, the service is down, or something broke.
//! [`NormalizedStatus`] is that coarse answer, derived from the final HTTP
//! status by [`classify`] unless a filter pinned it on the request context.
//!
//! | Raw status            | Normalized                         |
//! |-----------------------|------------------------------------|
//! | 1xx, 2xx, 3xx         | `Ok`                               |
//! | 401                   | `ClientError { Unauthorized }`     |
//! | 404                   | `ClientError { NotFound }`         |
//! | any other 4xx         | `ClientError { BadRequest }`       |
//! | 503                   | `ServiceUnavailable`               |
//! | everything else       | `InternalServerError`              |
//!
//! Unknown codes land in `InternalServerError`.

use http::StatusCode;
use serde::Serialize;

/// Category of a client error.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientErrorCategory {
    BadRequest,
    NotFound,
    Unauthorized,
}

/// The tag of a [`NormalizedStatus`], without associated data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizedStatusCode {
    Ok,
    InternalServerError,
    ServiceUnavailable,
    ClientError,
}

/// Coarse, alertable outcome of a request.
///
/// Serializes as `{"code":"OK"}` or, for client errors,
/// `{"code":"CLIENT_ERROR","category":"NOT_FOUND"}`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizedStatus {
    Ok,
    InternalServerError,
    ServiceUnavailable,
    ClientError { category: ClientErrorCategory },
}

impl NormalizedStatus {
    pub fn code(&self) -> NormalizedStatusCode {
        match self {
            Self::Ok                  => NormalizedStatusCode::Ok,
            Self::InternalServerError => NormalizedStatusCode::InternalServerError,
            Self::ServiceUnavailable  => NormalizedStatusCode::ServiceUnavailable,
            Self::ClientError { .. }  => NormalizedStatusCode::ClientError,
        }
    }

    pub fn category(&self) -> Option<ClientErrorCategory> {
        match self {
            Self::ClientError { category } => Some(*category),
            _ => None,
        }
    }

    pub const fn client_error(category: ClientErrorCategory) -> Self {
        Self::ClientError { category }
    }
}

impl From<StatusCode> for NormalizedStatus {
    fn from(status: StatusCode) -> Self {
        classify(status.as_u16())
    }
}

/// Classifies a raw status code. `503` is the only service-unavailable code.
pub fn classify(raw: u16) -> NormalizedStatus {
    classify_raw(raw, raw == StatusCode::SERVICE_UNAVAILABLE.as_u16())
}

/// Classifies a raw status code with an explicit service-unavailable flag.
///
/// The flag is only consulted for codes that are neither successful nor
/// client errors, so a transport that knows a `502` really means "backend
/// down" can report it as [`NormalizedStatus::ServiceUnavailable`].
pub fn classify_raw(raw: u16, is_service_unavailable: bool) -> NormalizedStatus {
    match raw {
        100..=399 => NormalizedStatus::Ok,
        401 => NormalizedStatus::client_error(ClientErrorCategory::Unauthorized),
        404 => NormalizedStatus::client_error(ClientErrorCategory::NotFound),
        400..=499 => NormalizedStatus::client_error(ClientErrorCategory::BadRequest),
        _ if is_service_unavailable => NormalizedStatus::ServiceUnavailable,
        _ => NormalizedStatus::InternalServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_codes_map_to_expected_variants() {
        let bad_request = NormalizedStatus::client_error(ClientErrorCategory::BadRequest);

        assert_eq!(classify(200), NormalizedStatus::Ok);
        assert_eq!(classify(201), NormalizedStatus::Ok);
        assert_eq!(classify(301), NormalizedStatus::Ok);
        assert_eq!(classify(400), bad_request);
        assert_eq!(classify(403), bad_request);
        assert_eq!(classify(422), bad_request);
        assert_eq!(
            classify(401),
            NormalizedStatus::client_error(ClientErrorCategory::Unauthorized)
        );
        assert_eq!(
            classify(404),
            NormalizedStatus::client_error(ClientErrorCategory::NotFound)
        );
        assert_eq!(classify(503), NormalizedStatus::ServiceUnavailable);
        assert_eq!(classify(500), NormalizedStatus::InternalServerError);
        assert_eq!(classify(502), NormalizedStatus::InternalServerError);
        assert_eq!(classify(504), NormalizedStatus::InternalServerError);
    }

    #[test]
    fn codes_outside_the_registry_fall_through_to_internal_server_error() {
        assert_eq!(classify(0), NormalizedStatus::InternalServerError);
        assert_eq!(classify(99), NormalizedStatus::InternalServerError);
        assert_eq!(classify(600), NormalizedStatus::InternalServerError);
    }

    #[test]
    fn service_unavailable_flag_only_applies_to_server_side_codes() {
        assert_eq!(classify_raw(502, true), NormalizedStatus::ServiceUnavailable);
        assert_eq!(classify_raw(200, true), NormalizedStatus::Ok);
        assert_eq!(
            classify_raw(404, true),
            NormalizedStatus::client_error(ClientErrorCategory::NotFound)
        );
        assert_eq!(classify_raw(503, false), NormalizedStatus::InternalServerError);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(NormalizedStatus::Ok, NormalizedStatus::Ok);
        assert_ne!(
            NormalizedStatus::client_error(ClientErrorCategory::NotFound),
            NormalizedStatus::client_error(ClientErrorCategory::BadRequest)
        );
    }

    #[test]
    fn serializes_category_only_for_client_errors() {
        let ok = serde_json::to_value(NormalizedStatus::Ok).unwrap();
        assert_eq!(ok, serde_json::json!({ "code": "OK" }));

        let not_found =
            serde_json::to_value(NormalizedStatus::client_error(ClientErrorCategory::NotFound))
                .unwrap();
        assert_eq!(
            not_found,
            serde_json::json!({ "code": "CLIENT_ERROR", "category": "NOT_FOUND" })
        );

        let down = serde_json::to_value(NormalizedStatus::ServiceUnavailable).unwrap();
        assert_eq!(down, serde_json::json!({ "code": "SERVICE_UNAVAILABLE" }));
    }

    #[test]
    fn from_status_code_uses_classify() {
        assert_eq!(
            NormalizedStatus::from(StatusCode::UNAUTHORIZED).code(),
            NormalizedStatusCode::ClientError
        );
        assert_eq!(NormalizedStatus::from(StatusCode::NO_CONTENT), NormalizedStatus::Ok);
    }

    proptest! {
        #[test]
        fn every_registered_code_has_exactly_one_class(raw in 100u16..600) {
            let status = classify(raw);
            let expected = match raw {
                100..=399 => NormalizedStatusCode::Ok,
                400..=499 => NormalizedStatusCode::ClientError,
                503 => NormalizedStatusCode::ServiceUnavailable,
                _ => NormalizedStatusCode::InternalServerError,
            };
            prop_assert_eq!(status.code(), expected);
            prop_assert_eq!(status.category().is_some(), (400..500).contains(&raw));
        }
    }
}
