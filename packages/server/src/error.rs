//! Translation of request failures into HTTP responses.

use std::collections::BTreeMap;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use airquality_carto::CartoError;
use airquality_server_models::{ApiUpstreamErrors, ApiValidationErrors};
use airquality_stations::StationDirectoryError;
use airquality_validation::{FieldErrors, ValidateError};

/// Field name used for errors that concern the query string as a whole.
pub const SCHEMA_FIELD: &str = "_schema";

/// Everything a request handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// One or more parameters were rejected. Answered with 422.
    #[error("Invalid query parameters: {0}")]
    Validation(FieldErrors),

    /// The query string could not be decoded at all. Answered with 400.
    #[error("Malformed query string: {message}")]
    BadRequest {
        /// Decoder error description.
        message: String,
    },

    /// The analytics service failed. Answered with 504 on timeout and 502
    /// otherwise.
    #[error(transparent)]
    Upstream(#[from] CartoError),

    /// The station listing came back in an unexpected shape. Answered with
    /// 502.
    #[error(transparent)]
    Stations(StationDirectoryError),
}

impl From<ValidateError> for ApiError {
    fn from(e: ValidateError) -> Self {
        match e {
            ValidateError::Invalid(fields) => Self::Validation(fields),
            ValidateError::Stations(StationDirectoryError::Upstream(e)) => Self::Upstream(e),
            ValidateError::Stations(e) => Self::Stations(e),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Upstream(CartoError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) | Self::Stations(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            Self::Validation(fields) => {
                response.json(ApiValidationErrors::query(fields.clone().into_inner()))
            }
            Self::BadRequest { message } => {
                let mut fields = BTreeMap::new();
                fields.insert(SCHEMA_FIELD.to_string(), vec![message.clone()]);
                response.json(ApiValidationErrors::query(fields))
            }
            Self::Upstream(e) => response.json(ApiUpstreamErrors::new(e.status(), e.to_string())),
            Self::Stations(e) => response.json(ApiUpstreamErrors::new(None, e.to_string())),
        }
    }
}
