use axum::{http::StatusCode, response::IntoResponse};

use crate::errors::DecodeError;

#[derive(Debug)]
/// An error that can be returned by the API and will be converted into a
/// plain-text response. Such errors never carry an AdmissionReview.
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ApiError {
    pub(crate) fn internal_server_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Something went wrong".to_owned(),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(error: DecodeError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid admission review: {error}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
