use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use analysis::{aggregate::AggregationError, frame::FormatError, PipelineError};

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Format(FormatError),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("no match with id {0}")]
    NotFound(String),

    #[error("{0}")]
    Dependency(String),

    #[error("analysis exceeded its time budget")]
    Timeout,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Format(_) => "FormatError",
            Self::Validation(_) => "ValidationError",
            Self::Aggregation(_) => "AggregationError",
            Self::NotFound(_) => "NotFoundError",
            Self::Dependency(_) => "DependencyError",
            Self::Timeout => "Timeout",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Format(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Aggregation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> common::ErrorBody {
        common::ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}

impl From<FormatError> for ApiError {
    fn from(value: FormatError) -> Self {
        match value {
            // Reading the spool file is a server side failure
            FormatError::Io(e) => Self::Internal(format!("reading spooled demo: {}", e)),
            other => Self::Format(other),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Format(e) => Self::from(e),
            PipelineError::Aggregation(e) => Self::Aggregation(e),
            PipelineError::Cancelled => Self::Internal("analysis was cancelled".to_owned()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Unavailable(_) | StorageError::Database(_) => {
                Self::Dependency(value.to_string())
            }
            StorageError::Io(_) | StorageError::Serde(_) => Self::Internal(value.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(code = self.code(), "{}", self);
        }

        (status, axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::Format(FormatError::BadMagic), 400, "FormatError"),
            (ApiError::Validation("x".into()), 400, "ValidationError"),
            (ApiError::Aggregation(AggregationError::NoRounds), 422, "AggregationError"),
            (ApiError::NotFound("m".into()), 404, "NotFoundError"),
            (ApiError::Dependency("db".into()), 503, "DependencyError"),
            (ApiError::Timeout, 504, "Timeout"),
            (ApiError::Internal("panic".into()), 500, "InternalError"),
        ];

        for (err, status, code) in cases {
            assert_eq!(status, err.status().as_u16());
            assert_eq!(code, err.body().code);
        }
    }

    #[test]
    fn format_message() {
        let body = ApiError::from(PipelineError::Format(FormatError::BadMagic)).body();
        assert_eq!("bad magic", body.message);

        let io = ApiError::from(FormatError::Io("disk".into()));
        assert_eq!(500, io.status().as_u16());
    }
}
