use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failure to obtain a usable record for one identifier.
///
/// The `Display` text is what ends up in a `LookupResult`'s `error` field.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("Registry returned HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Invalid registry response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Upload-level failures that abort a whole batch request.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Please upload an .xlsx, .xls, or .csv file")]
    BadFileType,
    #[error("No NPI numbers found in Column A starting from row 2")]
    NoInput,
    #[error("Could not read spreadsheet: {0}")]
    Input(String),
    #[error("Invalid upload: {0}")]
    Upload(String),
    #[error("Could not write spreadsheet: {0}")]
    Output(String),
}

impl BatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BatchError::Output(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("batch request failed: {self}");
        } else {
            tracing::warn!("batch request rejected: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_is_stable() {
        assert_eq!(LookupError::NotFound.to_string(), "Not found");
    }

    #[test]
    fn only_output_failures_are_server_errors() {
        assert_eq!(BatchError::NoInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(BatchError::BadFileType.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BatchError::Input("zip error".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BatchError::Output("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
