use http::{Result as HttpResponse, StatusCode};
use oidc_confusion::{RegistryError, RouteError, TestObjectError};

/// Helper trait for converting errors to a standard response error format
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)>;
}

impl<T> IntoResponseError<T> for Result<T, RouteError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = match e {
                RouteError::UnknownHost(_) => StatusCode::NOT_FOUND,
                RouteError::NotFound(_) => StatusCode::NOT_FOUND,
                RouteError::Registry(RegistryError::MissingInstance { .. }) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, e.to_string())
        })
    }
}

impl<T> IntoResponseError<T> for Result<T, TestObjectError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = match e {
                TestObjectError::NotFound(_) => StatusCode::NOT_FOUND,
                TestObjectError::NoSuchStep { .. } => StatusCode::NOT_FOUND,
                TestObjectError::WrongKind { .. } => StatusCode::BAD_REQUEST,
                TestObjectError::Utils(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })
    }
}

/// Implementation for http::Error (used by Response::builder())
impl<T> IntoResponseError<T> for HttpResponse<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }
}
