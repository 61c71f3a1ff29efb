use std::fmt::{self, Display};

use serde::Serialize;
use sqlx::error::ErrorKind;
use warp::{http::StatusCode, reject::Reject};

/// Request-scoped failure kinds. Every action reports one of these; none of
/// them is fatal to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiError {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    Conflict,
    Internal,
}

impl ApiError {
    pub fn new(self, info: &str) -> Error {
        Error {
            kind: self,
            info: info.to_string(),
            field: None,
        }
    }

    pub fn default(self) -> Error {
        self.new(self.default_info())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn default_info(&self) -> &'static str {
        match self {
            ApiError::Validation => "Invalid request",
            ApiError::Unauthorized => "Authentication credentials were not provided",
            ApiError::Forbidden => "You don't have permission to perform this action",
            ApiError::NotFound => "Not found",
            ApiError::MethodNotAllowed => "Method not allowed",
            ApiError::Conflict => "Already exists",
            ApiError::Internal => "Internal server error",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {info}")]
pub struct Error {
    pub kind: ApiError,
    pub info: String,
    pub field: Option<String>,
}

impl Error {
    /// Attaches the name of the payload field the failure refers to.
    pub fn on(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl Reject for Error {}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
    pub code: ApiError,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&Error> for ErrorBody {
    fn from(value: &Error) -> Self {
        Self {
            detail: value.info.to_owned(),
            code: value.kind,
            field: value.field.to_owned(),
        }
    }
}

pub struct QueryError {
    info: String,
    constraint: Option<ErrorKind>,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            constraint: None,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self {
                constraint: Some(e.kind()),
                info: format!("{e}"),
            },
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("{e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            _ => Self::new(String::from("Unknown error")),
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value.constraint {
            Some(ErrorKind::UniqueViolation) => ApiError::Conflict.new("Already exists"),
            Some(ErrorKind::CheckViolation) | Some(ErrorKind::NotNullViolation) => {
                ApiError::Validation.new("Constraint violated")
            }
            Some(ErrorKind::ForeignKeyViolation) => {
                ApiError::Validation.new("Referenced object doesn't exist")
            }
            _ => {
                log::error!("Query failed {value}");
                ApiError::Internal.default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses() {
        assert_eq!(ApiError::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn error_body_carries_field() {
        let error = ApiError::Validation.new("Tags must not be empty").on("tags");
        let body = serde_json::to_value(ErrorBody::from(&error)).unwrap();

        assert_eq!(body["code"], "validation");
        assert_eq!(body["field"], "tags");
        assert_eq!(body["detail"], "Tags must not be empty");
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let error: Error = QueryError {
            info: String::from("duplicate key"),
            constraint: Some(ErrorKind::UniqueViolation),
        }
        .into();

        assert_eq!(error.kind, ApiError::Conflict);
    }

    #[test]
    fn plain_failure_becomes_internal() {
        let error: Error = QueryError::new(String::from("Pool timed out")).into();

        assert_eq!(error.kind, ApiError::Internal);
    }
}
