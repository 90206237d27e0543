use serde::Serialize;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Resource not found: {resource}"))]
    NotFound { resource: String },

    #[snafu(display("Internal server error"))]
    InternalServerError {
        #[snafu(source(false))]
        source: Option<eyre::Report>,
    },

    #[snafu(display("Error returned from database"))]
    Sqlx {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Error running migrations"))]
    MigrationError {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("Malformed queue payload"))]
    MalformedPayload {
        #[snafu(source)]
        source: serde_json::Error,
    },

    #[snafu(display("Missing parameter: {message}"))]
    MissingParameter { message: String },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Sqlx { source }
    }
}

impl From<eyre::Report> for Error {
    fn from(e: eyre::Report) -> Self {
        Self::InternalServerError { source: Some(e) }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::MigrationError { source }
    }
}

impl Error {
    pub fn internal(e: impl Into<eyre::Report>) -> Self {
        Self::InternalServerError {
            source: Some(e.into()),
        }
    }

    pub fn missing_parameter(message: impl Into<String>) -> Self {
        Self::MissingParameter {
            message: message.into(),
        }
    }

    pub fn message_not_found(message_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: format!("message {}", message_id.into()),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "MESSAGE_NOT_FOUND",
            Self::MissingParameter { .. } => "MISSING_REQUIRED_PARAMETER",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::Sqlx { .. } | Self::MigrationError { .. } => "DATABASE_ERROR",
            Self::InternalServerError { .. } => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    code: &'static str,
    message: String,
}

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            Self::NotFound { .. } => actix_web::http::StatusCode::NOT_FOUND,

            Self::MissingParameter { .. } | Self::MalformedPayload { .. } => {
                actix_web::http::StatusCode::BAD_REQUEST
            }

            Self::MigrationError { .. }
            | Self::InternalServerError { .. }
            | Self::Sqlx { .. } => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(self.status_code()).json(ErrorBody {
            status: "error",
            code: self.code(),
            message: self.to_string(),
        })
    }
}
