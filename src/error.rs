use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use std::fmt;
use thiserror::Error;
use tracing::field::{Empty, display};
use tracing::{error, info_span, warn};

/// The row a failed foreign key pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReference {
    StudentProfile,
    TrainingProgram,
    Teacher,
    Unknown,
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReference::StudentProfile => write!(f, "student profile"),
            MissingReference::TrainingProgram => write!(f, "training program"),
            MissingReference::Teacher => write!(f, "teacher"),
            MissingReference::Unknown => write!(f, "referenced row"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Foreign key violation: {reference} does not exist ({message})")]
    ForeignKeyViolation {
        reference: MissingReference,
        message: String,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_foreign_key_violation() {
                return AppError::ForeignKeyViolation {
                    reference: MissingReference::Unknown,
                    message: db_err.message().to_string(),
                };
            }
            if db_err.is_unique_violation() || db_err.is_check_violation() {
                return AppError::ConstraintViolation(db_err.message().to_string());
            }
            if matches!(db_err.kind(), sqlx::error::ErrorKind::NotNullViolation) {
                return AppError::ConstraintViolation(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }
}

impl AppError {
    /// Stable machine-readable name, used in logs, spans and batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidIdentifier(_) => "invalid_identifier",
            AppError::ProfileNotFound(_) => "profile_not_found",
            AppError::ForeignKeyViolation { .. } => "foreign_key_violation",
            AppError::ConstraintViolation(_) => "constraint_violation",
            AppError::Database(_) => "database_error",
            AppError::NotFound(_) => "not_found_error",
            AppError::Validation(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Transport and lock faults. These are the only errors worth a retry;
    /// everything else is a data-correctness problem.
    pub fn is_transient(&self) -> bool {
        let AppError::Database(err) = self else {
            return false;
        };

        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db_err) => {
                // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes
                let code = db_err.code();
                code.as_deref()
                    .and_then(|c| c.parse::<i64>().ok())
                    .is_some_and(|c| matches!(c & 0xff, 5 | 6))
            }
            _ => false,
        }
    }

    /// Logs the error and records it on an `app_error` span nested under
    /// whatever span is current.
    pub fn log_and_record(&self, ctx: &str) {
        let span = info_span!(
            "app_error",
            context = %ctx,
            error = Empty,
            error.type = Empty,
            error.message = Empty,
            otel.status_code = Empty,
        );
        let _entered = span.enter();

        let message = self.to_string();
        let error_kind = self.kind();

        match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
            }
            AppError::ForeignKeyViolation { reference, .. } => {
                warn!(message = %message, reference = %reference, context = %ctx, "Foreign key violation");
            }
            _ => {
                warn!(message = %message, kind = error_kind, context = %ctx, "Request failed");
            }
        }

        span.record("error", true);
        span.record(ERROR_TYPE, display(error_kind));
        span.record("error.message", display(&message));

        if matches!(self, AppError::Database(_) | AppError::Internal(_)) {
            span.record(OTEL_STATUS_CODE, display("ERROR"));
        }
    }

    pub fn status_code(&self) -> Status {
        match self {
            AppError::InvalidIdentifier(_) => Status::BadRequest,
            AppError::ProfileNotFound(_) => Status::NotFound,
            AppError::ForeignKeyViolation { .. } => Status::UnprocessableEntity,
            AppError::ConstraintViolation(_) => Status::Conflict,
            AppError::Database(_) if self.is_transient() => Status::ServiceUnavailable,
            AppError::Database(_) => Status::InternalServerError,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Internal(_) => Status::InternalServerError,
        }
    }

    pub fn to_status_with_log(&self, context: &str) -> Status {
        self.log_and_record(context);
        self.status_code()
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.to_status_with_log(&format!("Request to {} {}", req.method(), req.uri()))
            .respond_to(req)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        err.to_status_with_log("Error conversion into Status")
    }
}
