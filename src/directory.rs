//! The narrow data-access interface consumed by identity resolution and
//! assignment.

use std::future::Future;
use std::time::Duration;

use sqlx::{Pool, Sqlite};
use tracing::warn;

use crate::assignment::{self, AssignmentRequest, BatchAssignmentRequest, BatchReport, UpsertOutcome};
use crate::db;
use crate::error::AppError;
use crate::identity::{ProfileId, UserId};
use crate::models::{StudentProfile, User};

const RETRY_DELAY: Duration = Duration::from_millis(50);

#[rocket::async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, AppError>;

    async fn get_profile_by_primary_key(
        &self,
        id: &ProfileId,
    ) -> Result<Option<StudentProfile>, AppError>;

    async fn get_profile_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<StudentProfile>, AppError>;

    /// Must be a single atomic write keyed on `(student_id, program_id)`.
    async fn upsert_assignment(&self, request: &AssignmentRequest)
    -> Result<UpsertOutcome, AppError>;

    async fn batch_upsert_assignment(&self, request: &BatchAssignmentRequest) -> BatchReport {
        assignment::batch_upsert(self, request).await
    }
}

/// Runs `op`, and runs it once more if the first failure was transient.
/// Every operation behind the directory is idempotent, so a repeat is safe.
async fn retry_once<T, F, Fut>(operation: &'static str, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    match op().await {
        Err(err) if err.is_transient() => {
            warn!(operation, error = %err, "Transient database error, retrying once");
            rocket::tokio::time::sleep(RETRY_DELAY).await;
            op().await
        }
        other => other,
    }
}

#[derive(Clone, Debug)]
pub struct SqliteDirectory {
    pool: Pool<Sqlite>,
}

impl SqliteDirectory {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[rocket::async_trait]
impl StudentDirectory for SqliteDirectory {
    async fn get_user_by_id(&self, id: &UserId) -> Result<Option<User>, AppError> {
        retry_once("get_user_by_id", || db::find_user(&self.pool, id)).await
    }

    async fn get_profile_by_primary_key(
        &self,
        id: &ProfileId,
    ) -> Result<Option<StudentProfile>, AppError> {
        retry_once("get_profile_by_primary_key", || {
            db::find_profile_by_id(&self.pool, id)
        })
        .await
    }

    async fn get_profile_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<StudentProfile>, AppError> {
        retry_once("get_profile_by_user_id", || {
            db::find_profile_by_user_id(&self.pool, user_id)
        })
        .await
    }

    async fn upsert_assignment(
        &self,
        request: &AssignmentRequest,
    ) -> Result<UpsertOutcome, AppError> {
        retry_once("upsert_assignment", || {
            db::upsert_assignment(&self.pool, request)
        })
        .await
    }
}
