//! Training-program assignment requests and the batch report contract.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::directory::StudentDirectory;
use crate::error::AppError;
use crate::identity::{ProfileId, ProgramId, UserId};
use crate::models::{AssignmentStatus, StudentTrainingProgram};

/// One `(student, program)` assignment. `profile_id` must be a real profile id,
/// usually from [`crate::identity::resolve_profile`].
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub profile_id: ProfileId,
    pub program_id: ProgramId,
    pub teacher_id: Option<UserId>,
    pub notes: Option<String>,
    pub status: AssignmentStatus,
}

impl AssignmentRequest {
    pub fn new(profile_id: ProfileId, program_id: ProgramId) -> Self {
        Self {
            profile_id,
            program_id,
            teacher_id: None,
            notes: None,
            status: AssignmentStatus::Active,
        }
    }

    pub fn teacher(mut self, teacher_id: UserId) -> Self {
        self.teacher_id = Some(teacher_id);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn status(mut self, status: AssignmentStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub assignment: StudentTrainingProgram,
    /// False when an existing row for the pair was updated in place.
    pub created: bool,
}

/// Many profiles, one program, one teacher.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchAssignmentRequest {
    pub program_id: ProgramId,
    pub teacher_id: Option<UserId>,
    #[validate(length(min = 1, message = "At least one profile id is required"))]
    pub profile_ids: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub item_id: String,
    pub error: String,
    pub kind: String,
}

/// Per-item outcome of a batch. `details` lists failures only, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    pub details: Vec<BatchFailure>,
}

impl BatchReport {
    fn record_success(&mut self) {
        self.success_count += 1;
        self.total_count += 1;
    }

    fn record_failure(&mut self, item_id: &str, err: &AppError) {
        self.failure_count += 1;
        self.total_count += 1;
        self.details.push(BatchFailure {
            item_id: item_id.to_string(),
            error: err.to_string(),
            kind: err.kind().to_string(),
        });
    }
}

/// Upserts every item independently. One bad id never stops the rest, and
/// rows written for good ids stay written.
#[instrument(skip(directory, request), fields(program_id = %request.program_id, items = request.profile_ids.len()))]
pub async fn batch_upsert<D>(directory: &D, request: &BatchAssignmentRequest) -> BatchReport
where
    D: StudentDirectory + ?Sized,
{
    info!("Running batch assignment");
    let mut report = BatchReport::default();

    for item_id in &request.profile_ids {
        let result = match ProfileId::parse(item_id) {
            Ok(profile_id) => {
                let item = AssignmentRequest {
                    profile_id,
                    program_id: request.program_id.clone(),
                    teacher_id: request.teacher_id.clone(),
                    notes: request.notes.clone(),
                    status: AssignmentStatus::Active,
                };
                directory.upsert_assignment(&item).await.map(|_| ())
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => report.record_success(),
            Err(err) => {
                warn!(item_id = %item_id, kind = err.kind(), error = %err, "Batch item failed");
                report.record_failure(item_id, &err);
            }
        }
    }

    info!(
        success_count = report.success_count,
        failure_count = report.failure_count,
        "Batch assignment finished"
    );
    report
}
