use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::AppError;
use crate::identity::{ProfileId, ProgramId, UserId};

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub user_number: Option<String>,
    pub role_id: i64,
    pub status: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub user_number: Option<String>,
    pub role_id: Option<i64>,
    pub status: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: UserId::from_db(user.id.unwrap_or_default()),
            username: user.username.unwrap_or_default(),
            email: user.email,
            full_name: user.full_name,
            user_number: user.user_number,
            role_id: user.role_id.unwrap_or_default(),
            status: user.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: ProfileId,
    pub user_id: UserId,
    pub full_name: Option<String>,
    pub student_number: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub department: Option<String>,
    pub academic_status: String,
    pub profile_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbStudentProfile {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub full_name: Option<String>,
    pub student_number: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub department: Option<String>,
    pub academic_status: Option<String>,
    pub profile_status: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbStudentProfile> for StudentProfile {
    fn from(db: DbStudentProfile) -> Self {
        Self {
            id: ProfileId::from_db(db.id.unwrap_or_default()),
            user_id: UserId::from_db(db.user_id.unwrap_or_default()),
            full_name: db.full_name,
            student_number: db.student_number,
            class_name: db.class_name,
            major: db.major,
            department: db.department,
            academic_status: db.academic_status.unwrap_or_default(),
            profile_status: db.profile_status.unwrap_or_default(),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// Fields supplied by whoever explicitly creates a profile. Nothing here is
/// guessed or defaulted from the user row.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    #[validate(length(min = 1, max = 200, message = "Full name must be 1-200 characters"))]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Student number must be 1-64 characters"))]
    pub student_number: Option<String>,
    pub class_name: Option<String>,
    pub major: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgram {
    pub id: ProgramId,
    pub program_name: String,
    pub program_code: String,
    pub status: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTrainingProgram {
    pub id: Option<String>,
    pub program_name: Option<String>,
    pub program_code: Option<String>,
    pub status: Option<String>,
}

impl From<DbTrainingProgram> for TrainingProgram {
    fn from(db: DbTrainingProgram) -> Self {
        Self {
            id: ProgramId::from_db(db.id.unwrap_or_default()),
            program_name: db.program_name.unwrap_or_default(),
            program_code: db.program_code.unwrap_or_default(),
            status: db.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Active,
    Completed,
    Suspended,
    Withdrawn,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Suspended => "suspended",
            AssignmentStatus::Withdrawn => "withdrawn",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "completed" => Ok(AssignmentStatus::Completed),
            "suspended" => Ok(AssignmentStatus::Suspended),
            "withdrawn" => Ok(AssignmentStatus::Withdrawn),
            _ => Err(AppError::Validation(format!(
                "Unknown assignment status: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of `student_training_programs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTrainingProgram {
    pub id: String,
    pub student_id: ProfileId,
    pub program_id: ProgramId,
    pub teacher_id: Option<UserId>,
    pub status: AssignmentStatus,
    pub enrollment_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbStudentTrainingProgram {
    pub id: Option<String>,
    pub student_id: Option<String>,
    pub program_id: Option<String>,
    pub teacher_id: Option<String>,
    pub status: Option<String>,
    pub enrollment_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbStudentTrainingProgram> for StudentTrainingProgram {
    fn from(db: DbStudentTrainingProgram) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            student_id: ProfileId::from_db(db.student_id.unwrap_or_default()),
            program_id: ProgramId::from_db(db.program_id.unwrap_or_default()),
            teacher_id: db.teacher_id.map(UserId::from_db),
            // the CHECK constraint keeps this column inside the enum
            status: db
                .status
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            enrollment_date: db
                .enrollment_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            notes: db.notes,
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalTag {
    pub id: String,
    pub student_profile_id: ProfileId,
    pub tag_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTechnicalTag {
    pub id: Option<String>,
    pub student_profile_id: Option<String>,
    pub tag_name: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbTechnicalTag> for TechnicalTag {
    fn from(db: DbTechnicalTag) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            student_profile_id: ProfileId::from_db(db.student_profile_id.unwrap_or_default()),
            tag_name: db.tag_name.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}
