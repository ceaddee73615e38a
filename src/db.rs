use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::{
    assignment::{AssignmentRequest, UpsertOutcome},
    error::{AppError, MissingReference},
    identity::{ProfileId, ProgramId, UserId},
    models::{
        DbStudentProfile, DbStudentTrainingProgram, DbTechnicalTag, DbTrainingProgram, DbUser,
        NewProfile, StudentProfile, StudentTrainingProgram, TechnicalTag, TrainingProgram, User,
    },
};

const USER_COLUMNS: &str = "id, username, email, full_name, user_number, role_id, status";

const PROFILE_COLUMNS: &str = "id, user_id, full_name, student_number, class_name, major, \
     department, academic_status, profile_status, created_at, updated_at";

const ASSIGNMENT_COLUMNS: &str = "id, student_id, program_id, teacher_id, status, \
     enrollment_date, notes, created_at, updated_at";

pub const STUDENT_ROLE_ID: i64 = 3;
pub const TEACHER_ROLE_ID: i64 = 2;

#[instrument(skip(pool))]
pub async fn find_user(pool: &Pool<Sqlite>, id: &UserId) -> Result<Option<User>, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: &UserId) -> Result<User, AppError> {
    match find_user(pool, id).await? {
        Some(user) => Ok(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    full_name: Option<&str>,
    role_id: i64,
) -> Result<UserId, AppError> {
    info!("Creating new user");
    let id = UserId::new_v4();

    sqlx::query("INSERT INTO users (id, username, full_name, role_id) VALUES (?, ?, ?, ?)")
        .bind(id.as_str())
        .bind(username)
        .bind(full_name)
        .bind(role_id)
        .execute(pool)
        .await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn find_profile_by_id(
    pool: &Pool<Sqlite>,
    id: &ProfileId,
) -> Result<Option<StudentProfile>, AppError> {
    info!("Fetching student profile by primary key");
    let row = sqlx::query_as::<_, DbStudentProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE id = ?"
    ))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StudentProfile::from))
}

#[instrument(skip(pool))]
pub async fn find_profile_by_user_id(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
) -> Result<Option<StudentProfile>, AppError> {
    info!("Fetching student profile by user id");
    let row = sqlx::query_as::<_, DbStudentProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM student_profiles WHERE user_id = ?"
    ))
    .bind(user_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StudentProfile::from))
}

/// The explicit step for binding a profile to an account. Resolution never
/// does this on its own.
#[instrument(skip(pool, profile))]
pub async fn create_profile(
    pool: &Pool<Sqlite>,
    user_id: &UserId,
    profile: &NewProfile,
) -> Result<StudentProfile, AppError> {
    info!("Creating student profile");

    // Surfaces a missing account as NotFound rather than an anonymous FK failure
    let user = get_user(pool, user_id).await?;
    if user.role_id != STUDENT_ROLE_ID {
        return Err(AppError::Validation(format!(
            "User {} is not a student and cannot own a student profile",
            user_id
        )));
    }

    let id = ProfileId::new_v4();
    let now = Utc::now().naive_utc();

    let row = sqlx::query_as::<_, DbStudentProfile>(&format!(
        "INSERT INTO student_profiles
         (id, user_id, full_name, student_number, class_name, major, department, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(id.as_str())
    .bind(user_id.as_str())
    .bind(profile.full_name.as_deref())
    .bind(profile.student_number.as_deref())
    .bind(profile.class_name.as_deref())
    .bind(profile.major.as_deref())
    .bind(profile.department.as_deref())
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::ConstraintViolation(msg) => AppError::ConstraintViolation(format!(
            "user {} already has a student profile ({})",
            user_id, msg
        )),
        other => other,
    })?;

    let profile = StudentProfile::from(row);
    info!(profile_id = %profile.id, user_id = %user_id, "Student profile created");
    Ok(profile)
}

/// Student accounts with no profile. These cannot be assigned anything until a
/// profile is created for them.
#[instrument(skip(pool))]
pub async fn users_without_profiles(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Listing student users without profiles");
    let rows = sqlx::query_as::<_, DbUser>(
        "SELECT u.id, u.username, u.email, u.full_name, u.user_number, u.role_id, u.status
         FROM users u
         LEFT JOIN student_profiles p ON p.user_id = u.id
         WHERE u.role_id = ? AND p.id IS NULL
         ORDER BY u.username",
    )
    .bind(STUDENT_ROLE_ID)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument(skip(pool))]
pub async fn create_training_program(
    pool: &Pool<Sqlite>,
    program_name: &str,
    program_code: &str,
) -> Result<ProgramId, AppError> {
    info!("Creating training program");
    let id = ProgramId::new_v4();

    sqlx::query("INSERT INTO training_programs (id, program_name, program_code) VALUES (?, ?, ?)")
        .bind(id.as_str())
        .bind(program_name)
        .bind(program_code)
        .execute(pool)
        .await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn find_training_program(
    pool: &Pool<Sqlite>,
    id: &ProgramId,
) -> Result<Option<TrainingProgram>, AppError> {
    info!("Fetching training program");
    let row = sqlx::query_as::<_, DbTrainingProgram>(
        "SELECT id, program_name, program_code, status FROM training_programs WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(TrainingProgram::from))
}

/// Student accounts may not supervise other students.
fn ensure_can_supervise(teacher: &User) -> Result<(), AppError> {
    if teacher.role_id == STUDENT_ROLE_ID {
        return Err(AppError::Validation(format!(
            "User {} is a student and cannot supervise other students",
            teacher.id
        )));
    }
    Ok(())
}

/// Inserts or updates the assignment for `(profile_id, program_id)` in a single
/// statement. The `(student_id, program_id)` unique constraint makes this safe
/// against concurrent callers; the assignment row is never read before the write.
///
/// New rows always start `active`. The requested status only applies when an
/// existing row is updated.
#[instrument(skip(pool, request), fields(profile_id = %request.profile_id, program_id = %request.program_id))]
pub async fn upsert_assignment(
    pool: &Pool<Sqlite>,
    request: &AssignmentRequest,
) -> Result<UpsertOutcome, AppError> {
    info!("Upserting training program assignment");
    let candidate_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let teacher_id = request.teacher_id.as_ref().map(|t| t.as_str());

    // A missing teacher is left to the foreign key so it is reported as such
    if let Some(teacher_id) = &request.teacher_id {
        if let Some(teacher) = find_user(pool, teacher_id).await? {
            ensure_can_supervise(&teacher)?;
        }
    }

    let result = sqlx::query_as::<_, DbStudentTrainingProgram>(&format!(
        "INSERT INTO student_training_programs
         (id, student_id, program_id, teacher_id, status, enrollment_date, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, 'active', ?, ?, ?, ?)
         ON CONFLICT (student_id, program_id) DO UPDATE SET
             status = ?,
             notes = excluded.notes,
             teacher_id = COALESCE(excluded.teacher_id, student_training_programs.teacher_id),
             updated_at = excluded.updated_at
         RETURNING {ASSIGNMENT_COLUMNS}"
    ))
    .bind(&candidate_id)
    .bind(request.profile_id.as_str())
    .bind(request.program_id.as_str())
    .bind(teacher_id)
    .bind(now.date_naive())
    .bind(request.notes.as_deref())
    .bind(now.naive_utc())
    .bind(now.naive_utc())
    .bind(request.status.as_str())
    .fetch_one(pool)
    .await;

    let row = match result {
        Ok(row) => row,
        Err(err) => {
            return Err(match AppError::from(err) {
                AppError::ForeignKeyViolation { message, .. } => {
                    let reference = missing_assignment_reference(pool, request).await?;
                    warn!(reference = %reference, "Assignment references a missing row");
                    AppError::ForeignKeyViolation { reference, message }
                }
                other => other,
            });
        }
    };

    let assignment = StudentTrainingProgram::from(row);
    let created = assignment.id == candidate_id;
    info!(assignment_id = %assignment.id, created, "Assignment stored");

    Ok(UpsertOutcome {
        assignment,
        created,
    })
}

/// Works out which foreign key an assignment write tripped over. Only runs
/// after the write has already failed.
async fn missing_assignment_reference(
    pool: &Pool<Sqlite>,
    request: &AssignmentRequest,
) -> Result<MissingReference, AppError> {
    let teacher_id = request.teacher_id.as_ref().map(|t| t.as_str());

    let (profile_exists, program_exists, teacher_exists) =
        sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT
                 EXISTS (SELECT 1 FROM student_profiles WHERE id = ?),
                 EXISTS (SELECT 1 FROM training_programs WHERE id = ?),
                 (? IS NULL OR EXISTS (SELECT 1 FROM users WHERE id = ?))",
        )
        .bind(request.profile_id.as_str())
        .bind(request.program_id.as_str())
        .bind(teacher_id)
        .bind(teacher_id)
        .fetch_one(pool)
        .await?;

    Ok(if profile_exists == 0 {
        MissingReference::StudentProfile
    } else if program_exists == 0 {
        MissingReference::TrainingProgram
    } else if teacher_exists == 0 {
        MissingReference::Teacher
    } else {
        MissingReference::Unknown
    })
}

#[instrument(skip(pool))]
pub async fn find_assignment(
    pool: &Pool<Sqlite>,
    profile_id: &ProfileId,
    program_id: &ProgramId,
) -> Result<Option<StudentTrainingProgram>, AppError> {
    info!("Fetching assignment");
    let row = sqlx::query_as::<_, DbStudentTrainingProgram>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM student_training_programs
         WHERE student_id = ? AND program_id = ?"
    ))
    .bind(profile_id.as_str())
    .bind(program_id.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(StudentTrainingProgram::from))
}

#[instrument(skip(pool))]
pub async fn assignments_for_profile(
    pool: &Pool<Sqlite>,
    profile_id: &ProfileId,
) -> Result<Vec<StudentTrainingProgram>, AppError> {
    info!("Getting assignments for profile");
    let rows = sqlx::query_as::<_, DbStudentTrainingProgram>(&format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM student_training_programs
         WHERE student_id = ?
         ORDER BY updated_at DESC"
    ))
    .bind(profile_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentTrainingProgram::from).collect())
}

/// Returns true if a new link was made, false if it already existed.
#[instrument(skip(pool))]
pub async fn link_teacher_student(
    pool: &Pool<Sqlite>,
    teacher_id: &UserId,
    profile_id: &ProfileId,
) -> Result<bool, AppError> {
    info!("Linking teacher to student");
    let teacher = get_user(pool, teacher_id).await?;
    ensure_can_supervise(&teacher)?;

    let now = Utc::now().naive_utc();
    let result = sqlx::query(
        "INSERT INTO teacher_student_relationships (teacher_id, student_profile_id, created_at)
         VALUES (?, ?, ?)
         ON CONFLICT (teacher_id, student_profile_id) DO NOTHING",
    )
    .bind(teacher_id.as_str())
    .bind(profile_id.as_str())
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::ForeignKeyViolation { message, .. } => AppError::ForeignKeyViolation {
            reference: MissingReference::StudentProfile,
            message,
        },
        other => other,
    })?;

    Ok(result.rows_affected() > 0)
}

#[instrument(skip(pool))]
pub async fn students_for_teacher(
    pool: &Pool<Sqlite>,
    teacher_id: &UserId,
) -> Result<Vec<StudentProfile>, AppError> {
    info!("Getting students for teacher");
    let rows = sqlx::query_as::<_, DbStudentProfile>(
        "SELECT p.id, p.user_id, p.full_name, p.student_number, p.class_name, p.major,
                p.department, p.academic_status, p.profile_status, p.created_at, p.updated_at
         FROM student_profiles p
         JOIN teacher_student_relationships r ON r.student_profile_id = p.id
         WHERE r.teacher_id = ?
         ORDER BY p.full_name",
    )
    .bind(teacher_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StudentProfile::from).collect())
}

/// Adding a tag the profile already has returns the existing row.
#[instrument(skip(pool))]
pub async fn add_technical_tag(
    pool: &Pool<Sqlite>,
    profile_id: &ProfileId,
    tag_name: &str,
) -> Result<TechnicalTag, AppError> {
    info!("Adding technical tag");
    let tag_name = tag_name.trim();
    if tag_name.is_empty() {
        return Err(AppError::Validation("Tag name cannot be empty".to_string()));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    let row = sqlx::query_as::<_, DbTechnicalTag>(
        "INSERT INTO technical_tags (id, student_profile_id, tag_name, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (student_profile_id, tag_name) DO UPDATE SET tag_name = excluded.tag_name
         RETURNING id, student_profile_id, tag_name, created_at",
    )
    .bind(&id)
    .bind(profile_id.as_str())
    .bind(tag_name)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::ForeignKeyViolation { message, .. } => AppError::ForeignKeyViolation {
            reference: MissingReference::StudentProfile,
            message,
        },
        other => other,
    })?;

    Ok(TechnicalTag::from(row))
}

#[instrument(skip(pool))]
pub async fn technical_tags_for_profile(
    pool: &Pool<Sqlite>,
    profile_id: &ProfileId,
) -> Result<Vec<TechnicalTag>, AppError> {
    info!("Getting technical tags for profile");
    let rows = sqlx::query_as::<_, DbTechnicalTag>(
        "SELECT id, student_profile_id, tag_name, created_at
         FROM technical_tags
         WHERE student_profile_id = ?
         ORDER BY tag_name",
    )
    .bind(profile_id.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(TechnicalTag::from).collect())
}
