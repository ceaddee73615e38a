use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::assignment::{AssignmentRequest, BatchAssignmentRequest, BatchReport, UpsertOutcome};
use crate::db::{
    add_technical_tag, assignments_for_profile, create_profile, link_teacher_student,
    students_for_teacher, technical_tags_for_profile, users_without_profiles,
};
use crate::directory::{SqliteDirectory, StudentDirectory};
use crate::identity::{ProgramId, ResolvedProfile, UserId, resolve_profile};
use crate::models::{
    AssignmentStatus, NewProfile, StudentProfile, StudentTrainingProgram, TechnicalTag, User,
};
use crate::validation::{ApiError, AppErrorExt, JsonValidateExt};

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/resolve/<identifier>")]
pub async fn api_resolve_profile(
    identifier: &str,
    directory: &State<SqliteDirectory>,
) -> Result<Json<ResolvedProfile>, ApiError> {
    let resolved = resolve_profile(directory.inner(), identifier)
        .await
        .validate_custom()?;

    Ok(Json(resolved))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    user_id: String,
    #[serde(flatten)]
    #[validate(nested)]
    profile: NewProfile,
}

#[post("/profiles", data = "<request>")]
pub async fn api_create_profile(
    request: Json<CreateProfileRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<StudentProfile>>, ApiError> {
    let validated = request.validate_custom()?;
    let user_id = UserId::parse(&validated.user_id).validate_custom()?;

    let profile = create_profile(db, &user_id, &validated.profile)
        .await
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(profile)))
}

#[get("/profiles/<identifier>/assignments")]
pub async fn api_get_profile_assignments(
    identifier: &str,
    directory: &State<SqliteDirectory>,
) -> Result<Json<Vec<StudentTrainingProgram>>, ApiError> {
    let resolved = resolve_profile(directory.inner(), identifier)
        .await
        .validate_custom()?;

    let assignments = assignments_for_profile(directory.pool(), &resolved.profile_id)
        .await
        .validate_custom()?;

    Ok(Json(assignments))
}

#[derive(Serialize)]
pub struct TagsResponse {
    pub tags: Vec<TechnicalTag>,
}

#[get("/profiles/<identifier>/tags")]
pub async fn api_get_profile_tags(
    identifier: &str,
    directory: &State<SqliteDirectory>,
) -> Result<Json<TagsResponse>, ApiError> {
    let resolved = resolve_profile(directory.inner(), identifier)
        .await
        .validate_custom()?;

    let tags = technical_tags_for_profile(directory.pool(), &resolved.profile_id)
        .await
        .validate_custom()?;

    Ok(Json(TagsResponse { tags }))
}

#[derive(Deserialize, Validate)]
pub struct AddTagRequest {
    #[validate(length(min = 1, max = 64, message = "Tag name must be 1-64 characters"))]
    name: String,
}

#[post("/profiles/<identifier>/tags", data = "<request>")]
pub async fn api_add_profile_tag(
    identifier: &str,
    request: Json<AddTagRequest>,
    directory: &State<SqliteDirectory>,
) -> Result<Json<TechnicalTag>, ApiError> {
    let validated = request.validate_custom()?;

    let resolved = resolve_profile(directory.inner(), identifier)
        .await
        .validate_custom()?;

    let tag = add_technical_tag(directory.pool(), &resolved.profile_id, &validated.name)
        .await
        .validate_custom()?;

    Ok(Json(tag))
}

/// `identifier` may be a user id or a profile id; it is resolved before the write.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssignProgramRequest {
    identifier: String,
    program_id: ProgramId,
    teacher_id: Option<UserId>,
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    notes: Option<String>,
    #[serde(default)]
    status: AssignmentStatus,
}

#[post("/assignments", data = "<request>")]
pub async fn api_assign_program(
    request: Json<AssignProgramRequest>,
    directory: &State<SqliteDirectory>,
) -> Result<Custom<Json<UpsertOutcome>>, ApiError> {
    let validated = request.validate_custom()?;

    let resolved = resolve_profile(directory.inner(), &validated.identifier)
        .await
        .validate_custom()?;

    let assignment = AssignmentRequest {
        profile_id: resolved.profile_id,
        program_id: validated.program_id,
        teacher_id: validated.teacher_id,
        notes: validated.notes,
        status: validated.status,
    };

    let outcome = directory
        .upsert_assignment(&assignment)
        .await
        .validate_custom()?;

    let status = if outcome.created {
        Status::Created
    } else {
        Status::Ok
    };

    Ok(Custom(status, Json(outcome)))
}

#[post("/assignments/batch", data = "<request>")]
pub async fn api_batch_assign_program(
    request: Json<BatchAssignmentRequest>,
    directory: &State<SqliteDirectory>,
) -> Result<Json<BatchReport>, ApiError> {
    let request = request.validate_custom()?;

    Ok(Json(directory.batch_upsert_assignment(&request).await))
}

#[derive(Deserialize)]
pub struct LinkStudentRequest {
    identifier: String,
}

#[derive(Serialize, Deserialize)]
pub struct LinkStudentResponse {
    pub linked: bool,
}

#[post("/teachers/<teacher_id>/students", data = "<request>")]
pub async fn api_link_teacher_student(
    teacher_id: &str,
    request: Json<LinkStudentRequest>,
    directory: &State<SqliteDirectory>,
) -> Result<Json<LinkStudentResponse>, ApiError> {
    let teacher_id = UserId::parse(teacher_id).validate_custom()?;

    let resolved = resolve_profile(directory.inner(), &request.identifier)
        .await
        .validate_custom()?;

    let linked = link_teacher_student(directory.pool(), &teacher_id, &resolved.profile_id)
        .await
        .validate_custom()?;

    Ok(Json(LinkStudentResponse { linked }))
}

#[get("/teachers/<teacher_id>/students")]
pub async fn api_get_teacher_students(
    teacher_id: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<StudentProfile>>, ApiError> {
    let teacher_id = UserId::parse(teacher_id).validate_custom()?;

    let students = students_for_teacher(db, &teacher_id)
        .await
        .validate_custom()?;

    Ok(Json(students))
}

#[get("/diagnostics/users-without-profiles")]
pub async fn api_users_without_profiles(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = users_without_profiles(db).await.validate_custom()?;
    Ok(Json(users))
}
