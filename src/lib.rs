pub mod api;
pub mod assignment;
pub mod db;
pub mod directory;
pub mod env;
pub mod error;
pub mod identity;
pub mod models;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;

use rocket::{Build, Rocket, catch, catchers, routes};
use rocket::{Request, http::Status, response::status::Custom, serde::json::Json};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::directory::SqliteDirectory;
use crate::env::Settings;
use crate::error::AppError;
use crate::telemetry::TelemetryFairing;
use crate::validation::{ToValidationResponse, ValidationResponse};

/// Opens the pool with foreign keys enforced and brings the schema up to date.
pub async fn connect_database(settings: &Settings) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    Ok(pool)
}

#[catch(400)]
fn bad_request(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::BadRequest.to_validation_response()
}

#[catch(404)]
fn not_found(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::NotFound.to_validation_response()
}

#[catch(422)]
fn unprocessable(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

#[catch(500)]
fn internal_error(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::InternalServerError.to_validation_response()
}

pub fn build_rocket(pool: Pool<Sqlite>) -> Rocket<Build> {
    info!("Starting student records service");

    rocket::build()
        .manage(SqliteDirectory::new(pool.clone()))
        .manage(pool)
        .mount(
            "/api",
            routes![
                api::health,
                api::api_resolve_profile,
                api::api_create_profile,
                api::api_get_profile_assignments,
                api::api_get_profile_tags,
                api::api_add_profile_tag,
                api::api_assign_program,
                api::api_batch_assign_program,
                api::api_link_teacher_student,
                api::api_get_teacher_students,
                api::api_users_without_profiles,
            ],
        )
        .register("/api", catchers![bad_request, not_found, unprocessable, internal_error])
        .attach(TelemetryFairing)
}
