use anyhow::Context;
use student_records::env::{Settings, load_environment};
use student_records::telemetry::init_tracing;
use student_records::{build_rocket, connect_database};
use tracing::info;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let env_report = load_environment().context("Failed to load environment files")?;
    let settings = Settings::from_env()?;

    let _otel_guard = init_tracing(&settings)?;
    env_report.log();

    let pool = connect_database(&settings)
        .await
        .with_context(|| format!("Failed to open database at {}", settings.database_url))?;

    build_rocket(pool)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket failed: {}", e))?;
    info!("Student records service stopped");

    Ok(())
}
