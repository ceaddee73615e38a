//! Read-only report: resolves each identifier given on the command line to a
//! student profile, then lists student accounts that still have no profile.
//!
//! Usage: `reconcile_identity [IDENTIFIER]...`
//!
//! Exits non-zero when any identifier does not resolve.

use anyhow::Context;
use student_records::connect_database;
use student_records::db::users_without_profiles;
use student_records::directory::SqliteDirectory;
use student_records::env::{Settings, load_environment};
use student_records::identity::resolve_profile;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    load_environment().context("Failed to load environment files")?;
    let settings = Settings::from_env()?;

    let pool = connect_database(&settings)
        .await
        .with_context(|| format!("Failed to open database at {}", settings.database_url))?;
    let directory = SqliteDirectory::new(pool);

    let identifiers: Vec<String> = std::env::args().skip(1).collect();
    let mut unresolved = 0usize;

    for identifier in &identifiers {
        match resolve_profile(&directory, identifier).await {
            Ok(resolved) => println!(
                "{} -> profile {} (user {})",
                identifier, resolved.profile_id, resolved.user_id
            ),
            Err(err) => {
                unresolved += 1;
                println!("{} -> {}: {}", identifier, err.kind(), err);
            }
        }
    }

    let orphans = users_without_profiles(directory.pool()).await?;
    if orphans.is_empty() {
        println!("All student users have a profile ✓");
    } else {
        println!("Student users without a profile:");
        for user in &orphans {
            println!(
                "    {} {} {}",
                user.id,
                user.username,
                user.full_name.as_deref().unwrap_or("-")
            );
        }
    }

    ensure_all_resolved(unresolved, identifiers.len())
}

/// Fails the run so scripts see a non-zero exit when any identifier is unknown.
fn ensure_all_resolved(unresolved: usize, total: usize) -> anyhow::Result<()> {
    if unresolved > 0 {
        anyhow::bail!("{} of {} identifiers did not resolve", unresolved, total);
    }
    Ok(())
}
