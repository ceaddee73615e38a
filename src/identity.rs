//! Identifier parsing and user/profile identity resolution.
//!
//! A caller may hold either a `users.id` or a `student_profiles.id`. Tables that
//! reference students by foreign key want the profile id, so every write path
//! goes through [`resolve_profile`] (or is handed a [`ProfileId`] that came out
//! of the database) rather than passing bare strings around.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::directory::StudentDirectory;
use crate::error::AppError;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("identifier pattern is a valid regex")
});

/// A syntactically valid identifier whose kind (user or profile) is not yet known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Accepts the hyphenated 8-4-4-4-12 form only and lowercases it.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();
        if !IDENTIFIER_PATTERN.is_match(trimmed) {
            return Err(AppError::InvalidIdentifier(format!(
                "'{}' is not a hyphenated UUID",
                raw
            )));
        }

        let uuid = Uuid::parse_str(trimmed)
            .map_err(|e| AppError::InvalidIdentifier(format!("'{}': {}", raw, e)))?;

        Ok(Self(uuid.hyphenated().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, AppError> {
                Identifier::parse(raw).map(Self::from)
            }

            pub fn new_v4() -> Self {
                Self(Uuid::new_v4().hyphenated().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wraps a value read back from the database. Stored ids are
            /// already normalised.
            pub(crate) fn from_db(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<Identifier> for $name {
            fn from(id: Identifier) -> Self {
                Self(id.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AppError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(
    /// Primary key of `users`.
    UserId
);
typed_id!(
    /// Primary key of `student_profiles`. The only id accepted by assignment writes.
    ProfileId
);
typed_id!(
    /// Primary key of `training_programs`.
    ProgramId
);

/// The outcome of resolution: the profile to use for foreign keys, and the
/// account that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedProfile {
    pub profile_id: ProfileId,
    pub user_id: UserId,
}

/// Maps a user id or profile id to the student profile it designates.
///
/// Lookup order is profile primary key first, then `user_id`. Malformed input is
/// rejected before the directory is touched, and a missing profile is reported
/// as [`AppError::ProfileNotFound`]; nothing is ever created here.
#[instrument(skip(directory))]
pub async fn resolve_profile<D>(directory: &D, identifier: &str) -> Result<ResolvedProfile, AppError>
where
    D: StudentDirectory + ?Sized,
{
    let identifier = Identifier::parse(identifier)?;
    info!("Resolving student profile");

    let as_profile = ProfileId::from(identifier.clone());
    if let Some(profile) = directory.get_profile_by_primary_key(&as_profile).await? {
        info!(profile_id = %profile.id, user_id = %profile.user_id, "Identifier is a profile id");
        return Ok(ResolvedProfile {
            profile_id: profile.id,
            user_id: profile.user_id,
        });
    }

    let as_user = UserId::from(identifier.clone());
    if let Some(profile) = directory.get_profile_by_user_id(&as_user).await? {
        info!(profile_id = %profile.id, user_id = %profile.user_id, "Identifier is a user id");
        return Ok(ResolvedProfile {
            profile_id: profile.id,
            user_id: profile.user_id,
        });
    }

    warn!(identifier = %identifier, "No student profile bound to identifier");
    Err(AppError::ProfileNotFound(format!(
        "no student profile has id or user_id {}",
        identifier
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalises_case() {
        let id = Identifier::parse("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11").unwrap();
        assert_eq!(id.as_str(), "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11");
    }

    #[test]
    fn parse_accepts_placeholder_ids() {
        let id = Identifier::parse("00000000-0000-0000-0000-000000000102").unwrap();
        assert_eq!(id.as_str(), "00000000-0000-0000-0000-000000000102");
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for raw in [
            "",
            "student-42",
            "a0eebc999c0b4ef8bb6d6bb9bd380a11",
            "{a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11}",
            "urn:uuid:a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11",
            "g0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11",
            "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a1",
        ] {
            let err = Identifier::parse(raw).unwrap_err();
            assert!(
                matches!(err, AppError::InvalidIdentifier(_)),
                "{raw:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn resolved_profile_serialises_camel_case() {
        let resolved = ResolvedProfile {
            profile_id: ProfileId::parse("00000000-0000-0000-0000-000000000001").unwrap(),
            user_id: UserId::parse("00000000-0000-0000-0000-000000000002").unwrap(),
        };

        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["profileId"], "00000000-0000-0000-0000-000000000001");
        assert_eq!(value["userId"], "00000000-0000-0000-0000-000000000002");
    }
}
