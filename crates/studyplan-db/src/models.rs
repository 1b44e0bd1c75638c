use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enum plumbing
// ---------------------------------------------------------------------------

/// Error returned when a string is not one of an enum's textual values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}; must be one of {}", .allowed.join(", "))]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
    pub allowed: &'static [&'static str],
}

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a fieldless enum
/// stored as text.
macro_rules! text_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Textual values accepted by `FromStr`, in declaration order.
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $label,
                        value: other.to_owned(),
                        allowed: $ty::VALUES,
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Account role. Admin rights are a superset of user rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

text_enum!(Role, "role", {
    User => "user",
    Admin => "admin",
    SuperAdmin => "superadmin",
});

impl Role {
    pub fn is_super_admin(self) -> bool {
        self == Self::SuperAdmin
    }
}

/// Self-assessed proficiency of the learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StudyLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

text_enum!(StudyLevel, "level", {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

/// Interface / target language of the learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
}

text_enum!(Language, "language", {
    En => "en",
    Ru => "ru",
});

/// Skill dimension a task trains.
///
/// Stored as plain strings in `study_profiles.focus_areas`; parse with
/// [`FromStr`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusArea {
    Speaking,
    Listening,
    Reading,
    Writing,
    Grammar,
    Vocabulary,
}

text_enum!(FocusArea, "focus area", {
    Speaking => "speaking",
    Listening => "listening",
    Reading => "reading",
    Writing => "writing",
    Grammar => "grammar",
    Vocabulary => "vocabulary",
});

/// Kind of learning material.
///
/// `FromStr` is strict (plural forms only). Deserialization also accepts the
/// singular forms, which language models tend to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[serde(alias = "video")]
    Videos,
    #[serde(alias = "book")]
    Books,
    #[serde(alias = "app")]
    Apps,
    #[serde(alias = "podcast")]
    Podcasts,
    #[serde(alias = "website")]
    Websites,
}

text_enum!(ResourceType, "resource type", {
    Videos => "videos",
    Books => "books",
    Apps => "apps",
    Podcasts => "podcasts",
    Websites => "websites",
});

/// Parse a list of stored tags, failing on the first unknown one.
pub fn parse_tags<T>(tags: &[String]) -> Result<Vec<T>, ParseEnumError>
where
    T: FromStr<Err = ParseEnumError>,
{
    tags.iter().map(|t| t.parse()).collect()
}

/// Render typed tags back into their stored form.
pub fn tag_strings<T: fmt::Display>(tags: &[T]) -> Vec<String> {
    tags.iter().map(ToString::to_string).collect()
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// An account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Study preferences attached one-to-one to a user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudyProfile {
    pub user_id: Uuid,
    pub current_level: StudyLevel,
    pub daily_minutes: i32,
    pub preferred_language: Language,
    pub study_goal: String,
    pub focus_areas: Vec<String>,
    pub preferred_resources: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudyProfile {
    pub fn focus_areas(&self) -> Result<Vec<FocusArea>, ParseEnumError> {
        parse_tags(&self.focus_areas)
    }

    pub fn preferred_resources(&self) -> Result<Vec<ResourceType>, ParseEnumError> {
        parse_tags(&self.preferred_resources)
    }
}

/// A plan header. Content lives in [`PlanVersion`] rows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub goal_text: String,
    pub deadline: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable generated snapshot of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanVersion {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub version_number: i32,
    pub content_json: serde_json::Value,
    pub prompt_used: String,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
