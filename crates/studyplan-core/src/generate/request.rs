//! The validated input of a generation call and how it is assembled from a
//! study profile plus per-request overrides.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use studyplan_db::models::{
    FocusArea, Language, ParseEnumError, ResourceType, StudyLevel, StudyProfile, parse_tags,
};

/// Upper bound of the daily time budget, one full day.
pub const MAX_DAILY_MINUTES: u32 = 1440;

/// Daily budget used when neither the request nor a profile provides one.
pub const DEFAULT_DAILY_MINUTES: u32 = 30;

/// Maximum plan title length, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

/// Errors from assembling or validating a [`LearningRequest`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("goal must not be empty")]
    EmptyGoal,

    #[error("daily minutes must be between 1 and {MAX_DAILY_MINUTES}, got {0}")]
    DailyMinutesOutOfRange(u32),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title must be at most {MAX_TITLE_CHARS} characters, got {0}")]
    TitleTooLong(usize),

    #[error(transparent)]
    UnknownTag(#[from] ParseEnumError),
}

/// Structured learning preferences handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRequest {
    pub goal: String,
    pub level: StudyLevel,
    pub daily_minutes: u32,
    pub deadline: Option<NaiveDate>,
    /// Ordered, duplicate-free.
    pub focus_areas: Vec<FocusArea>,
    /// Ordered, duplicate-free.
    pub preferred_resources: Vec<ResourceType>,
    pub language: Language,
}

/// Per-request values that take precedence over the stored profile.
///
/// Tags arrive as raw strings and are checked against the vocabularies when
/// the request is resolved. An empty tag list counts as "not given".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestOverrides {
    #[serde(default)]
    pub current_level: Option<StudyLevel>,
    #[serde(default)]
    pub daily_minutes: Option<u32>,
    #[serde(default)]
    pub focus_areas: Option<Vec<String>>,
    #[serde(default)]
    pub preferred_resources: Option<Vec<String>>,
}

impl LearningRequest {
    /// Combine overrides with the user's profile. Without a profile the
    /// fallbacks are beginner, 30 minutes, no tags and English.
    pub fn resolve(
        goal: &str,
        deadline: Option<NaiveDate>,
        overrides: &RequestOverrides,
        profile: Option<&StudyProfile>,
    ) -> Result<Self, RequestError> {
        let level = overrides
            .current_level
            .or(profile.map(|p| p.current_level))
            .unwrap_or_default();

        let daily_minutes = match overrides.daily_minutes {
            Some(minutes) => minutes,
            None => profile
                .and_then(|p| u32::try_from(p.daily_minutes).ok())
                .unwrap_or(DEFAULT_DAILY_MINUTES),
        };

        let focus_areas = match non_empty(&overrides.focus_areas) {
            Some(tags) => parse_tags(tags)?,
            None => match profile {
                Some(p) => p.focus_areas()?,
                None => Vec::new(),
            },
        };

        let preferred_resources = match non_empty(&overrides.preferred_resources) {
            Some(tags) => parse_tags(tags)?,
            None => match profile {
                Some(p) => p.preferred_resources()?,
                None => Vec::new(),
            },
        };

        let request = Self {
            goal: goal.trim().to_owned(),
            level,
            daily_minutes,
            deadline,
            focus_areas: dedup(focus_areas),
            preferred_resources: dedup(preferred_resources),
            language: profile.map(|p| p.preferred_language).unwrap_or_default(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the invariants the generator relies on.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.goal.trim().is_empty() {
            return Err(RequestError::EmptyGoal);
        }
        if !(1..=MAX_DAILY_MINUTES).contains(&self.daily_minutes) {
            return Err(RequestError::DailyMinutesOutOfRange(self.daily_minutes));
        }
        Ok(())
    }
}

/// Validate a plan title.
pub fn validate_title(title: &str) -> Result<(), RequestError> {
    if title.trim().is_empty() {
        return Err(RequestError::EmptyTitle);
    }
    let chars = title.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(RequestError::TitleTooLong(chars));
    }
    Ok(())
}

fn non_empty(tags: &Option<Vec<String>>) -> Option<&[String]> {
    tags.as_deref().filter(|t| !t.is_empty())
}

/// Drop repeated tags, keeping the first occurrence.
fn dedup<T: PartialEq>(tags: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
