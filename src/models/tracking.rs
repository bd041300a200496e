use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use super::{MovieId, MovieRecord};
use crate::error::AppError;

/// Opaque handle assigned by a durable backend to a stored entry
pub type RecordId = Uuid;

const MAX_USER_ID_LEN: usize = 128;

/// Which list a tracked movie belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WatchStatus {
    WantToWatch,
    InProgress,
    Watched,
}

impl WatchStatus {
    pub const ALL: [WatchStatus; 3] = [
        WatchStatus::WantToWatch,
        WatchStatus::InProgress,
        WatchStatus::Watched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::WantToWatch => "want-to-watch",
            WatchStatus::InProgress => "in-progress",
            WatchStatus::Watched => "watched",
        }
    }
}

impl Display for WatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WatchStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Unknown status '{}', expected one of want-to-watch, in-progress, watched",
                    s
                ))
            })
    }
}

/// Identity of an authenticated user
///
/// Restricted to characters that are safe inside file names since the file
/// backend keys its blobs by owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.len() > MAX_USER_ID_LEN {
            return Err(AppError::Validation(format!(
                "User id must be 1-{} characters",
                MAX_USER_ID_LEN
            )));
        }

        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@');
        if !trimmed.chars().all(allowed) || trimmed.chars().all(|c| c == '.') {
            return Err(AppError::Validation(format!(
                "User id '{}' contains unsupported characters",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        UserId::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// A movie placed on one of a user's lists
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingEntry {
    pub movie_id: MovieId,
    pub owner_id: UserId,
    pub status: WatchStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Catalog data captured when the movie was tracked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie: Option<MovieRecord>,
}

impl TrackingEntry {
    pub fn new(owner_id: UserId, movie_id: MovieId, status: WatchStatus, now: DateTime<Utc>) -> Self {
        Self {
            movie_id,
            owner_id,
            status,
            last_updated: now,
            record_id: None,
            movie: None,
        }
    }

    /// Moves the entry to `status`, never letting `last_updated` go backwards
    pub fn restamp(&mut self, status: WatchStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_updated = self.last_updated.max(now);
    }
}
