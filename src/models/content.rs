//! Lifecycle and language shared by articles and blogs
//!
//! `PublishState` is the single source of truth for whether a content item is
//! visible. The `published` flag exposed over the API is derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stored status column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::Scheduled => "SCHEDULED",
            ContentStatus::Published => "PUBLISHED",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(ContentStatus::Draft),
            "SCHEDULED" => Ok(ContentStatus::Scheduled),
            "PUBLISHED" => Ok(ContentStatus::Published),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

/// Lifecycle of an article or blog post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    /// Not visible. Remembers when it was last published, if ever.
    Draft {
        last_published_at: Option<DateTime<Utc>>,
    },
    /// Becomes visible once `at` has passed.
    Scheduled { at: DateTime<Utc> },
    Published { at: DateTime<Utc> },
}

impl Default for PublishState {
    fn default() -> Self {
        PublishState::Draft {
            last_published_at: None,
        }
    }
}

/// Requested lifecycle change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Draft,
    Publish,
    Schedule(DateTime<Utc>),
}

impl StatusChange {
    /// Interpret the `status` / `scheduledAt` pair sent by clients.
    ///
    /// `Ok(None)` means no change was requested.
    pub fn from_request(
        status: Option<&str>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, String> {
        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<ContentStatus>()?),
            None => None,
        };

        match (status, scheduled_at) {
            (Some(ContentStatus::Draft), _) => Ok(Some(StatusChange::Draft)),
            (Some(ContentStatus::Published), _) => Ok(Some(StatusChange::Publish)),
            (Some(ContentStatus::Scheduled), Some(at)) | (None, Some(at)) => {
                Ok(Some(StatusChange::Schedule(at)))
            }
            (Some(ContentStatus::Scheduled), None) => {
                Err("scheduledAt is required when status is SCHEDULED".to_string())
            }
            (None, None) => Ok(None),
        }
    }
}

impl PublishState {
    /// Rebuild the state from its stored columns.
    pub fn from_columns(
        status: &str,
        published_at: Option<DateTime<Utc>>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Self {
        match status.parse::<ContentStatus>() {
            Ok(ContentStatus::Published) => PublishState::Published {
                at: published_at.or(scheduled_at).unwrap_or_else(Utc::now),
            },
            Ok(ContentStatus::Scheduled) => match scheduled_at {
                Some(at) => PublishState::Scheduled { at },
                None => PublishState::Draft {
                    last_published_at: published_at,
                },
            },
            _ => PublishState::Draft {
                last_published_at: published_at,
            },
        }
    }

    pub fn status(&self) -> ContentStatus {
        match self {
            PublishState::Draft { .. } => ContentStatus::Draft,
            PublishState::Scheduled { .. } => ContentStatus::Scheduled,
            PublishState::Published { .. } => ContentStatus::Published,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, PublishState::Published { .. })
    }

    /// Value stored in the `published_at` column
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PublishState::Published { at } => Some(*at),
            PublishState::Draft { last_published_at } => *last_published_at,
            PublishState::Scheduled { .. } => None,
        }
    }

    /// Value stored in the `scheduled_at` column
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PublishState::Scheduled { at } => Some(*at),
            _ => None,
        }
    }

    /// The one transition function for content lifecycles.
    ///
    /// Publishing keeps an earlier publication timestamp when there is one;
    /// unpublishing keeps it too, so a later re-publish does not reset it.
    /// Scheduling into the past publishes immediately.
    pub fn transition(self, change: StatusChange, now: DateTime<Utc>) -> Self {
        match change {
            StatusChange::Draft => PublishState::Draft {
                last_published_at: self.published_at(),
            },
            StatusChange::Publish => match self {
                PublishState::Published { .. } => self,
                PublishState::Draft { last_published_at } => PublishState::Published {
                    at: last_published_at.unwrap_or(now),
                },
                PublishState::Scheduled { .. } => PublishState::Published { at: now },
            },
            StatusChange::Schedule(at) if at <= now => self.transition(StatusChange::Publish, now),
            StatusChange::Schedule(at) => match self {
                PublishState::Published { .. } => self,
                _ => PublishState::Scheduled { at },
            },
        }
    }

    /// Visibility toggle: published items go back to draft, anything else is published.
    pub fn toggled(self, now: DateTime<Utc>) -> Self {
        if self.is_published() {
            self.transition(StatusChange::Draft, now)
        } else {
            self.transition(StatusChange::Publish, now)
        }
    }
}

/// Content language tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

/// Whether a read should count as a reader view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadContext {
    /// Editorial preview by an authenticated user; never counted.
    pub is_preview: bool,
}

impl ReadContext {
    pub fn reader() -> Self {
        Self { is_preview: false }
    }

    pub fn preview() -> Self {
        Self { is_preview: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(offset_minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-02-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(offset_minutes)
    }

    #[test]
    fn test_draft_to_published_sets_timestamp() {
        let state = PublishState::default().transition(StatusChange::Publish, at(0));
        assert_eq!(state, PublishState::Published { at: at(0) });
        assert!(state.is_published());
    }

    #[test]
    fn test_republish_keeps_original_timestamp() {
        let published = PublishState::default().transition(StatusChange::Publish, at(0));
        let draft = published.toggled(at(5));
        assert_eq!(draft.status(), ContentStatus::Draft);
        assert_eq!(draft.published_at(), Some(at(0)));

        let again = draft.toggled(at(10));
        assert_eq!(again, PublishState::Published { at: at(0) });
    }

    #[test]
    fn test_publish_is_idempotent() {
        let published = PublishState::Published { at: at(0) };
        assert_eq!(published.transition(StatusChange::Publish, at(30)), published);
    }

    #[test]
    fn test_schedule_in_future() {
        let state = PublishState::default().transition(StatusChange::Schedule(at(60)), at(0));
        assert_eq!(state, PublishState::Scheduled { at: at(60) });
        assert!(!state.is_published());
        assert_eq!(state.scheduled_at(), Some(at(60)));
    }

    #[test]
    fn test_schedule_in_past_publishes_now() {
        let state = PublishState::default().transition(StatusChange::Schedule(at(-10)), at(0));
        assert_eq!(state, PublishState::Published { at: at(0) });
    }

    #[test]
    fn test_toggle_scheduled_publishes() {
        let state = PublishState::Scheduled { at: at(60) }.toggled(at(0));
        assert_eq!(state, PublishState::Published { at: at(0) });
    }

    #[test]
    fn test_columns_roundtrip() {
        for state in [
            PublishState::default(),
            PublishState::Draft {
                last_published_at: Some(at(0)),
            },
            PublishState::Scheduled { at: at(5) },
            PublishState::Published { at: at(1) },
        ] {
            let rebuilt = PublishState::from_columns(
                state.status().as_str(),
                state.published_at(),
                state.scheduled_at(),
            );
            assert_eq!(rebuilt, state);
        }
    }

    #[test]
    fn test_status_change_from_request() {
        assert_eq!(StatusChange::from_request(None, None), Ok(None));
        assert_eq!(
            StatusChange::from_request(Some("published"), None),
            Ok(Some(StatusChange::Publish))
        );
        assert_eq!(
            StatusChange::from_request(None, Some(at(5))),
            Ok(Some(StatusChange::Schedule(at(5))))
        );
        assert!(StatusChange::from_request(Some("SCHEDULED"), None).is_err());
        assert!(StatusChange::from_request(Some("ARCHIVED"), None).is_err());
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("HI".parse::<Language>(), Ok(Language::Hi));
        assert_eq!("en".parse::<Language>(), Ok(Language::En));
        assert!("fr".parse::<Language>().is_err());
    }
}
