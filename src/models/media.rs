//! Media library model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default media category
pub const GALLERY_CATEGORY: &str = "GALLERY";
/// Reserved category hidden from unfiltered listings
pub const SYSTEM_CATEGORY: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "IMAGE",
            MediaType::Video => "VIDEO",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IMAGE" => Ok(MediaType::Image),
            "VIDEO" => Ok(MediaType::Video),
            other => Err(format!("Invalid media type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: i64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub category: String,
    pub size: Option<String>,
    pub duration: Option<String>,
    pub is_published: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub media_type: MediaType,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub thumbnail: Option<String>,
    pub category: String,
    pub size: Option<String>,
    pub duration: Option<String>,
    pub is_published: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MediaChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub is_published: Option<bool>,
}

impl Media {
    pub fn apply(&mut self, changes: MediaChanges) {
        if let Some(v) = changes.title {
            self.title = v;
        }
        if let Some(v) = changes.description {
            self.description = v;
        }
        if let Some(v) = changes.category {
            self.category = v;
        }
        if let Some(v) = changes.is_published {
            self.is_published = v;
        }
        self.updated_at = Utc::now();
    }
}

/// Listing filter. `published_only` separates the public and admin listings.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub media_type: Option<MediaType>,
    pub category: Option<String>,
    pub published_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse() {
        assert_eq!("image".parse::<MediaType>(), Ok(MediaType::Image));
        assert_eq!("VIDEO".parse::<MediaType>(), Ok(MediaType::Video));
        assert!("audio".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_media_serializes_type_field() {
        let now = Utc::now();
        let media = Media {
            id: 7,
            media_type: MediaType::Video,
            title: "Flood coverage".into(),
            description: None,
            url: "https://pub-news.r2.dev/gallery-1.mp4".into(),
            thumbnail: None,
            category: GALLERY_CATEGORY.into(),
            size: Some("2048 KB".into()),
            duration: None,
            is_published: true,
            views: 0,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["type"], "VIDEO");
        assert_eq!(json["isPublished"], true);
    }
}
