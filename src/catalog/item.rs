//! Catalog item and chapter types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::LocaleMap;

/// Publication status of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    /// Still publishing.
    Ongoing,
    /// Finished.
    Completed,
    /// Paused.
    Hiatus,
    /// Discontinued.
    Cancelled,
}

impl PublicationStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Hiatus => "hiatus",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "hiatus" => Ok(Self::Hiatus),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid publication status: {s}")),
        }
    }
}

/// Content rating of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRating {
    Safe,
    Suggestive,
    Erotica,
    Pornographic,
}

impl ContentRating {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Suggestive => "suggestive",
            Self::Erotica => "erotica",
            Self::Pornographic => "pornographic",
        }
    }
}

impl fmt::Display for ContentRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Self::Safe),
            "suggestive" => Ok(Self::Suggestive),
            "erotica" => Ok(Self::Erotica),
            "pornographic" => Ok(Self::Pornographic),
            _ => Err(format!("invalid content rating: {s}")),
        }
    }
}

/// A title stored locally, identified by its MangaDex id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// MangaDex id; unique in storage.
    pub external_id: String,
    pub title: LocaleMap,
    pub alt_titles: Vec<LocaleMap>,
    pub description: LocaleMap,
    pub status: Option<PublicationStatus>,
    pub content_rating: Option<ContentRating>,
    /// English names of genre tags.
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub artists: Vec<String>,
    pub cover_url: String,
    pub cover_file_name: Option<String>,
    pub remote_created_at: Option<DateTime<Utc>>,
    pub remote_updated_at: Option<DateTime<Utc>>,
    /// Chapters in feed order.
    pub chapters: Vec<Chapter>,
}

impl CatalogItem {
    /// English title, else the first title in locale order.
    #[must_use]
    pub fn primary_title(&self) -> Option<&str> {
        primary_text(&self.title)
    }

    /// English description, else the first description in locale order.
    #[must_use]
    pub fn primary_description(&self) -> Option<&str> {
        primary_text(&self.description)
    }

    /// Looks up a chapter by its MangaDex id.
    #[must_use]
    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.external_id == chapter_id)
    }

    /// Metadata fields whose values differ between `self` and `other`.
    ///
    /// Chapters are not compared; they are merged separately.
    #[must_use]
    pub fn diff_fields(&self, other: &CatalogItem) -> Vec<CatalogField> {
        CatalogField::ALL
            .into_iter()
            .filter(|field| !self.field_eq(other, *field))
            .collect()
    }

    fn field_eq(&self, other: &CatalogItem, field: CatalogField) -> bool {
        match field {
            CatalogField::Title => self.title == other.title,
            CatalogField::AltTitles => self.alt_titles == other.alt_titles,
            CatalogField::Description => self.description == other.description,
            CatalogField::Status => self.status == other.status,
            CatalogField::ContentRating => self.content_rating == other.content_rating,
            CatalogField::Tags => self.tags == other.tags,
            CatalogField::Authors => self.authors == other.authors,
            CatalogField::Artists => self.artists == other.artists,
            CatalogField::CoverUrl => self.cover_url == other.cover_url,
            CatalogField::CoverFileName => self.cover_file_name == other.cover_file_name,
            CatalogField::RemoteCreatedAt => self.remote_created_at == other.remote_created_at,
            CatalogField::RemoteUpdatedAt => self.remote_updated_at == other.remote_updated_at,
        }
    }
}

fn primary_text(map: &LocaleMap) -> Option<&str> {
    map.get("en")
        .or_else(|| map.values().next())
        .map(String::as_str)
}

/// A chapter of a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// MangaDex chapter id; unique within the parent item.
    pub external_id: String,
    /// Chapter number label, e.g. "12.5".
    pub number: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Page image URLs in reading order; empty until loaded.
    pub pages: Vec<String>,
    /// True once a non-empty page list has been stored.
    pub pages_loaded: bool,
}

/// Metadata columns of a catalog item that can be updated individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogField {
    Title,
    AltTitles,
    Description,
    Status,
    ContentRating,
    Tags,
    Authors,
    Artists,
    CoverUrl,
    CoverFileName,
    RemoteCreatedAt,
    RemoteUpdatedAt,
}

impl CatalogField {
    /// Every field, in column order.
    pub const ALL: [CatalogField; 12] = [
        Self::Title,
        Self::AltTitles,
        Self::Description,
        Self::Status,
        Self::ContentRating,
        Self::Tags,
        Self::Authors,
        Self::Artists,
        Self::CoverUrl,
        Self::CoverFileName,
        Self::RemoteCreatedAt,
        Self::RemoteUpdatedAt,
    ];

    /// Column name in `catalog_items`.
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::AltTitles => "alt_titles",
            Self::Description => "description",
            Self::Status => "status",
            Self::ContentRating => "content_rating",
            Self::Tags => "tags",
            Self::Authors => "authors",
            Self::Artists => "artists",
            Self::CoverUrl => "cover_url",
            Self::CoverFileName => "cover_file_name",
            Self::RemoteCreatedAt => "remote_created_at",
            Self::RemoteUpdatedAt => "remote_updated_at",
        }
    }
}

impl fmt::Display for CatalogField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}
