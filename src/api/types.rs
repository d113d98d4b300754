//! Wire types for the MangaDex REST API.
//!
//! Only the fields the sync pipeline reads are modelled; unknown fields are
//! ignored and most fields default when absent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Locale code to localized text, e.g. `{"en": "Berserk", "ja": "ベルセルク"}`.
pub type LocaleMap = BTreeMap<String, String>;

/// Paged list envelope (`/manga`, `/manga/{id}/feed`).
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    /// Entities on this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Page size the server applied.
    #[serde(default)]
    pub limit: u32,
    /// Offset of this page.
    #[serde(default)]
    pub offset: u32,
    /// Total number of entities, when reported.
    #[serde(default)]
    pub total: Option<u32>,
}

/// Single-entity envelope (`/manga/{id}`).
#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    /// The entity.
    pub data: T,
}

/// A manga entity with its expanded relationships.
#[derive(Debug, Clone, Deserialize)]
pub struct MangaData {
    /// Remote identifier (UUID).
    pub id: String,
    /// Descriptive attributes.
    #[serde(default)]
    pub attributes: MangaAttributes,
    /// Authors, artists, cover art and other linked entities.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl MangaData {
    /// Iterates relationships of one `type`.
    pub fn relationships_of<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships.iter().filter(move |rel| rel.kind == kind)
    }
}

/// Manga attributes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MangaAttributes {
    #[serde(deserialize_with = "locale_map")]
    pub title: LocaleMap,
    #[serde(deserialize_with = "locale_maps")]
    pub alt_titles: Vec<LocaleMap>,
    #[serde(deserialize_with = "locale_map")]
    pub description: LocaleMap,
    pub status: Option<String>,
    pub content_rating: Option<String>,
    pub tags: Vec<Tag>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A link from one entity to another.
#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    pub id: String,
    /// Relationship type: `author`, `artist`, `cover_art`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Present only when the request asked to include this type.
    #[serde(default)]
    pub attributes: Option<RelationshipAttributes>,
}

/// Attributes of an included relationship.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationshipAttributes {
    /// Author/artist display name.
    pub name: Option<String>,
    /// Cover image file name.
    pub file_name: Option<String>,
}

/// A manga tag.
#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default)]
    pub attributes: TagAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagAttributes {
    #[serde(deserialize_with = "locale_map")]
    pub name: LocaleMap,
    /// `genre`, `theme`, `format` or `content`.
    pub group: String,
}

/// A chapter entry from a manga feed.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterData {
    /// Remote identifier (UUID).
    pub id: String,
    #[serde(default)]
    pub attributes: ChapterAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterAttributes {
    /// Chapter number label ("12", "12.5"); absent for oneshots.
    pub chapter: Option<String>,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub publish_at: Option<DateTime<Utc>>,
}

/// Response of `/at-home/server/{chapter}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeResponse {
    /// Image server for this chapter.
    pub base_url: String,
    pub chapter: AtHomeChapter,
}

/// Page file names of one chapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtHomeChapter {
    pub hash: String,
    #[serde(default)]
    pub data: Vec<String>,
    #[serde(default)]
    pub data_saver: Vec<String>,
}

impl AtHomeResponse {
    /// Builds the ordered page image URLs for the given quality.
    ///
    /// ```
    /// use manga_sync_core::api::{AtHomeChapter, AtHomeResponse, PageQuality};
    ///
    /// let manifest = AtHomeResponse {
    ///     base_url: "https://node.example.org".to_string(),
    ///     chapter: AtHomeChapter {
    ///         hash: "abc".to_string(),
    ///         data: vec!["1.png".to_string()],
    ///         data_saver: vec!["1.jpg".to_string()],
    ///     },
    /// };
    /// assert_eq!(
    ///     manifest.page_urls(PageQuality::DataSaver),
    ///     vec!["https://node.example.org/data-saver/abc/1.jpg"]
    /// );
    /// ```
    #[must_use]
    pub fn page_urls(&self, quality: PageQuality) -> Vec<String> {
        let base = self.base_url.trim_end_matches('/');
        let files = match quality {
            PageQuality::Data => &self.chapter.data,
            PageQuality::DataSaver => &self.chapter.data_saver,
        };
        files
            .iter()
            .map(|file| {
                format!(
                    "{base}/{}/{}/{file}",
                    quality.path_segment(),
                    self.chapter.hash
                )
            })
            .collect()
    }
}

/// Image quality served by the page server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageQuality {
    /// Original-quality images.
    Data,
    /// Compressed images.
    #[default]
    DataSaver,
}

impl PageQuality {
    /// URL path segment for this quality.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::DataSaver => "data-saver",
        }
    }
}

impl fmt::Display for PageQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for PageQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "data-saver" => Ok(Self::DataSaver),
            other => Err(format!(
                "unknown page quality '{other}' (expected 'data' or 'data-saver')"
            )),
        }
    }
}

/// Sort order of a catalog listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogOrder {
    /// Most followed titles first.
    #[default]
    Popular,
    /// Most recently updated titles first.
    RecentlyUpdated,
}

impl CatalogOrder {
    /// The `order[...]` query parameter selecting this order.
    #[must_use]
    pub fn query_pair(self) -> (&'static str, &'static str) {
        match self {
            Self::Popular => ("order[followedCount]", "desc"),
            Self::RecentlyUpdated => ("order[updatedAt]", "desc"),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::RecentlyUpdated => "recently-updated",
        }
    }
}

impl fmt::Display for CatalogOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// MangaDex sends `[]` instead of `{}` for empty locale maps, and `null` for
// missing ones.
#[derive(Deserialize)]
#[serde(untagged)]
enum LocaleMapRepr {
    Map(LocaleMap),
    List(Vec<LocaleMap>),
}

fn locale_map<'de, D>(deserializer: D) -> Result<LocaleMap, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<LocaleMapRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(LocaleMapRepr::Map(map)) => map,
        Some(LocaleMapRepr::List(list)) => list.into_iter().flatten().collect(),
        None => LocaleMap::new(),
    })
}

fn locale_maps<'de, D>(deserializer: D) -> Result<Vec<LocaleMap>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LocaleMap>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_manga_data_deserializes_full_entity() {
        let value = json!({
            "id": "a1",
            "type": "manga",
            "attributes": {
                "title": {"en": "Blue Box"},
                "altTitles": [{"ja": "アオのハコ"}],
                "description": {"en": "Sports romance", "fr": "Romance"},
                "status": "ongoing",
                "contentRating": "safe",
                "tags": [
                    {"id": "t1", "type": "tag", "attributes": {"name": {"en": "Romance"}, "group": "genre"}},
                    {"id": "t2", "type": "tag", "attributes": {"name": {"en": "School Life"}, "group": "theme"}}
                ],
                "createdAt": "2021-04-19T21:36:49+00:00",
                "updatedAt": "2024-01-02T03:04:05+00:00",
                "year": 2021
            },
            "relationships": [
                {"id": "p1", "type": "author", "attributes": {"name": "Kouji Miura"}},
                {"id": "c1", "type": "cover_art", "attributes": {"fileName": "cover.jpg"}},
                {"id": "x1", "type": "creator"}
            ]
        });

        let manga: MangaData = serde_json::from_value(value).unwrap();
        assert_eq!(manga.attributes.title.get("en").unwrap(), "Blue Box");
        assert_eq!(manga.attributes.alt_titles.len(), 1);
        assert_eq!(manga.attributes.tags.len(), 2);
        assert_eq!(manga.attributes.tags[0].attributes.group, "genre");
        assert_eq!(
            manga.attributes.created_at.unwrap().to_rfc3339(),
            "2021-04-19T21:36:49+00:00"
        );

        let cover = manga.relationships_of("cover_art").next().unwrap();
        assert_eq!(
            cover.attributes.as_ref().unwrap().file_name.as_deref(),
            Some("cover.jpg")
        );
        assert!(manga.relationships_of("creator").next().unwrap().attributes.is_none());
    }

    #[test]
    fn test_empty_locale_map_sent_as_array() {
        let value = json!({
            "id": "a2",
            "attributes": {"title": {"ja-ro": "Ao no Hako"}, "description": [], "altTitles": null}
        });

        let manga: MangaData = serde_json::from_value(value).unwrap();
        assert!(manga.attributes.description.is_empty());
        assert!(manga.attributes.alt_titles.is_empty());
        assert!(manga.relationships.is_empty());
    }

    #[test]
    fn test_chapter_collection_with_null_labels() {
        let value = json!({
            "result": "ok",
            "data": [
                {"id": "ch1", "attributes": {"chapter": null, "volume": null, "title": "Oneshot", "publishAt": "2023-05-01T00:00:00+00:00"}}
            ],
            "limit": 100,
            "offset": 0,
            "total": 1
        });

        let feed: Collection<ChapterData> = serde_json::from_value(value).unwrap();
        assert_eq!(feed.total, Some(1));
        assert_eq!(feed.data[0].attributes.chapter, None);
        assert_eq!(feed.data[0].attributes.title.as_deref(), Some("Oneshot"));
    }

    #[test]
    fn test_page_urls_for_original_quality() {
        let manifest: AtHomeResponse = serde_json::from_value(json!({
            "result": "ok",
            "baseUrl": "https://node.example.org/",
            "chapter": {"hash": "h1", "data": ["1.png", "2.png"], "dataSaver": ["1.jpg", "2.jpg"]}
        }))
        .unwrap();

        assert_eq!(
            manifest.page_urls(PageQuality::Data),
            vec![
                "https://node.example.org/data/h1/1.png",
                "https://node.example.org/data/h1/2.png"
            ]
        );
    }

    #[test]
    fn test_page_quality_from_str() {
        assert_eq!("data".parse::<PageQuality>().unwrap(), PageQuality::Data);
        assert_eq!(
            "data-saver".parse::<PageQuality>().unwrap(),
            PageQuality::DataSaver
        );
        assert!("hd".parse::<PageQuality>().is_err());
    }
}
