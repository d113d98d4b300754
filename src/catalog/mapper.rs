//! Maps MangaDex entities onto stored catalog items.
//!
//! [`CatalogMapper::upsert_catalog_item`] creates an item on first sight and
//! afterwards writes only the metadata fields that changed, appending newly
//! published chapters without touching pages already stored.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::error::StoreError;
use super::item::{CatalogField, CatalogItem, Chapter, ContentRating, PublicationStatus};
use super::store::CatalogStore;
use crate::api::{COVER_BASE_URL, ChapterData, MangaData, PLACEHOLDER_COVER_URL};

/// Name used when an included author/artist has no name attribute.
pub const UNKNOWN_CREATOR: &str = "Unknown";

/// Which chapters get their pages fetched during a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Every chapter whose pages are not loaded yet, new or old.
    #[default]
    MissingOrUnloaded,
    /// Only chapters first seen in this sync.
    MissingOnly,
}

impl RefreshPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOrUnloaded => "missing-or-unloaded",
            Self::MissingOnly => "missing-only",
        }
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing-or-unloaded" => Ok(Self::MissingOrUnloaded),
            "missing-only" => Ok(Self::MissingOnly),
            _ => Err(format!(
                "invalid refresh policy '{s}' (expected 'missing-or-unloaded' or 'missing-only')"
            )),
        }
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The item as stored after the upsert, chapters included.
    pub item: CatalogItem,
    /// True when the item did not exist before.
    pub created: bool,
    /// Metadata fields written; every field for a new item.
    pub changed_fields: Vec<CatalogField>,
    /// Ids of chapters first stored by this upsert, in feed order.
    pub appended_chapters: Vec<String>,
}

impl UpsertOutcome {
    /// Chapters whose pages should be fetched under `policy`.
    #[must_use]
    pub fn chapters_needing_pages(&self, policy: RefreshPolicy) -> Vec<&Chapter> {
        let appended: HashSet<&str> = self.appended_chapters.iter().map(String::as_str).collect();
        self.item
            .chapters
            .iter()
            .filter(|chapter| match policy {
                RefreshPolicy::MissingOrUnloaded => !chapter.pages_loaded,
                RefreshPolicy::MissingOnly => {
                    appended.contains(chapter.external_id.as_str()) && !chapter.pages_loaded
                }
            })
            .collect()
    }
}

/// Builds the stored form of a title from its API entity and chapter feed.
#[must_use]
pub fn build_item(manga: &MangaData, chapters: &[ChapterData]) -> CatalogItem {
    let attributes = &manga.attributes;

    let cover_file_name = manga
        .relationships_of("cover_art")
        .find_map(|rel| rel.attributes.as_ref()?.file_name.clone())
        .filter(|name| !name.is_empty());
    let cover_url = cover_file_name.as_ref().map_or_else(
        || PLACEHOLDER_COVER_URL.to_string(),
        |file| format!("{COVER_BASE_URL}/{}/{file}", manga.id),
    );

    let creators = |kind: &str| -> Vec<String> {
        manga
            .relationships_of(kind)
            .map(|rel| {
                rel.attributes
                    .as_ref()
                    .and_then(|a| a.name.clone())
                    .unwrap_or_else(|| UNKNOWN_CREATOR.to_string())
            })
            .collect()
    };

    CatalogItem {
        external_id: manga.id.clone(),
        title: attributes.title.clone(),
        alt_titles: attributes.alt_titles.clone(),
        description: attributes.description.clone(),
        status: attributes.status.as_deref().and_then(|s| s.parse::<PublicationStatus>().ok()),
        content_rating: attributes
            .content_rating
            .as_deref()
            .and_then(|s| s.parse::<ContentRating>().ok()),
        tags: attributes
            .tags
            .iter()
            .filter(|tag| tag.attributes.group == "genre")
            .filter_map(|tag| tag.attributes.name.get("en").cloned())
            .collect(),
        authors: creators("author"),
        artists: creators("artist"),
        cover_url,
        cover_file_name,
        remote_created_at: attributes.created_at,
        remote_updated_at: attributes.updated_at,
        chapters: unique_chapters(chapters).map(build_chapter).collect(),
    }
}

/// Feed entries with repeated chapter ids dropped, first occurrence kept.
///
/// Offset paging can return a chapter twice when the feed shifts mid-walk.
fn unique_chapters(chapters: &[ChapterData]) -> impl Iterator<Item = &ChapterData> {
    let mut seen = HashSet::new();
    chapters
        .iter()
        .filter(move |chapter| seen.insert(chapter.id.as_str()))
}

/// Builds a stored chapter with no pages yet.
#[must_use]
pub fn build_chapter(chapter: &ChapterData) -> Chapter {
    Chapter {
        external_id: chapter.id.clone(),
        number: chapter.attributes.chapter.clone(),
        volume: chapter.attributes.volume.clone(),
        title: chapter.attributes.title.clone(),
        published_at: chapter.attributes.publish_at,
        pages: Vec::new(),
        pages_loaded: false,
    }
}

/// Writes API entities into a [`CatalogStore`].
///
/// Every store call that fails with a lost connection is retried exactly
/// once after [`CatalogStore::reconnect`].
#[derive(Clone)]
pub struct CatalogMapper {
    store: Arc<dyn CatalogStore>,
}

impl fmt::Debug for CatalogMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogMapper").finish_non_exhaustive()
    }
}

impl CatalogMapper {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Creates or updates the item for `manga`.
    ///
    /// Existing items get a field-level merge: only changed metadata columns
    /// are written, chapters not yet stored are appended, and stored
    /// chapters keep their pages.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] of the failing write.
    #[instrument(skip(self, manga, chapters), fields(external_id = %manga.id, chapters = chapters.len()))]
    pub async fn upsert_catalog_item(
        &self,
        manga: &MangaData,
        chapters: &[ChapterData],
    ) -> Result<UpsertOutcome, StoreError> {
        let incoming = build_item(manga, chapters);
        let external_id = incoming.external_id.as_str();

        let existing = self
            .with_reconnect("find_item", || self.store.find_item(external_id))
            .await?;

        let Some(existing) = existing else {
            self.with_reconnect("insert_item", || self.store.insert_item(&incoming))
                .await?;
            info!(
                title = incoming.primary_title().unwrap_or_default(),
                chapters = incoming.chapters.len(),
                "catalog item created"
            );
            let appended_chapters = incoming
                .chapters
                .iter()
                .map(|c| c.external_id.clone())
                .collect();
            return Ok(UpsertOutcome {
                item: incoming,
                created: true,
                changed_fields: CatalogField::ALL.to_vec(),
                appended_chapters,
            });
        };

        let changed_fields = existing.diff_fields(&incoming);
        if !changed_fields.is_empty() {
            self.with_reconnect("update_item_fields", || {
                self.store.update_item_fields(&incoming, &changed_fields)
            })
            .await?;
        }

        let known: HashSet<&str> = existing
            .chapters
            .iter()
            .map(|c| c.external_id.as_str())
            .collect();
        let new_chapters: Vec<Chapter> = incoming
            .chapters
            .iter()
            .filter(|c| !known.contains(c.external_id.as_str()))
            .cloned()
            .collect();
        if !new_chapters.is_empty() {
            self.with_reconnect("append_chapters", || {
                self.store.append_chapters(external_id, &new_chapters)
            })
            .await?;
        }

        if changed_fields.is_empty() && new_chapters.is_empty() {
            debug!("catalog item unchanged");
        } else {
            info!(
                changed = ?changed_fields,
                new_chapters = new_chapters.len(),
                "catalog item updated"
            );
        }

        let appended_chapters = new_chapters.iter().map(|c| c.external_id.clone()).collect();
        let mut item = CatalogItem {
            chapters: existing.chapters,
            ..incoming
        };
        item.chapters.extend(new_chapters);

        Ok(UpsertOutcome {
            item,
            created: false,
            changed_fields,
            appended_chapters,
        })
    }

    /// Stores the page URLs of one chapter.
    ///
    /// # Errors
    ///
    /// An empty `pages` list writes nothing. Otherwise returns
    /// [`StoreError::ChapterNotFound`] for an unknown chapter, or the
    /// underlying database error.
    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    pub async fn save_chapter_pages(
        &self,
        item_id: &str,
        chapter_id: &str,
        pages: &[String],
    ) -> Result<(), StoreError> {
        if pages.is_empty() {
            debug!("empty page list, chapter stays unloaded");
            return Ok(());
        }
        self.with_reconnect("set_chapter_pages", || {
            self.store.set_chapter_pages(item_id, chapter_id, pages)
        })
        .await
    }

    async fn with_reconnect<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op().await {
            Err(error) if error.is_connection_lost() => {
                warn!(operation, error = %error, "storage connection lost, reconnecting");
                self.store.reconnect().await?;
                op().await
            }
            result => result,
        }
    }
}
