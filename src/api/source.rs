//! Abstraction over where catalog data comes from.

use async_trait::async_trait;

use super::error::ApiError;
use super::types::{CatalogOrder, ChapterData, Collection, MangaData, PageQuality};

/// Read-only view of the remote catalog used by the sync loader.
///
/// Implemented by [`MangaDexClient`](super::MangaDexClient); tests substitute
/// in-memory fakes.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetches one page of titles in `order`, starting at `offset`.
    async fn fetch_page(
        &self,
        order: CatalogOrder,
        offset: u32,
        limit: u32,
    ) -> Result<Collection<MangaData>, ApiError>;

    /// Fetches a single title by its remote id.
    async fn fetch_item(&self, external_id: &str) -> Result<MangaData, ApiError>;

    /// Fetches the full English chapter feed of a title, in chapter order.
    async fn fetch_chapters(&self, external_id: &str) -> Result<Vec<ChapterData>, ApiError>;

    /// Resolves the ordered page image URLs of a chapter.
    async fn fetch_pages(
        &self,
        chapter_id: &str,
        quality: PageQuality,
    ) -> Result<Vec<String>, ApiError>;
}
