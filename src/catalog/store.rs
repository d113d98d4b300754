//! Storage seam for catalog items and its `SQLite` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, instrument};

use super::error::StoreError;
use super::item::{CatalogField, CatalogItem, Chapter};
use crate::db::Database;

/// Data-access contract for catalog persistence.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads an item with its chapters in feed order.
    async fn find_item(&self, external_id: &str) -> Result<Option<CatalogItem>, StoreError>;

    /// Inserts a new item together with its chapters.
    async fn insert_item(&self, item: &CatalogItem) -> Result<(), StoreError>;

    /// Overwrites the listed metadata columns with the values in `item`.
    async fn update_item_fields(
        &self,
        item: &CatalogItem,
        fields: &[CatalogField],
    ) -> Result<(), StoreError>;

    /// Appends chapters after the item's existing ones.
    async fn append_chapters(&self, item_id: &str, chapters: &[Chapter]) -> Result<(), StoreError>;

    /// Replaces one chapter's page list.
    ///
    /// A non-empty list also marks the chapter loaded. An empty list leaves
    /// the row untouched.
    async fn set_chapter_pages(
        &self,
        item_id: &str,
        chapter_id: &str,
        pages: &[String],
    ) -> Result<(), StoreError>;

    /// Number of stored items.
    async fn count_items(&self) -> Result<u64, StoreError>;

    /// Drops the current connection and opens a new one.
    async fn reconnect(&self) -> Result<(), StoreError>;
}

/// [`CatalogStore`] backed by the `catalog_items` and `chapters` tables.
#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    db: Arc<Database>,
}

impl SqliteCatalogStore {
    /// Creates a store over a shared connection manager.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The underlying connection manager.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    #[instrument(skip(self))]
    async fn find_item(&self, external_id: &str) -> Result<Option<CatalogItem>, StoreError> {
        let pool = self.db.pool().await?;

        let row = sqlx::query_as::<_, ItemRow>(
            r"SELECT external_id, title, alt_titles, description, status, content_rating,
                     tags, authors, artists, cover_url, cover_file_name,
                     remote_created_at, remote_updated_at
              FROM catalog_items
              WHERE external_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let chapters = sqlx::query_as::<_, ChapterRow>(
            r"SELECT external_id, number, volume, title, published_at, pages, pages_loaded
              FROM chapters
              WHERE item_id = ?
              ORDER BY position ASC",
        )
        .bind(external_id)
        .fetch_all(&pool)
        .await?;

        let chapters = chapters
            .into_iter()
            .map(ChapterRow::into_chapter)
            .collect::<Result<Vec<_>, _>>()?;

        row.into_item(chapters).map(Some)
    }

    #[instrument(skip(self, item), fields(external_id = %item.external_id, chapters = item.chapters.len()))]
    async fn insert_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;

        let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO catalog_items (external_id");
        for field in CatalogField::ALL {
            builder.push(", ").push(field.column());
        }
        builder.push(") VALUES (").push_bind(item.external_id.clone());
        for field in CatalogField::ALL {
            builder.push(", ").push_bind(column_value(item, field)?);
        }
        builder.push(")");
        builder.build().execute(&mut *tx).await?;

        insert_chapters(&mut tx, &item.external_id, 0, &item.chapters).await?;
        tx.commit().await?;

        debug!("catalog item inserted");
        Ok(())
    }

    #[instrument(skip(self, item), fields(external_id = %item.external_id, fields = fields.len()))]
    async fn update_item_fields(
        &self,
        item: &CatalogItem,
        fields: &[CatalogField],
    ) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let pool = self.db.pool().await?;

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE catalog_items SET ");
        let mut assignments = builder.separated(", ");
        for field in fields {
            assignments.push(format!("{} = ", field.column()));
            assignments.push_bind_unseparated(column_value(item, *field)?);
        }
        assignments.push("updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')");
        builder
            .push(" WHERE external_id = ")
            .push_bind(item.external_id.clone());

        let result = builder.build().execute(&pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ItemNotFound(item.external_id.clone()));
        }
        Ok(())
    }

    #[instrument(skip(self, chapters), fields(count = chapters.len()))]
    async fn append_chapters(&self, item_id: &str, chapters: &[Chapter]) -> Result<(), StoreError> {
        if chapters.is_empty() {
            return Ok(());
        }
        let pool = self.db.pool().await?;
        let mut tx = pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM catalog_items WHERE external_id = ?")
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::ItemNotFound(item_id.to_string()));
        }

        let (next_position,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM chapters WHERE item_id = ?",
        )
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_chapters(&mut tx, item_id, next_position, chapters).await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    async fn set_chapter_pages(
        &self,
        item_id: &str,
        chapter_id: &str,
        pages: &[String],
    ) -> Result<(), StoreError> {
        let pool = self.db.pool().await?;

        let found = if pages.is_empty() {
            sqlx::query("SELECT 1 FROM chapters WHERE item_id = ? AND external_id = ?")
                .bind(item_id)
                .bind(chapter_id)
                .fetch_optional(&pool)
                .await?
                .is_some()
        } else {
            sqlx::query(
                r"UPDATE chapters
                  SET pages = ?, pages_loaded = 1
                  WHERE item_id = ? AND external_id = ?",
            )
            .bind(to_json("pages", pages)?)
            .bind(item_id)
            .bind(chapter_id)
            .execute(&pool)
            .await?
            .rows_affected()
                > 0
        };

        if !found {
            return Err(StoreError::ChapterNotFound {
                item_id: item_id.to_string(),
                chapter_id: chapter_id.to_string(),
            });
        }
        Ok(())
    }

    async fn count_items(&self) -> Result<u64, StoreError> {
        let pool = self.db.pool().await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        self.db.reconnect().await.map_err(StoreError::from)
    }
}

async fn insert_chapters(
    conn: &mut SqliteConnection,
    item_id: &str,
    first_position: i64,
    chapters: &[Chapter],
) -> Result<(), StoreError> {
    for (position, chapter) in (first_position..).zip(chapters) {
        sqlx::query(
            r"INSERT INTO chapters
                (item_id, external_id, position, number, volume, title, published_at, pages, pages_loaded)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item_id)
        .bind(&chapter.external_id)
        .bind(position)
        .bind(&chapter.number)
        .bind(&chapter.volume)
        .bind(&chapter.title)
        .bind(chapter.published_at.map(|t| t.to_rfc3339()))
        .bind(to_json("pages", &chapter.pages)?)
        .bind(chapter.pages_loaded)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn column_value(item: &CatalogItem, field: CatalogField) -> Result<Option<String>, StoreError> {
    let column = field.column();
    Ok(match field {
        CatalogField::Title => Some(to_json(column, &item.title)?),
        CatalogField::AltTitles => Some(to_json(column, &item.alt_titles)?),
        CatalogField::Description => Some(to_json(column, &item.description)?),
        CatalogField::Status => item.status.map(|s| s.as_str().to_string()),
        CatalogField::ContentRating => item.content_rating.map(|r| r.as_str().to_string()),
        CatalogField::Tags => Some(to_json(column, &item.tags)?),
        CatalogField::Authors => Some(to_json(column, &item.authors)?),
        CatalogField::Artists => Some(to_json(column, &item.artists)?),
        CatalogField::CoverUrl => Some(item.cover_url.clone()),
        CatalogField::CoverFileName => item.cover_file_name.clone(),
        CatalogField::RemoteCreatedAt => item.remote_created_at.map(|t| t.to_rfc3339()),
        CatalogField::RemoteUpdatedAt => item.remote_updated_at.map(|t| t.to_rfc3339()),
    })
}

fn to_json<T: Serialize + ?Sized>(field: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::serialization(field, e))
}

fn from_json<T: DeserializeOwned>(field: &'static str, text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::serialization(field, e))
}

fn parse_timestamp(
    field: &'static str,
    text: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::serialization(field, e))
    })
    .transpose()
}

#[derive(Debug, FromRow)]
struct ItemRow {
    external_id: String,
    title: String,
    alt_titles: String,
    description: String,
    status: Option<String>,
    content_rating: Option<String>,
    tags: String,
    authors: String,
    artists: String,
    cover_url: String,
    cover_file_name: Option<String>,
    remote_created_at: Option<String>,
    remote_updated_at: Option<String>,
}

impl ItemRow {
    fn into_item(self, chapters: Vec<Chapter>) -> Result<CatalogItem, StoreError> {
        Ok(CatalogItem {
            external_id: self.external_id,
            title: from_json("title", &self.title)?,
            alt_titles: from_json("alt_titles", &self.alt_titles)?,
            description: from_json("description", &self.description)?,
            status: self
                .status
                .map(|s| s.parse().map_err(|e: String| StoreError::serialization("status", e)))
                .transpose()?,
            content_rating: self
                .content_rating
                .map(|s| {
                    s.parse()
                        .map_err(|e: String| StoreError::serialization("content_rating", e))
                })
                .transpose()?,
            tags: from_json("tags", &self.tags)?,
            authors: from_json("authors", &self.authors)?,
            artists: from_json("artists", &self.artists)?,
            cover_url: self.cover_url,
            cover_file_name: self.cover_file_name,
            remote_created_at: parse_timestamp("remote_created_at", self.remote_created_at)?,
            remote_updated_at: parse_timestamp("remote_updated_at", self.remote_updated_at)?,
            chapters,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChapterRow {
    external_id: String,
    number: Option<String>,
    volume: Option<String>,
    title: Option<String>,
    published_at: Option<String>,
    pages: String,
    pages_loaded: bool,
}

impl ChapterRow {
    fn into_chapter(self) -> Result<Chapter, StoreError> {
        Ok(Chapter {
            external_id: self.external_id,
            number: self.number,
            volume: self.volume,
            title: self.title,
            published_at: parse_timestamp("published_at", self.published_at)?,
            pages: from_json("pages", &self.pages)?,
            pages_loaded: self.pages_loaded,
        })
    }
}
