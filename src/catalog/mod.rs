//! Local catalog: stored item types, the storage seam and the API mapper.

mod error;
mod item;
mod mapper;
mod store;

pub use error::{DbErrorKind, StoreError};
pub use item::{CatalogField, CatalogItem, Chapter, ContentRating, PublicationStatus};
pub use mapper::{
    CatalogMapper, RefreshPolicy, UNKNOWN_CREATOR, UpsertOutcome, build_chapter, build_item,
};
pub use store::{CatalogStore, SqliteCatalogStore};
