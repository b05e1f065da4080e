//! Content store abstraction for Marquee.
//!
//! Holds the section text the vector store only references by key. Lookups
//! distinguish "not found" (`None`) from "found but empty" (a [`Section`]
//! whose content is blank).

mod memory;
mod sqlite;

pub use memory::MemoryContentStore;
pub use sqlite::SqliteContentStore;

use crate::catalog::{Item, ItemId, Section, SectionKind};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Trait for content store implementations.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace a section, creating or refreshing its item.
    async fn put_section(&self, section: &Section) -> Result<()>;

    /// Fetch one section.
    async fn get_section(&self, item_id: ItemId, kind: SectionKind) -> Result<Option<Section>>;

    /// Fetch an item by id.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// All sections of an item, in catalog kind order.
    async fn sections_for_item(&self, item_id: ItemId) -> Result<Vec<Section>>;

    /// Titles for the given ids. Unknown ids are absent from the map.
    async fn get_items_by_ids(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>>;

    /// Resolve titles to item ids, ignoring case. The map is keyed by the
    /// title as given; unknown titles are absent.
    async fn find_items_by_titles(&self, titles: &[String]) -> Result<HashMap<String, ItemId>>;

    /// Total number of stored sections.
    async fn count_sections(&self) -> Result<usize>;
}
