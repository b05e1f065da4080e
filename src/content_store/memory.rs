//! In-memory content store implementation.

use super::ContentStore;
use crate::catalog::{Item, ItemId, Section, SectionKind};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory content store, useful for testing and small catalogs.
#[derive(Default)]
pub struct MemoryContentStore {
    items: RwLock<HashMap<ItemId, Item>>,
    sections: RwLock<BTreeMap<(ItemId, SectionKind), String>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of sections.
    pub fn with_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        let store = Self::new();
        {
            let mut items = store.items.write().unwrap();
            let mut stored = store.sections.write().unwrap();
            for section in sections {
                items.insert(section.item_id, section.item());
                stored.insert((section.item_id, section.kind), section.content);
            }
        }
        store
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put_section(&self, section: &Section) -> Result<()> {
        self.items
            .write()
            .unwrap()
            .insert(section.item_id, section.item());
        self.sections
            .write()
            .unwrap()
            .insert((section.item_id, section.kind), section.content.clone());
        Ok(())
    }

    async fn get_section(&self, item_id: ItemId, kind: SectionKind) -> Result<Option<Section>> {
        let items = self.items.read().unwrap();
        let sections = self.sections.read().unwrap();

        Ok(sections.get(&(item_id, kind)).and_then(|content| {
            items
                .get(&item_id)
                .map(|item| Section::new(item_id, kind, content.clone(), item.title.clone(), item.year))
        }))
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.items.read().unwrap().get(&item_id).cloned())
    }

    async fn sections_for_item(&self, item_id: ItemId) -> Result<Vec<Section>> {
        let items = self.items.read().unwrap();
        let Some(item) = items.get(&item_id) else {
            return Ok(Vec::new());
        };

        let sections = self.sections.read().unwrap();
        Ok(sections
            .range((item_id, SectionKind::ALL[0])..=(item_id, SectionKind::ALL[7]))
            .map(|((_, kind), content)| {
                Section::new(item_id, *kind, content.clone(), item.title.clone(), item.year)
            })
            .collect())
    }

    async fn get_items_by_ids(&self, item_ids: &[ItemId]) -> Result<HashMap<ItemId, String>> {
        let items = self.items.read().unwrap();
        Ok(item_ids
            .iter()
            .filter_map(|id| items.get(id).map(|item| (*id, item.title.clone())))
            .collect())
    }

    async fn find_items_by_titles(&self, titles: &[String]) -> Result<HashMap<String, ItemId>> {
        let items = self.items.read().unwrap();
        let mut found = HashMap::new();

        for title in titles {
            let wanted = title.to_lowercase();
            // Lowest id wins when titles collide
            let hit = items
                .values()
                .filter(|item| item.title.to_lowercase() == wanted)
                .map(|item| item.id)
                .min();
            if let Some(id) = hit {
                found.insert(title.clone(), id);
            }
        }

        Ok(found)
    }

    async fn count_sections(&self) -> Result<usize> {
        Ok(self.sections.read().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryContentStore {
        MemoryContentStore::with_sections(vec![
            Section::new(27205, SectionKind::Themes, "Dreams and grief.", "Inception", Some(2010)),
            Section::new(27205, SectionKind::PlotStructure, "A heist in layers.", "Inception", Some(2010)),
            Section::new(157336, SectionKind::Themes, "", "Interstellar", Some(2014)),
        ])
    }

    #[tokio::test]
    async fn test_not_found_differs_from_empty() {
        let store = sample();

        let empty = store
            .get_section(157336, SectionKind::Themes)
            .await
            .unwrap()
            .expect("section exists");
        assert!(empty.is_empty());
        assert_eq!(empty.item_title, "Interstellar");

        assert!(store
            .get_section(157336, SectionKind::Legacy)
            .await
            .unwrap()
            .is_none());
        assert!(store.get_section(1, SectionKind::Themes).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_titles_and_ids() {
        let store = sample();

        let titles = store.get_items_by_ids(&[27205, 999]).await.unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[&27205], "Inception");

        let ids = store
            .find_items_by_titles(&["inception".to_string(), "Memento".to_string()])
            .await
            .unwrap();
        assert_eq!(ids.get("inception"), Some(&27205));
        assert!(!ids.contains_key("Memento"));
    }

    #[tokio::test]
    async fn test_sections_for_item_in_kind_order() {
        let store = sample();
        let kinds: Vec<SectionKind> = store
            .sections_for_item(27205)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(kinds, vec![SectionKind::PlotStructure, SectionKind::Themes]);
        assert_eq!(store.count_sections().await.unwrap(), 3);
    }
}
