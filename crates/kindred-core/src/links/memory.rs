//! In-memory link store.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::LinkStore;
use crate::error::{KindredError, KindredResult};
use crate::types::Link;

/// Adjacency map with every link filed under both of its endpoints.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    links: RwLock<HashMap<String, HashMap<String, Link>>>,
    inference: bool,
}

impl InMemoryLinkStore {
    /// Empty store with inference disabled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inference(mut self, inference: bool) -> Self {
        self.inference = inference;
        self
    }

    /// Number of distinct linked pairs.
    pub fn len(&self) -> KindredResult<usize> {
        Ok(self.all_links()?.len())
    }

    pub fn is_empty(&self) -> KindredResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl LinkStore for InMemoryLinkStore {
    fn put_link(&self, link: Link) -> KindredResult<()> {
        let mut links = self
            .links
            .write()
            .map_err(|_| KindredError::lock_poisoned("link map"))?;
        links
            .entry(link.id2().to_string())
            .or_default()
            .insert(link.id1().to_string(), link.clone());
        links
            .entry(link.id1().to_string())
            .or_default()
            .insert(link.id2().to_string(), link);
        Ok(())
    }

    fn link_between(&self, id1: &str, id2: &str) -> KindredResult<Option<Link>> {
        let links = self
            .links
            .read()
            .map_err(|_| KindredError::lock_poisoned("link map"))?;
        Ok(links.get(id1).and_then(|m| m.get(id2)).cloned())
    }

    fn links_for(&self, id: &str) -> KindredResult<Vec<Link>> {
        let links = self
            .links
            .read()
            .map_err(|_| KindredError::lock_poisoned("link map"))?;
        let mut found: Vec<Link> = links
            .get(id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        found.sort_by(|a, b| a.other_id(id).cmp(b.other_id(id)));
        Ok(found)
    }

    fn all_links(&self) -> KindredResult<Vec<Link>> {
        let links = self
            .links
            .read()
            .map_err(|_| KindredError::lock_poisoned("link map"))?;
        let mut all: Vec<Link> = links
            .iter()
            .flat_map(|(id, m)| m.values().filter(move |l| l.id1() == id))
            .cloned()
            .collect();
        all.sort_by(|a, b| (a.id1(), a.id2()).cmp(&(b.id1(), b.id2())));
        Ok(all)
    }

    fn changes_since(
        &self,
        since: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> KindredResult<Vec<Link>> {
        let mut changed: Vec<Link> = self
            .all_links()?
            .into_iter()
            .filter(|l| l.timestamp > since && before.map_or(true, |b| l.timestamp <= b))
            .collect();
        changed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            changed.truncate(limit);
        }
        Ok(changed)
    }

    fn clear(&self) -> KindredResult<()> {
        self.links
            .write()
            .map_err(|_| KindredError::lock_poisoned("link map"))?
            .clear();
        Ok(())
    }

    fn inference_enabled(&self) -> bool {
        self.inference
    }
}
