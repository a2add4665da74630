//! Factory for creating link stores.

use std::sync::Arc;

use kindred_core::config::{LinkStoreConfig, LinkStoreProvider, MatchConfig};
use kindred_core::error::{ErrorCode, KindredError, KindredResult};
use kindred_core::links::{InMemoryLinkStore, LinkStore};

/// Factory for creating link stores.
pub struct LinkStoreFactory;

impl LinkStoreFactory {
    /// Create a link store from the given configuration.
    pub fn create(config: &LinkStoreConfig) -> KindredResult<Arc<dyn LinkStore>> {
        match config.provider {
            LinkStoreProvider::Memory => Ok(Arc::new(
                InMemoryLinkStore::new().with_inference(config.inference),
            )),

            #[cfg(feature = "sqlite")]
            LinkStoreProvider::Sqlite => {
                let store = match &config.path {
                    Some(path) => crate::sqlite::SqliteLinkStore::open(path)?,
                    None => crate::sqlite::SqliteLinkStore::in_memory()?,
                };
                Ok(Arc::new(store.with_inference(config.inference)))
            }

            #[allow(unreachable_patterns)]
            _ => Err(KindredError::configuration_with_suggestion(
                ErrorCode::CfgInvalidValue,
                format!("link store provider {:?} is not available", config.provider),
                "Enable the matching feature of kindred-link-stores",
            )),
        }
    }

    /// Create the link store a match configuration asks for, if any.
    pub fn from_config(config: &MatchConfig) -> KindredResult<Option<Arc<dyn LinkStore>>> {
        config.link_store.as_ref().map(Self::create).transpose()
    }

    /// Create an SQLite link store at the given path.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(
        path: impl Into<std::path::PathBuf>,
        inference: bool,
    ) -> KindredResult<Arc<dyn LinkStore>> {
        Self::create(&LinkStoreConfig {
            provider: LinkStoreProvider::Sqlite,
            path: Some(path.into()),
            inference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_core::types::{Link, LinkKind};

    #[test]
    fn test_create_memory_store() {
        let store = LinkStoreFactory::create(&LinkStoreConfig::default()).unwrap();
        assert!(store.inference_enabled());
        store.put_link(Link::asserted("a", "b", LinkKind::Same)).unwrap();
        assert_eq!(store.all_links().unwrap().len(), 1);
    }

    #[test]
    fn test_no_store_configured() {
        assert!(LinkStoreFactory::from_config(&MatchConfig::default())
            .unwrap()
            .is_none());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_create_sqlite_in_memory() {
        let config = LinkStoreConfig {
            provider: LinkStoreProvider::Sqlite,
            path: None,
            inference: false,
        };
        let store = LinkStoreFactory::create(&config).unwrap();
        assert!(!store.inference_enabled());
        assert!(store.all_links().unwrap().is_empty());
    }
}
