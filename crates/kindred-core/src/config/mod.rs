//! Configuration system for kindred.
//!
//! [`MatchConfig`] describes the properties of a record type, the match
//! thresholds, and how the engine, the candidate index and the link store are
//! set up. It deserializes from TOML, JSON or YAML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, KindredError, KindredResult};
use crate::model::comparators::ComparatorKind;
use crate::model::{LookupPolicy, PropertyModel, PropertyRole};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 40_000;

/// Default size above which a token bucket is saturated.
pub const DEFAULT_MAX_BUCKET_SIZE: usize = 1_000_000;

/// One property of the record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(default)]
    pub role: PropertyRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparator: Option<ComparatorKind>,
    /// Probability when the values disagree.
    #[serde(default = "default_probability")]
    pub low: f64,
    /// Probability when the values agree completely.
    #[serde(default = "default_probability")]
    pub high: f64,
    #[serde(default)]
    pub lookup: LookupPolicy,
}

fn default_probability() -> f64 {
    0.5
}

impl PropertyConfig {
    /// The identity property.
    pub fn id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Id,
            comparator: None,
            low: 0.5,
            high: 0.5,
            lookup: LookupPolicy::Never,
        }
    }

    /// A compared property.
    pub fn comparable(
        name: impl Into<String>,
        comparator: ComparatorKind,
        low: f64,
        high: f64,
    ) -> Self {
        Self {
            name: name.into(),
            role: PropertyRole::Comparable,
            comparator: Some(comparator),
            low,
            high,
            lookup: LookupPolicy::Auto,
        }
    }

    /// A property carried but never compared.
    pub fn ignored(name: impl Into<String>) -> Self {
        Self {
            role: PropertyRole::Ignored,
            lookup: LookupPolicy::Never,
            ..Self::id(name)
        }
    }

    /// Set the lookup policy.
    pub fn with_lookup(mut self, lookup: LookupPolicy) -> Self {
        self.lookup = lookup;
        self
    }
}

/// Worker pool and batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of comparison workers.
    pub threads: usize,
    /// Records pulled from the sources per batch.
    pub batch_size: usize,
    /// Whether to attach a profiler to runs.
    pub profiling: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: DEFAULT_BATCH_SIZE,
            profiling: false,
        }
    }
}

/// Candidate index tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum candidates returned per query.
    pub max_search_hits: usize,
    /// Fraction in [0, 1] used by both relevance cutoffs; 0 disables them.
    pub min_relevance: f64,
    /// Bucket size above which a token is saturated.
    pub max_bucket_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_search_hits: 1_000_000,
            min_relevance: 0.0,
            max_bucket_size: DEFAULT_MAX_BUCKET_SIZE,
        }
    }
}

/// Link store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStoreProvider {
    #[default]
    Memory,
    Sqlite,
}

/// Link store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkStoreConfig {
    pub provider: LinkStoreProvider,
    /// Database file; `None` opens an in-memory database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Whether asserting a link also writes its transitive consequences.
    pub inference: bool,
}

impl Default for LinkStoreConfig {
    fn default() -> Self {
        Self {
            provider: LinkStoreProvider::Memory,
            path: None,
            inference: true,
        }
    }
}

/// Main match configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Probability above which a pair is a match.
    pub threshold: f64,
    /// Probability above which a pair is a possible match; 0 disables.
    pub maybe_threshold: f64,
    pub properties: Vec<PropertyConfig>,
    pub engine: EngineConfig,
    pub index: IndexConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_store: Option<LinkStoreConfig>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            maybe_threshold: 0.0,
            properties: Vec::new(),
            engine: EngineConfig::default(),
            index: IndexConfig::default(),
            link_store: None,
        }
    }
}

impl MatchConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> KindredResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let parse_err = |e: String| KindredError::configuration(ErrorCode::CfgInvalidValue, e);
        match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
            Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))
            }
            _ => Err(KindredError::configuration(
                ErrorCode::CfgUnsupportedFormat,
                "Unsupported config file format. Use .toml, .json, or .yaml",
            )),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> KindredResult<Self> {
        toml::from_str(content)
            .map_err(|e| KindredError::configuration(ErrorCode::CfgInvalidValue, e.to_string()))
    }

    /// Override engine and threshold settings from `KINDRED_*` environment variables.
    pub fn with_env_overrides(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(threshold) = var("KINDRED_THRESHOLD") {
            self.threshold = threshold;
        }
        if let Some(maybe) = var("KINDRED_MAYBE_THRESHOLD") {
            self.maybe_threshold = maybe;
        }
        if let Some(threads) = var("KINDRED_THREADS") {
            self.engine.threads = threads;
        }
        if let Some(batch_size) = var("KINDRED_BATCH_SIZE") {
            self.engine.batch_size = batch_size;
        }
        if let Ok(path) = std::env::var("KINDRED_LINK_DB_PATH") {
            let store = self.link_store.get_or_insert_with(LinkStoreConfig::default);
            store.provider = LinkStoreProvider::Sqlite;
            store.path = Some(PathBuf::from(path));
        }
        self
    }

    /// Check the configuration for contradictions before any processing.
    pub fn validate(&self) -> KindredResult<()> {
        if self.engine.threads == 0 {
            return Err(KindredError::configuration(
                ErrorCode::CfgInvalidValue,
                "engine.threads must be at least 1",
            ));
        }
        if self.engine.batch_size == 0 {
            return Err(KindredError::configuration(
                ErrorCode::CfgInvalidValue,
                "engine.batch_size must be at least 1",
            ));
        }
        if self.index.max_search_hits == 0 || self.index.max_bucket_size == 0 {
            return Err(KindredError::configuration(
                ErrorCode::CfgInvalidValue,
                "index.max_search_hits and index.max_bucket_size must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.index.min_relevance) {
            return Err(KindredError::configuration(
                ErrorCode::CfgInvalidValue,
                format!("index.min_relevance {} is outside [0, 1]", self.index.min_relevance),
            ));
        }
        if let Some(LinkStoreConfig {
            provider: LinkStoreProvider::Memory,
            path: Some(path),
            ..
        }) = &self.link_store
        {
            return Err(KindredError::configuration_with_suggestion(
                ErrorCode::CfgInvalidValue,
                format!("memory link store cannot use path {}", path.display()),
                "Set link_store.provider to \"sqlite\" to persist links",
            ));
        }

        PropertyModel::from_config(self).map(|_| ())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> MatchConfigBuilder {
        MatchConfigBuilder::default()
    }
}

/// Builder for MatchConfig.
#[derive(Default)]
pub struct MatchConfigBuilder {
    config: MatchConfig,
}

impl MatchConfigBuilder {
    /// Set the match threshold.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the maybe threshold.
    pub fn maybe_threshold(mut self, threshold: f64) -> Self {
        self.config.maybe_threshold = threshold;
        self
    }

    /// Add a property.
    pub fn property(mut self, property: PropertyConfig) -> Self {
        self.config.properties.push(property);
        self
    }

    /// Set the number of worker threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.engine.threads = threads;
        self
    }

    /// Set the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.engine.batch_size = batch_size;
        self
    }

    /// Enable profiling.
    pub fn profiling(mut self, profiling: bool) -> Self {
        self.config.engine.profiling = profiling;
        self
    }

    /// Set candidate index configuration.
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    /// Set link store configuration.
    pub fn link_store(mut self, link_store: LinkStoreConfig) -> Self {
        self.config.link_store = Some(link_store);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MatchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML: &str = r#"
threshold = 0.85
maybe_threshold = 0.7

[engine]
threads = 4

[[properties]]
name = "ID"
role = "id"

[[properties]]
name = "NAME"
comparator = { type = "levenshtein" }
low = 0.3
high = 0.9

[[properties]]
name = "EMAIL"
comparator = { type = "exact" }
low = 0.4
high = 0.95
lookup = "required"
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_toml() {
        let config = MatchConfig::from_toml_str(TOML).unwrap();
        assert_eq!(config.threshold, 0.85);
        assert_eq!(config.engine.threads, 4);
        assert_eq!(config.engine.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.properties.len(), 3);
        assert_eq!(config.properties[0].role, PropertyRole::Id);
        assert_eq!(config.properties[2].lookup, LookupPolicy::Required);
        assert_eq!(config.properties[1].comparator, Some(ComparatorKind::Levenshtein));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_formats() {
        let file = write_temp(".toml", TOML);
        let from_toml = MatchConfig::from_file(file.path()).unwrap();

        let json = serde_json::to_string(&from_toml).unwrap();
        let file = write_temp(".json", &json);
        assert_eq!(MatchConfig::from_file(file.path()).unwrap(), from_toml);

        let yaml = serde_yaml::to_string(&from_toml).unwrap();
        let file = write_temp(".yml", &yaml);
        assert_eq!(MatchConfig::from_file(file.path()).unwrap(), from_toml);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("KINDRED_THRESHOLD", "0.92");
        std::env::set_var("KINDRED_THREADS", "8");
        std::env::set_var("KINDRED_BATCH_SIZE", "not a number");
        std::env::set_var("KINDRED_LINK_DB_PATH", "/tmp/kindred-links.db");
        let config = MatchConfig::from_toml_str(TOML).unwrap().with_env_overrides();
        for name in [
            "KINDRED_THRESHOLD",
            "KINDRED_THREADS",
            "KINDRED_BATCH_SIZE",
            "KINDRED_LINK_DB_PATH",
        ] {
            std::env::remove_var(name);
        }

        assert_eq!(config.threshold, 0.92);
        assert_eq!(config.maybe_threshold, 0.7);
        assert_eq!(config.engine.threads, 8);
        // unparseable values are ignored
        assert_eq!(config.engine.batch_size, DEFAULT_BATCH_SIZE);
        let store = config.link_store.unwrap();
        assert_eq!(store.provider, LinkStoreProvider::Sqlite);
        assert_eq!(store.path, Some(PathBuf::from("/tmp/kindred-links.db")));
    }

    #[test]
    fn test_unsupported_format() {
        let file = write_temp(".ini", "threshold = 0.5");
        let err = MatchConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CfgUnsupportedFormat);
    }

    #[test]
    fn test_builder() {
        let config = MatchConfig::builder()
            .threshold(0.9)
            .threads(2)
            .batch_size(10)
            .property(PropertyConfig::id("ID"))
            .property(PropertyConfig::comparable("NAME", ComparatorKind::Exact, 0.1, 0.95))
            .build();
        assert_eq!(config.engine.threads, 2);
        assert_eq!(config.engine.batch_size, 10);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_engine() {
        let mut config = MatchConfig::from_toml_str(TOML).unwrap();
        config.engine.threads = 0;
        assert_eq!(config.validate().unwrap_err().code(), ErrorCode::CfgInvalidValue);

        let mut config = MatchConfig::from_toml_str(TOML).unwrap();
        config.index.min_relevance = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_memory_store_with_path() {
        let mut config = MatchConfig::from_toml_str(TOML).unwrap();
        config.link_store = Some(LinkStoreConfig {
            path: Some(PathBuf::from("links.db")),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.suggestion().is_some());
    }
}
