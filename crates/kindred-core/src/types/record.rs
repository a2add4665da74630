//! Record type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A data record: property name to an unordered collection of string values.
///
/// A property may carry no values at all. Blank values are kept as given but
/// are skipped by [`Record::non_blank_values`], which is what comparison and
/// indexing use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Vec<String>>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value for a property (builder style).
    pub fn with_value(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_value(property, value);
        self
    }

    /// Add a value for a property.
    pub fn add_value(&mut self, property: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(property.into())
            .or_default()
            .push(value.into());
    }

    /// All values of a property, blanks included.
    pub fn values(&self, property: &str) -> &[String] {
        self.values.get(property).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values of a property that are not empty or whitespace-only.
    pub fn non_blank_values<'a>(&'a self, property: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.values(property)
            .iter()
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// First non-blank value of a property.
    pub fn value(&self, property: &str) -> Option<&str> {
        self.non_blank_values(property).next()
    }

    /// Names of the properties present on this record.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Whether the record has at least one non-blank value for the property.
    pub fn has_value(&self, property: &str) -> bool {
        self.value(property).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|vs| vs.is_empty())
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (property, value) in iter {
            record.add_value(property, value);
        }
        record
    }
}
