//! Label selector matching
//!
//! Selectors are opt-in: a selector without `matchLabels` matches nothing.

use crate::types::{Labels, Selector, document_labels};
use serde_json::Value;

impl Selector {
    /// Check if a label set carries every required label with an equal value
    pub fn matches(&self, labels: &Labels) -> bool {
        !self.match_labels.is_empty()
            && self
                .match_labels
                .iter()
                .all(|(key, required)| labels.get(key) == Some(required))
    }

    /// Documents of `pool` whose `metadata.labels` satisfy this selector, in pool order
    pub fn select<'a>(&self, pool: &'a [Value]) -> Vec<&'a Value> {
        if self.match_labels.is_empty() {
            return Vec::new();
        }

        pool.iter()
            .filter(|doc| self.matches(&document_labels(doc)))
            .collect()
    }
}
