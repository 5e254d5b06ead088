//! Per-bucket counts of discrete values.
//!
//! The number of distinct values seen in one bucket is expected to be small (tens of
//! HTTP status codes, say), so entries live in a plain vector and lookups scan it. A
//! hashed index is built lazily only if a bucket goes past [`LINEAR_SCAN_LIMIT`] distinct
//! labels, so a misbehaving label source degrades to hashing instead of quadratic scans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Distinct labels a counter holds before it starts maintaining a hashed index.
pub const LINEAR_SCAN_LIMIT: usize = 64;

type IndexMap = HashMap<String, usize, ahash::RandomState>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscretePoint {
    pub value: String,
    pub count: u64,
}

/// Ordered `(label, count)` pairs, at most one per label, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DiscreteCounter {
    points: Vec<DiscretePoint>,
    index: Option<IndexMap>,
}

impl DiscreteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to `label`, appending it with a count of 1 if unseen.
    pub fn increment(&mut self, label: &str) {
        if let Some(index) = self.index.as_ref() {
            if let Some(&pos) = index.get(label) {
                self.points[pos].count += 1;
                return;
            }
        } else if let Some(p) = self.points.iter_mut().find(|p| p.value == label) {
            p.count += 1;
            return;
        }

        self.points.push(DiscretePoint {
            value: label.to_owned(),
            count: 1,
        });
        let pos = self.points.len() - 1;
        if let Some(index) = self.index.as_mut() {
            index.insert(label.to_owned(), pos);
        } else if self.points.len() > LINEAR_SCAN_LIMIT {
            self.build_index();
        }
    }

    fn build_index(&mut self) {
        log::debug!(
            "discrete counter exceeded {} labels, switching to hashed lookups",
            LINEAR_SCAN_LIMIT
        );
        let index = self
            .points
            .iter()
            .enumerate()
            .map(|(pos, p)| (p.value.clone(), pos))
            .collect::<IndexMap>();
        self.index = Some(index);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.points.clear();
        self.index = None;
    }

    #[inline]
    pub fn get(&self, label: &str) -> u64 {
        match self.index.as_ref() {
            Some(index) => index.get(label).map(|&pos| self.points[pos].count),
            None => self
                .points
                .iter()
                .find(|p| p.value == label)
                .map(|p| p.count),
        }
        .unwrap_or(0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &DiscretePoint> {
        self.points.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_indexed(&self) -> bool {
        self.index.is_some()
    }
}
