//! One-to-many regrouping of expand results.

use std::collections::HashMap;

use super::cache::{JoinedResultCache, RowView};
use crate::error::Result;

/// Members of an expand, grouped by parent id in source row order.
#[derive(Debug, Clone)]
pub struct ExpandGroup<T> {
    groups: HashMap<i64, Vec<T>>,
    has_result: bool,
}

impl<T> ExpandGroup<T> {
    /// Members of `parent`; empty when it has none or was not requested.
    pub fn get(&self, parent: i64) -> &[T] {
        self.groups.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check whether `parent` was part of the expand.
    pub fn contains(&self, parent: i64) -> bool {
        self.groups.contains_key(&parent)
    }

    /// Whether the expand returned any row at all.
    pub fn has_result(&self) -> bool {
        self.has_result
    }

    /// Number of parents.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if there are no parents.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All members of all parents.
    pub fn members(&self) -> impl Iterator<Item = &T> {
        self.groups.values().flatten()
    }
}

/// Builds [`ExpandGroup`]s from an expand-mode cache.
pub struct ExpandResolver;

impl ExpandResolver {
    /// Group the rows of `cache` (keyed by parent id) under `parents`.
    ///
    /// `member` maps a row to a group member; returning `None` skips the row.
    /// Every parent gets an entry, possibly empty.
    pub fn resolve<T, F>(
        cache: &JoinedResultCache,
        parents: &[i64],
        mut member: F,
    ) -> Result<ExpandGroup<T>>
    where
        F: FnMut(&RowView<'_>) -> Result<Option<T>>,
    {
        let mut groups: HashMap<i64, Vec<T>> =
            parents.iter().map(|&p| (p, Vec::new())).collect();

        for row in cache.rows() {
            let Some(list) = groups.get_mut(&row.key().key) else {
                continue;
            };
            if let Some(m) = member(&row)? {
                list.push(m);
            }
        }

        Ok(ExpandGroup {
            groups,
            has_result: !cache.is_empty(),
        })
    }
}
