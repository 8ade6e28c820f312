//! Post-fetch access filtering.
//!
//! The filter walks the compiled selection tree once per root row and asks the
//! oracle about every object the row can reach. A denied root removes the row;
//! a denied linked or linking object only hides what is read through it. No SQL
//! is issued.

use tracing::debug;

use super::oracle::{AccessDecisions, AccessOracle};
use crate::catalog::Catalog;
use crate::error::Result;
use crate::query::{AttributeValueReader, CompiledQuery, LevelId, NodeId, NodeKind, ROOT_LEVEL};
use instaq_proto::Instance;

/// Root rows that survived filtering, and every access decision taken.
#[derive(Debug, Clone, Default)]
pub struct AccessView {
    visible: Vec<usize>,
    decisions: AccessDecisions,
    dropped: usize,
}

impl AccessView {
    /// Positions of the visible rows in the root cache, in row order.
    pub fn visible(&self) -> &[usize] {
        &self.visible
    }

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    /// Check if no row is visible.
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Number of root rows removed.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Decisions for every instance that was checked.
    pub fn decisions(&self) -> &AccessDecisions {
        &self.decisions
    }
}

/// Applies an [`AccessOracle`] to an executed query.
pub struct AccessFilter<'a> {
    catalog: &'a Catalog,
    oracle: &'a dyn AccessOracle,
    decisions: AccessDecisions,
}

impl<'a> AccessFilter<'a> {
    /// Create a filter consulting `oracle`.
    pub fn new(catalog: &'a Catalog, oracle: &'a dyn AccessOracle) -> Self {
        Self {
            catalog,
            oracle,
            decisions: AccessDecisions::new(),
        }
    }

    /// Filter the root rows of `query`.
    pub fn apply(mut self, query: &CompiledQuery) -> Result<AccessView> {
        let root = query.level(ROOT_LEVEL);
        let reader = AttributeValueReader::new(self.catalog);
        let empty_expand = query
            .expands()
            .iter()
            .position(|e| e.source() == ROOT_LEVEL && !e.has_result());

        let mut visible = Vec::with_capacity(root.cache().len());
        for (pos, row) in root.cache().rows().enumerate() {
            let key = row.key().key;
            if let Some(expand) = empty_expand {
                debug!(key, expand, "row dropped, expand returned no rows");
                continue;
            }

            let instance = root
                .instance(key)
                .cloned()
                .unwrap_or_else(|| Instance::new(query.base_type(), key));
            if !self.decisions.check(self.oracle, &instance) {
                debug!(instance = %instance, "row dropped, access denied");
                continue;
            }

            self.walk(query, &reader, ROOT_LEVEL, key, query.top())?;
            visible.push(pos);
        }

        let dropped = root.cache().len() - visible.len();
        debug!(
            visible = visible.len(),
            dropped,
            checked = self.decisions.len(),
            "access filter applied"
        );
        Ok(AccessView {
            visible,
            decisions: self.decisions,
            dropped,
        })
    }

    fn walk(
        &mut self,
        query: &CompiledQuery,
        reader: &AttributeValueReader<'_>,
        level: LevelId,
        key: i64,
        nodes: &[NodeId],
    ) -> Result<()> {
        for &id in nodes {
            let node = query.node(id);
            match &node.kind {
                NodeKind::LinkTo { attr, plan, target } => {
                    let Some(linked) = query.linked_instance(reader, level, key, attr, *plan)?
                    else {
                        continue;
                    };
                    if !self.decisions.check(self.oracle, &linked) {
                        continue;
                    }
                    if let Some(target) = target {
                        self.walk(query, reader, *target, linked.id(), &node.children)?;
                    }
                }
                NodeKind::LinkFrom { expand, target } => {
                    for member in query.children_of(*expand, key) {
                        if !self.decisions.check(self.oracle, member) {
                            continue;
                        }
                        if let Some(target) = target {
                            self.walk(query, reader, *target, member.id(), &node.children)?;
                        }
                    }
                }
                NodeKind::Instance | NodeKind::Attribute { .. } | NodeKind::MultiLine { .. } => {}
            }
        }
        Ok(())
    }
}
