//! Instance queries and selection trees.

use crate::instance::Instance;
use serde::{Deserialize, Serialize};

/// One node of a selection tree.
///
/// Leaves produce one output column each. An edge (`LinkTo`, `LinkFrom`) moves
/// evaluation to other objects; its children are evaluated against those objects.
/// An edge without children is itself a leaf and yields the linked instance (or
/// the list of linked instances).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// A stored attribute of the current object.
    Attribute {
        /// Attribute name as declared in the catalog.
        name: String,
        /// Output alias.
        alias: Option<String>,
    },
    /// The identity of the current object.
    Instance {
        /// Output alias.
        alias: Option<String>,
    },
    /// Follow a link attribute (1:1) to another object.
    LinkTo {
        /// Name of the link attribute on the current object.
        attribute: String,
        /// Output alias when used as a leaf.
        alias: Option<String>,
        /// Selections evaluated on the linked object.
        children: Vec<Selection>,
    },
    /// Collect every object of `child_type` whose `link_attribute` points at the
    /// current object (1:N).
    LinkFrom {
        /// Type of the linking objects.
        child_type: String,
        /// Link attribute on `child_type` pointing back at the current object.
        link_attribute: String,
        /// Output alias when used as a leaf.
        alias: Option<String>,
        /// Selections evaluated on every linking object.
        children: Vec<Selection>,
    },
}

impl Selection {
    /// Select a stored attribute.
    pub fn attribute(name: impl Into<String>) -> Self {
        Selection::Attribute {
            name: name.into(),
            alias: None,
        }
    }

    /// Select the current object's identity.
    pub fn instance() -> Self {
        Selection::Instance { alias: None }
    }

    /// Follow a link attribute.
    pub fn linkto(attribute: impl Into<String>, children: Vec<Selection>) -> Self {
        Selection::LinkTo {
            attribute: attribute.into(),
            alias: None,
            children,
        }
    }

    /// Collect the objects linking to the current one.
    pub fn linkfrom(
        child_type: impl Into<String>,
        link_attribute: impl Into<String>,
        children: Vec<Selection>,
    ) -> Self {
        Selection::LinkFrom {
            child_type: child_type.into(),
            link_attribute: link_attribute.into(),
            alias: None,
            children,
        }
    }

    /// Set the output alias.
    pub fn with_alias(mut self, new_alias: impl Into<String>) -> Self {
        match &mut self {
            Selection::Attribute { alias, .. }
            | Selection::Instance { alias }
            | Selection::LinkTo { alias, .. }
            | Selection::LinkFrom { alias, .. } => *alias = Some(new_alias.into()),
        }
        self
    }

    /// Get the output alias.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Selection::Attribute { alias, .. }
            | Selection::Instance { alias }
            | Selection::LinkTo { alias, .. }
            | Selection::LinkFrom { alias, .. } => alias.as_deref(),
        }
    }

    /// Get the child selections (empty for leaves).
    pub fn children(&self) -> &[Selection] {
        match self {
            Selection::LinkTo { children, .. } | Selection::LinkFrom { children, .. } => children,
            _ => &[],
        }
    }

    /// Check if this node moves evaluation to other objects.
    pub fn is_edge(&self) -> bool {
        matches!(self, Selection::LinkTo { .. } | Selection::LinkFrom { .. })
    }

    /// Number of edges on the longest path below (and including) this node.
    pub fn depth(&self) -> usize {
        let below = self.children().iter().map(Selection::depth).max().unwrap_or(0);
        if self.is_edge() {
            below + 1
        } else {
            below
        }
    }

    /// Number of output columns this node produces.
    pub fn leaf_count(&self) -> usize {
        if self.children().is_empty() {
            1
        } else {
            self.children().iter().map(Selection::leaf_count).sum()
        }
    }
}

/// A request: evaluate `selections` for every instance in `instances`.
///
/// Every root instance must be of `base_type` or one of its subtypes; attribute
/// names in the selection tree resolve against `base_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceQuery {
    /// Type the selections resolve against.
    pub base_type: String,
    /// Root instances, one result row each.
    pub instances: Vec<Instance>,
    /// Selection tree.
    pub selections: Vec<Selection>,
}

impl InstanceQuery {
    /// Create an empty query for a base type.
    pub fn new(base_type: impl Into<String>) -> Self {
        Self {
            base_type: base_type.into(),
            instances: vec![],
            selections: vec![],
        }
    }

    /// Add a root instance.
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instances.push(instance);
        self
    }

    /// Add several root instances.
    pub fn with_instances(mut self, instances: impl IntoIterator<Item = Instance>) -> Self {
        self.instances.extend(instances);
        self
    }

    /// Add root instances of the base type by id.
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        let base = self.base_type.clone();
        self.instances
            .extend(ids.into_iter().map(|id| Instance::new(base.clone(), id)));
        self
    }

    /// Add a selection.
    pub fn select(mut self, selection: Selection) -> Self {
        self.selections.push(selection);
        self
    }

    /// Add several selections.
    pub fn with_selections(mut self, selections: impl IntoIterator<Item = Selection>) -> Self {
        self.selections.extend(selections);
        self
    }

    /// Deepest edge nesting in the selection tree.
    pub fn depth(&self) -> usize {
        self.selections.iter().map(Selection::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_builders() {
        let sel = Selection::attribute("Name").with_alias("name");
        assert_eq!(sel.alias(), Some("name"));
        assert!(!sel.is_edge());
        assert_eq!(sel.depth(), 0);
        assert_eq!(sel.leaf_count(), 1);
    }

    #[test]
    fn test_linkto_depth_and_leaves() {
        let sel = Selection::linkto(
            "Company",
            vec![
                Selection::attribute("Name"),
                Selection::linkto("Country", vec![Selection::attribute("Code")]),
            ],
        );
        assert!(sel.is_edge());
        assert_eq!(sel.depth(), 2);
        assert_eq!(sel.leaf_count(), 2);
    }

    #[test]
    fn test_childless_edge_is_a_leaf() {
        let sel = Selection::linkfrom("Position", "Document", vec![]).with_alias("positions");
        assert_eq!(sel.leaf_count(), 1);
        assert_eq!(sel.depth(), 1);
        assert_eq!(sel.alias(), Some("positions"));
    }

    #[test]
    fn test_query_builder() {
        let query = InstanceQuery::new("Document")
            .with_ids([114, 224])
            .select(Selection::instance())
            .select(Selection::linkto("Company", vec![Selection::attribute("Name")]));

        assert_eq!(query.instances.len(), 2);
        assert_eq!(query.instances[1], Instance::new("Document", 224));
        assert_eq!(query.depth(), 1);
    }
}
