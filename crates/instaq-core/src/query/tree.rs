//! Compiled selection trees.
//!
//! A [`CompiledQuery`] owns every table plan, cache and expand group of one
//! evaluation in arenas; nodes, levels and expands refer to each other by index.
//!
//! A *level* is the set of objects reached by one path through the tree: the
//! root instances, the targets of a linkto edge, or the members of a linkfrom
//! edge. Each level has its own joined cache keyed by object id, filled by one
//! table plan per physical table. An *expand* is a one-to-many fetch keyed by
//! the ids of its source level (linkfrom children, multi-line values).
//!
//! Levels and expands execute in creation order, which always places a source
//! before everything that depends on it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::batch::IdentifierBatcher;
use super::cache::{JoinedResultCache, RowView};
use super::expand::{ExpandGroup, ExpandResolver};
use super::plan::TablePlan;
use super::reader::{read_scalar, AttributeValueReader};
use crate::catalog::{AttributeDef, AttributeKind, Catalog, TableDef};
use crate::config::QueryBudget;
use crate::dialect::SqlConnection;
use crate::error::{Error, Result};
use instaq_proto::{Instance, InstanceQuery, Selection, Value};

/// Index of a node in [`CompiledQuery::node`].
pub type NodeId = usize;
/// Index of a level in [`CompiledQuery::level`].
pub type LevelId = usize;
/// Index of an expand in [`CompiledQuery::expand`].
pub type ExpandId = usize;

/// The level holding the query's root instances.
pub const ROOT_LEVEL: LevelId = 0;

/// What a selection node reads.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The current object's identity.
    Instance,
    /// A single-row attribute read from `plan` of the node's level.
    Attribute {
        attr: Arc<AttributeDef>,
        plan: usize,
    },
    /// A multi-line attribute resolved through `expand`.
    MultiLine {
        attr: Arc<AttributeDef>,
        expand: ExpandId,
    },
    /// A link read from `plan`; children are evaluated on `target`.
    LinkTo {
        attr: Arc<AttributeDef>,
        plan: usize,
        target: Option<LevelId>,
    },
    /// Linking objects collected by `expand`; children are evaluated on `target`.
    LinkFrom {
        expand: ExpandId,
        target: Option<LevelId>,
    },
}

/// A compiled selection.
#[derive(Debug, Clone)]
pub struct Node {
    /// What the node reads.
    pub kind: NodeKind,
    /// Level the node is evaluated on.
    pub level: LevelId,
    /// Declared alias.
    pub alias: Option<String>,
    /// Default label: attribute name, `instance`, or `Child#Link`.
    pub label: String,
    /// Child nodes, evaluated on the edge's target level.
    pub children: Vec<NodeId>,
}

impl Node {
    /// The attribute the node reads, if any.
    pub fn attribute(&self) -> Option<&AttributeDef> {
        match &self.kind {
            NodeKind::Attribute { attr, .. }
            | NodeKind::MultiLine { attr, .. }
            | NodeKind::LinkTo { attr, .. } => Some(attr),
            NodeKind::Instance | NodeKind::LinkFrom { .. } => None,
        }
    }
}

/// Where a level's ids come from.
#[derive(Debug, Clone)]
pub enum LevelSource {
    /// The query's root instances.
    Root,
    /// Distinct targets of a link read from `plan` of `level`.
    LinkTo {
        level: LevelId,
        attr: Arc<AttributeDef>,
        plan: usize,
    },
    /// Members of a linkfrom expand.
    LinkFrom { expand: ExpandId },
}

/// Objects reached by one path, with their joined rows.
#[derive(Debug)]
pub struct Level {
    type_name: String,
    source: LevelSource,
    plans: Vec<TablePlan>,
    cache: JoinedResultCache,
    instances: HashMap<i64, Instance>,
}

impl Level {
    fn new(type_name: String, source: LevelSource, main_table: Arc<TableDef>) -> Self {
        Self {
            type_name,
            source,
            plans: vec![TablePlan::new(main_table)],
            cache: JoinedResultCache::new(),
            instances: HashMap::new(),
        }
    }

    /// Type the level's attributes resolve against.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Where the level's ids come from.
    pub fn source(&self) -> &LevelSource {
        &self.source
    }

    /// Table plans, main table first.
    pub fn plans(&self) -> &[TablePlan] {
        &self.plans
    }

    /// Joined rows of the level.
    pub fn cache(&self) -> &JoinedResultCache {
        &self.cache
    }

    /// The instance with `id`, as it was reached.
    pub fn instance(&self, id: i64) -> Option<&Instance> {
        self.instances.get(&id)
    }

    /// The joined row of the object with `id`.
    pub fn row(&self, id: i64) -> Option<RowView<'_>> {
        self.cache.row_by_key(id)
    }
}

/// What an expand collects.
#[derive(Debug, Clone)]
pub enum ExpandKind {
    /// Instances of `child_type` whose link points at the parent.
    Children {
        child_type: String,
        type_column: Option<String>,
    },
    /// Values of a multi-line attribute.
    Lines { attr: Arc<AttributeDef> },
}

/// Resolved members of an expand.
#[derive(Debug, Clone)]
pub enum ExpandMembers {
    /// Not executed yet.
    Pending,
    /// Linkfrom children.
    Children(ExpandGroup<Instance>),
    /// Multi-line values.
    Lines(ExpandGroup<Value>),
}

/// A one-to-many fetch keyed by the ids of its source level.
#[derive(Debug)]
pub struct Expand {
    source: LevelId,
    kind: ExpandKind,
    plan: TablePlan,
    cache: JoinedResultCache,
    parents: Vec<i64>,
    members: ExpandMembers,
}

impl Expand {
    fn new(source: LevelId, kind: ExpandKind, plan: TablePlan) -> Self {
        Self {
            source,
            kind,
            plan,
            cache: JoinedResultCache::new(),
            parents: Vec::new(),
            members: ExpandMembers::Pending,
        }
    }

    /// Level whose ids are the parents.
    pub fn source(&self) -> LevelId {
        self.source
    }

    /// What the expand collects.
    pub fn kind(&self) -> &ExpandKind {
        &self.kind
    }

    /// The expand's table plan.
    pub fn plan(&self) -> &TablePlan {
        &self.plan
    }

    /// Rows keyed by (parent id, row id).
    pub fn cache(&self) -> &JoinedResultCache {
        &self.cache
    }

    /// Parent ids the expand was executed for.
    pub fn parents(&self) -> &[i64] {
        &self.parents
    }

    /// Whether the expand returned any row.
    pub fn has_result(&self) -> bool {
        self.plan.expand_has_result()
    }

    /// Linkfrom children, once executed.
    pub fn children(&self) -> Option<&ExpandGroup<Instance>> {
        match &self.members {
            ExpandMembers::Children(group) => Some(group),
            _ => None,
        }
    }

    /// Multi-line values, once executed.
    pub fn lines(&self) -> Option<&ExpandGroup<Value>> {
        match &self.members {
            ExpandMembers::Lines(group) => Some(group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Level(LevelId),
    Expand(ExpandId),
}

/// One output column: a leaf of the selection tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    /// Dotted labels of the nodes on the path.
    pub label: String,
    /// Alias of the leaf, or of the edge above it when that edge has a
    /// single leaf.
    pub alias: Option<String>,
    /// Nodes from a top-level selection down to the leaf.
    pub path: Vec<NodeId>,
}

impl OutputColumn {
    /// The leaf node.
    pub fn leaf(&self) -> Option<NodeId> {
        self.path.last().copied()
    }

    /// Alias if declared, label otherwise.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.label)
    }
}

/// A selection tree compiled against the catalog, plus everything fetched for it.
#[derive(Debug)]
pub struct CompiledQuery {
    base_type: String,
    roots: Vec<Instance>,
    nodes: Vec<Node>,
    top: Vec<NodeId>,
    levels: Vec<Level>,
    expands: Vec<Expand>,
    schedule: Vec<Step>,
    columns: Vec<OutputColumn>,
    executed: bool,
}

impl CompiledQuery {
    /// Resolve every selection against `catalog`.
    ///
    /// All schema errors surface here, before any SQL runs.
    pub fn compile(catalog: &Catalog, query: &InstanceQuery, budget: &QueryBudget) -> Result<Self> {
        let base = catalog.get_type(&query.base_type)?;
        let depth = query.depth();
        if depth > budget.max_depth {
            return Err(Error::BudgetExceeded(format!(
                "selection depth {} exceeds maximum {}",
                depth, budget.max_depth
            )));
        }
        for instance in &query.instances {
            catalog.get_type(instance.type_name())?;
            if !catalog.is_a(instance.type_name(), &base.name) {
                return Err(Error::InvalidQuery(format!(
                    "root instance {} is not a {}",
                    instance, base.name
                )));
            }
        }

        let mut builder = Builder {
            catalog,
            query: CompiledQuery {
                base_type: base.name.clone(),
                roots: query.instances.clone(),
                nodes: Vec::new(),
                top: Vec::new(),
                levels: Vec::new(),
                expands: Vec::new(),
                schedule: Vec::new(),
                columns: Vec::new(),
                executed: false,
            },
            linkto_levels: HashMap::new(),
            linkfrom_levels: HashMap::new(),
            expand_index: HashMap::new(),
        };
        let main_table = catalog.get_table(&base.main_table)?;
        builder.add_level(base.name.clone(), LevelSource::Root, main_table);
        for selection in &query.selections {
            let id = builder.add_node(ROOT_LEVEL, selection)?;
            builder.query.top.push(id);
        }

        let mut compiled = builder.query;
        compiled.columns = compiled.collect_columns()?;
        debug!(
            base_type = %compiled.base_type,
            nodes = compiled.nodes.len(),
            levels = compiled.levels.len(),
            expands = compiled.expands.len(),
            columns = compiled.columns.len(),
            "compiled selection tree"
        );
        Ok(compiled)
    }

    /// Fetch every level and expand.
    ///
    /// Any error leaves the query unusable; callers discard it.
    pub fn execute(
        &mut self,
        catalog: &Catalog,
        conn: &dyn SqlConnection,
        batcher: &IdentifierBatcher,
        budget: &QueryBudget,
    ) -> Result<()> {
        if self.executed {
            return Err(Error::Precondition("query already executed".into()));
        }
        self.executed = true;

        for step in self.schedule.clone() {
            match step {
                Step::Level(id) => self.execute_level(id, catalog, conn, batcher, budget)?,
                Step::Expand(id) => self.execute_expand(id, catalog, conn, batcher)?,
            }
        }
        Ok(())
    }

    fn execute_level(
        &mut self,
        id: LevelId,
        catalog: &Catalog,
        conn: &dyn SqlConnection,
        batcher: &IdentifierBatcher,
        budget: &QueryBudget,
    ) -> Result<()> {
        let instances = self.level_instances(id, catalog)?;
        if instances.len() > budget.max_instances {
            return Err(Error::BudgetExceeded(format!(
                "{} instances of {} exceed maximum {}",
                instances.len(),
                self.levels[id].type_name,
                budget.max_instances
            )));
        }
        let ids: Vec<i64> = instances.iter().map(Instance::id).collect();

        let level = &mut self.levels[id];
        level.instances = instances.into_iter().map(|i| (i.id(), i)).collect();

        let mut next_index = 1;
        for plan in &mut level.plans {
            let stmt = plan.compile(&ids, next_index, batcher)?;
            next_index = stmt.next_index;
            if let Some(sql) = &stmt.sql {
                let rs = conn.fetch(sql)?;
                level
                    .cache
                    .populate(&rs, stmt.first_index, stmt.key_column, None)?;
            }
        }

        debug!(
            level = id,
            type_name = %level.type_name,
            ids = ids.len(),
            rows = level.cache.len(),
            "executed level"
        );
        Ok(())
    }

    fn execute_expand(
        &mut self,
        id: ExpandId,
        catalog: &Catalog,
        conn: &dyn SqlConnection,
        batcher: &IdentifierBatcher,
    ) -> Result<()> {
        let parents = self.levels[self.expands[id].source].cache.keys();
        let expand = &mut self.expands[id];

        let stmt = expand.plan.compile(&parents, 1, batcher)?;
        if let Some(sql) = &stmt.sql {
            let rs = conn.fetch(sql)?;
            expand
                .cache
                .populate(&rs, stmt.first_index, stmt.key_column, stmt.sub_key_column)?;
        }
        expand.plan.set_expand_has_result(!expand.cache.is_empty());

        expand.members = match &expand.kind {
            ExpandKind::Children {
                child_type,
                type_column,
            } => {
                let type_index = type_column.as_deref().and_then(|c| expand.plan.index_of(c));
                let reader = AttributeValueReader::new(catalog);
                ExpandMembers::Children(ExpandResolver::resolve(&expand.cache, &parents, |row| {
                    let Some(child_id) = row.key().sub_key else {
                        return Ok(None);
                    };
                    let type_name = match type_index {
                        Some(column) => match row.get_long(column)? {
                            Some(type_id) => reader.type_name(type_id)?,
                            None => child_type.clone(),
                        },
                        None => child_type.clone(),
                    };
                    if !catalog.is_a(&type_name, child_type) {
                        return Ok(None);
                    }
                    Ok(Some(Instance::new(type_name, child_id)))
                })?)
            }
            ExpandKind::Lines { attr } => {
                let AttributeKind::MultiLine(scalar) = &attr.kind else {
                    return Err(Error::InvalidQuery(format!(
                        "{} is not a multi-line attribute",
                        attr.qualified_name()
                    )));
                };
                let column = expand
                    .plan
                    .attribute_indices(attr)
                    .and_then(|indices| indices.first().copied())
                    .ok_or_else(|| Error::NoColumns(attr.qualified_name()))?;
                ExpandMembers::Lines(ExpandResolver::resolve(&expand.cache, &parents, |row| {
                    read_scalar(*scalar, row, column).map(Some)
                })?)
            }
        };

        debug!(
            expand = id,
            table = %expand.plan.table().name,
            parents = parents.len(),
            rows = expand.cache.len(),
            has_result = expand.has_result(),
            "executed expand"
        );
        expand.parents = parents;
        Ok(())
    }

    /// Distinct instances of a level, in the order they were reached.
    fn level_instances(&self, id: LevelId, catalog: &Catalog) -> Result<Vec<Instance>> {
        let candidates = match &self.levels[id].source {
            LevelSource::Root => self.roots.clone(),
            LevelSource::LinkTo { level, attr, plan } => {
                let source = &self.levels[*level];
                let indices = link_indices(&source.plans[*plan], attr)?;
                let reader = AttributeValueReader::new(catalog);
                let mut linked = Vec::new();
                for row in source.cache.rows() {
                    if let Some(instance) = reader.read_link(attr, &indices, &row)? {
                        linked.push(instance);
                    }
                }
                linked
            }
            LevelSource::LinkFrom { expand } => {
                let expand = &self.expands[*expand];
                match expand.children() {
                    Some(group) => expand
                        .parents
                        .iter()
                        .flat_map(|&parent| group.get(parent).iter().cloned())
                        .collect(),
                    None => Vec::new(),
                }
            }
        };

        let mut seen = HashSet::with_capacity(candidates.len());
        Ok(candidates
            .into_iter()
            .filter(|instance| seen.insert(instance.id()))
            .collect())
    }

    /// The instance a link node points at from the object `key` of `level`.
    pub fn linked_instance(
        &self,
        reader: &AttributeValueReader<'_>,
        level: LevelId,
        key: i64,
        attr: &AttributeDef,
        plan: usize,
    ) -> Result<Option<Instance>> {
        let level = &self.levels[level];
        let Some(row) = level.row(key) else {
            return Ok(None);
        };
        let indices = link_indices(&level.plans[plan], attr)?;
        reader.read_link(attr, &indices, &row)
    }

    /// Linkfrom children of `parent` in `expand`.
    pub fn children_of(&self, expand: ExpandId, parent: i64) -> &[Instance] {
        self.expands[expand]
            .children()
            .map(|group| group.get(parent))
            .unwrap_or(&[])
    }

    /// Multi-line values of `parent` in `expand`.
    pub fn lines_of(&self, expand: ExpandId, parent: i64) -> &[Value] {
        self.expands[expand]
            .lines()
            .map(|group| group.get(parent))
            .unwrap_or(&[])
    }

    /// Base type of the query.
    pub fn base_type(&self) -> &str {
        &self.base_type
    }

    /// Root instances as requested.
    pub fn roots(&self) -> &[Instance] {
        &self.roots
    }

    /// Top-level selection nodes.
    pub fn top(&self) -> &[NodeId] {
        &self.top
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// A level by id.
    pub fn level(&self, id: LevelId) -> &Level {
        &self.levels[id]
    }

    /// All levels in execution order.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// An expand by id.
    pub fn expand(&self, id: ExpandId) -> &Expand {
        &self.expands[id]
    }

    /// All expands in execution order.
    pub fn expands(&self) -> &[Expand] {
        &self.expands
    }

    /// Output columns in declaration order.
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    /// Check whether the query was executed.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    fn collect_columns(&self) -> Result<Vec<OutputColumn>> {
        let mut columns = Vec::new();
        let mut path = Vec::new();
        let mut labels = Vec::new();
        for &id in &self.top {
            self.collect(id, None, &mut path, &mut labels, &mut columns)?;
        }

        let mut aliases = HashSet::new();
        for column in &columns {
            if let Some(alias) = &column.alias {
                if !aliases.insert(alias.as_str()) {
                    return Err(Error::InvalidQuery(format!("duplicate alias: {}", alias)));
                }
            }
        }
        Ok(columns)
    }

    /// Walk down to the leaves. An alias on an edge names its only leaf column.
    fn collect<'s>(
        &'s self,
        id: NodeId,
        edge_alias: Option<&'s str>,
        path: &mut Vec<NodeId>,
        labels: &mut Vec<&'s str>,
        out: &mut Vec<OutputColumn>,
    ) -> Result<()> {
        let node = &self.nodes[id];
        let alias = match (edge_alias, node.alias.as_deref()) {
            (Some(outer), Some(inner)) => {
                return Err(Error::InvalidQuery(format!(
                    "column aliased both '{}' and '{}'",
                    outer, inner
                )))
            }
            (outer, inner) => outer.or(inner),
        };

        path.push(id);
        labels.push(&node.label);
        if node.children.is_empty() {
            out.push(OutputColumn {
                label: labels.join("."),
                alias: alias.map(str::to_string),
                path: path.clone(),
            });
        } else {
            if let Some(alias) = alias {
                let leaves = self.leaf_count(id);
                if leaves != 1 {
                    return Err(Error::InvalidQuery(format!(
                        "alias '{}' names an edge with {} columns",
                        alias, leaves
                    )));
                }
            }
            for &child in &node.children {
                self.collect(child, alias, path, labels, out)?;
            }
        }
        path.pop();
        labels.pop();
        Ok(())
    }

    fn leaf_count(&self, id: NodeId) -> usize {
        let node = &self.nodes[id];
        if node.children.is_empty() {
            1
        } else {
            node.children.iter().map(|&c| self.leaf_count(c)).sum()
        }
    }
}

fn link_indices(plan: &TablePlan, attr: &AttributeDef) -> Result<Vec<usize>> {
    plan.attribute_indices(attr).ok_or_else(|| {
        Error::Precondition(format!(
            "link {} not registered in plan for {}",
            attr.qualified_name(),
            plan.table().name
        ))
    })
}

struct Builder<'c> {
    catalog: &'c Catalog,
    query: CompiledQuery,
    linkto_levels: HashMap<(LevelId, String), LevelId>,
    linkfrom_levels: HashMap<ExpandId, LevelId>,
    expand_index: HashMap<(LevelId, String), ExpandId>,
}

impl Builder<'_> {
    fn add_level(&mut self, type_name: String, source: LevelSource, main: Arc<TableDef>) -> LevelId {
        let id = self.query.levels.len();
        self.query.levels.push(Level::new(type_name, source, main));
        self.query.schedule.push(Step::Level(id));
        id
    }

    fn add_expand(&mut self, key: (LevelId, String), kind: ExpandKind, plan: TablePlan) -> ExpandId {
        let id = self.query.expands.len();
        self.query.expands.push(Expand::new(key.0, kind, plan));
        self.query.schedule.push(Step::Expand(id));
        self.expand_index.insert(key, id);
        id
    }

    fn push_node(
        &mut self,
        kind: NodeKind,
        level: LevelId,
        alias: &Option<String>,
        label: String,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = self.query.nodes.len();
        self.query.nodes.push(Node {
            kind,
            level,
            alias: alias.clone(),
            label,
            children,
        });
        id
    }

    fn add_node(&mut self, level: LevelId, selection: &Selection) -> Result<NodeId> {
        let type_name = self.query.levels[level].type_name.clone();
        match selection {
            Selection::Instance { alias } => {
                Ok(self.push_node(NodeKind::Instance, level, alias, "instance".into(), vec![]))
            }
            Selection::Attribute { name, alias } => {
                let attr = self.catalog.get_attribute(&type_name, name)?;
                let kind = if attr.is_multi_line() {
                    let expand = self.lines_expand(level, &attr)?;
                    NodeKind::MultiLine { attr, expand }
                } else {
                    let plan = self.add_attribute(level, &attr)?;
                    NodeKind::Attribute { attr, plan }
                };
                Ok(self.push_node(kind, level, alias, name.clone(), vec![]))
            }
            Selection::LinkTo {
                attribute,
                alias,
                children,
            } => {
                let attr = self.catalog.get_attribute(&type_name, attribute)?;
                let target_type = attr
                    .link_target()
                    .ok_or_else(|| {
                        Error::InvalidQuery(format!(
                            "{} is not a link attribute",
                            attr.qualified_name()
                        ))
                    })?
                    .to_string();
                let plan = self.add_attribute(level, &attr)?;

                let (target, child_ids) = if children.is_empty() {
                    (None, Vec::new())
                } else {
                    let target = self.linkto_level(level, &attr, plan, target_type)?;
                    let ids = children
                        .iter()
                        .map(|child| self.add_node(target, child))
                        .collect::<Result<Vec<_>>>()?;
                    (Some(target), ids)
                };
                let kind = NodeKind::LinkTo { attr, plan, target };
                Ok(self.push_node(kind, level, alias, attribute.clone(), child_ids))
            }
            Selection::LinkFrom {
                child_type,
                link_attribute,
                alias,
                children,
            } => {
                let expand = self.children_expand(level, child_type, link_attribute)?;
                let (target, child_ids) = if children.is_empty() {
                    (None, Vec::new())
                } else {
                    let target = self.linkfrom_level(expand, child_type)?;
                    let ids = children
                        .iter()
                        .map(|child| self.add_node(target, child))
                        .collect::<Result<Vec<_>>>()?;
                    (Some(target), ids)
                };
                let kind = NodeKind::LinkFrom { expand, target };
                let label = format!("{}#{}", child_type, link_attribute);
                Ok(self.push_node(kind, level, alias, label, child_ids))
            }
        }
    }

    /// Register `attr` in the plan for its table, creating the plan if needed.
    fn add_attribute(&mut self, level: LevelId, attr: &AttributeDef) -> Result<usize> {
        let position = self.query.levels[level]
            .plans
            .iter()
            .position(|p| p.table().name == attr.table);
        let idx = match position {
            Some(idx) => idx,
            None => {
                let table = self.catalog.get_table(&attr.table)?;
                let plans = &mut self.query.levels[level].plans;
                plans.push(TablePlan::new(table));
                plans.len() - 1
            }
        };
        self.query.levels[level].plans[idx].add_attribute(attr)?;
        Ok(idx)
    }

    fn linkto_level(
        &mut self,
        level: LevelId,
        attr: &Arc<AttributeDef>,
        plan: usize,
        target_type: String,
    ) -> Result<LevelId> {
        let key = (level, attr.qualified_name());
        if let Some(&id) = self.linkto_levels.get(&key) {
            return Ok(id);
        }
        let main = self.catalog.main_table(&target_type)?;
        let source = LevelSource::LinkTo {
            level,
            attr: attr.clone(),
            plan,
        };
        let id = self.add_level(target_type, source, main);
        self.linkto_levels.insert(key, id);
        Ok(id)
    }

    fn linkfrom_level(&mut self, expand: ExpandId, child_type: &str) -> Result<LevelId> {
        if let Some(&id) = self.linkfrom_levels.get(&expand) {
            return Ok(id);
        }
        let main = self.catalog.main_table(child_type)?;
        let id = self.add_level(
            child_type.to_string(),
            LevelSource::LinkFrom { expand },
            main,
        );
        self.linkfrom_levels.insert(expand, id);
        Ok(id)
    }

    fn lines_expand(&mut self, level: LevelId, attr: &Arc<AttributeDef>) -> Result<ExpandId> {
        let key = (level, attr.qualified_name());
        if let Some(&id) = self.expand_index.get(&key) {
            return Ok(id);
        }
        let table = self.catalog.get_table(&attr.table)?;
        let parent_column = table.parent_column.clone().ok_or_else(|| {
            Error::InvalidQuery(format!(
                "multi-line attribute {} is stored in {}, which has no parent column",
                attr.qualified_name(),
                table.name
            ))
        })?;
        let mut plan = TablePlan::for_expand(table, parent_column);
        plan.add_attribute(attr)?;
        Ok(self.add_expand(key, ExpandKind::Lines { attr: attr.clone() }, plan))
    }

    fn children_expand(
        &mut self,
        level: LevelId,
        child_type: &str,
        link_attribute: &str,
    ) -> Result<ExpandId> {
        let key = (level, format!("{}#{}", child_type, link_attribute));
        if let Some(&id) = self.expand_index.get(&key) {
            return Ok(id);
        }

        let child = self.catalog.get_type(child_type)?;
        let attr = self.catalog.get_attribute(&child.name, link_attribute)?;
        let level_type = &self.query.levels[level].type_name;
        match attr.link_target() {
            Some(target) if self.catalog.is_a(level_type, target) => {}
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "{} does not link to {}",
                    attr.qualified_name(),
                    level_type
                )))
            }
        }
        let foreign_key = attr
            .columns
            .first()
            .cloned()
            .ok_or_else(|| Error::NoColumns(attr.qualified_name()))?;

        let table = self.catalog.get_table(&attr.table)?;
        let type_column = table.type_column.clone();
        let mut plan = TablePlan::for_expand(table, foreign_key);
        if let Some(column) = &type_column {
            plan.add_column(column);
        }
        let kind = ExpandKind::Children {
            child_type: child.name.clone(),
            type_column,
        };
        Ok(self.add_expand(key, kind, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ScalarType, TypeDef};

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        for table in [
            TableDef::new("T_DOC", "ID"),
            TableDef::new("T_DOC_EXT", "ID"),
            TableDef::new("T_COMPANY", "ID"),
            TableDef::new("T_POS", "ID").with_type_column("TYPE_ID"),
            TableDef::new("T_TAG", "ID").with_parent_column("DOC_ID"),
        ] {
            catalog.register_table(table).unwrap();
        }
        catalog
            .register_type(TypeDef::new("Company", 2, "T_COMPANY").with_attributes([
                AttributeDef::scalar("Name", "", "NAME", ScalarType::Text),
            ]))
            .unwrap();
        catalog
            .register_type(TypeDef::new("Document", 1, "T_DOC").with_attributes([
                AttributeDef::scalar("Name", "", "NAME", ScalarType::Text),
                AttributeDef::scalar("Note", "T_DOC_EXT", "NOTE", ScalarType::Text),
                AttributeDef::link("Company", "", "COMPANY_ID", "Company"),
                AttributeDef::multi_line("Tags", "T_TAG", "TAG", ScalarType::Text),
            ]))
            .unwrap();
        catalog
            .register_type(TypeDef::new("Position", 3, "T_POS").with_attributes([
                AttributeDef::scalar("Qty", "", "QTY", ScalarType::Integer),
                AttributeDef::link("Document", "", "DOC_ID", "Document"),
            ]))
            .unwrap();
        catalog
    }

    fn compile(query: InstanceQuery) -> Result<CompiledQuery> {
        CompiledQuery::compile(&catalog(), &query, &QueryBudget::default())
    }

    #[test]
    fn test_columns_follow_declaration_order() {
        let compiled = compile(
            InstanceQuery::new("Document")
                .with_ids([1])
                .select(Selection::attribute("Name").with_alias("name"))
                .select(Selection::linkto(
                    "Company",
                    vec![Selection::attribute("Name"), Selection::instance()],
                ))
                .select(Selection::linkfrom("Position", "Document", vec![])),
        )
        .unwrap();

        let labels: Vec<&str> = compiled.columns().iter().map(OutputColumn::name).collect();
        assert_eq!(
            labels,
            vec!["name", "Company.Name", "Company.instance", "Position#Document"]
        );
        assert_eq!(compiled.columns()[1].path.len(), 2);
        assert_eq!(compiled.levels().len(), 2);
        assert_eq!(compiled.expands().len(), 1);
    }

    #[test]
    fn test_plans_per_table() {
        let compiled = compile(
            InstanceQuery::new("Document")
                .select(Selection::attribute("Name"))
                .select(Selection::attribute("Note"))
                .select(Selection::attribute("Name").with_alias("again")),
        )
        .unwrap();
        let root = compiled.level(ROOT_LEVEL);
        let tables: Vec<&str> = root.plans().iter().map(|p| p.table().name.as_str()).collect();
        assert_eq!(tables, vec!["T_DOC", "T_DOC_EXT"]);
        assert_eq!(root.plans()[0].width(), 2);
    }

    #[test]
    fn test_levels_and_expands_are_shared() {
        let compiled = compile(
            InstanceQuery::new("Document")
                .select(Selection::linkto("Company", vec![Selection::attribute("Name")]))
                .select(Selection::linkto("Company", vec![Selection::instance()]))
                .select(Selection::attribute("Tags"))
                .select(Selection::attribute("Tags").with_alias("tags")),
        )
        .unwrap();
        assert_eq!(compiled.levels().len(), 2);
        assert_eq!(compiled.expands().len(), 1);
        assert!(matches!(
            compiled.expand(0).kind(),
            ExpandKind::Lines { .. }
        ));
        assert!(compiled.expand(0).plan().is_expand());
    }

    #[test]
    fn test_linkfrom_type_column_selected() {
        let compiled = compile(InstanceQuery::new("Document").select(Selection::linkfrom(
            "Position",
            "Document",
            vec![Selection::attribute("Qty")],
        )))
        .unwrap();
        let expand = compiled.expand(0);
        assert_eq!(expand.plan().columns(), ["ID", "DOC_ID", "TYPE_ID"]);
        assert_eq!(compiled.level(1).type_name(), "Position");
        assert!(matches!(
            compiled.level(1).source(),
            LevelSource::LinkFrom { expand: 0 }
        ));
    }

    #[test]
    fn test_schema_errors() {
        assert!(matches!(
            compile(InstanceQuery::new("Nope")),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            compile(InstanceQuery::new("Document").select(Selection::attribute("Missing"))),
            Err(Error::UnknownAttribute { .. })
        ));
        assert!(matches!(
            compile(InstanceQuery::new("Document").select(Selection::linkto("Name", vec![]))),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            compile(InstanceQuery::new("Company").select(Selection::linkfrom(
                "Position",
                "Document",
                vec![]
            ))),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_root_type_checked() {
        let result = compile(
            InstanceQuery::new("Document").with_instance(Instance::new("Company", 2)),
        );
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_duplicate_alias() {
        let result = compile(
            InstanceQuery::new("Document")
                .select(Selection::attribute("Name").with_alias("x"))
                .select(Selection::instance().with_alias("x")),
        );
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_edge_alias_names_single_leaf() {
        let compiled = compile(
            InstanceQuery::new("Position").select(
                Selection::linkto("Document", vec![Selection::attribute("Name")])
                    .with_alias("doc"),
            ),
        )
        .unwrap();
        assert_eq!(compiled.columns()[0].alias.as_deref(), Some("doc"));
        assert_eq!(compiled.columns()[0].label, "Document.Name");
    }

    #[test]
    fn test_edge_alias_rejected_when_ambiguous() {
        let many_leaves = compile(
            InstanceQuery::new("Position").select(
                Selection::linkto(
                    "Document",
                    vec![Selection::attribute("Name"), Selection::instance()],
                )
                .with_alias("doc"),
            ),
        );
        assert!(matches!(many_leaves, Err(Error::InvalidQuery(_))));

        let both = compile(
            InstanceQuery::new("Position").select(
                Selection::linkto(
                    "Document",
                    vec![Selection::attribute("Name").with_alias("name")],
                )
                .with_alias("doc"),
            ),
        );
        assert!(matches!(both, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_default_budget_allows_deep_chains() {
        let mut selection = Selection::attribute("Qty");
        for _ in 0..6 {
            selection = Selection::linkfrom("Position", "Document", vec![selection]);
            selection = Selection::linkto("Document", vec![selection]);
        }
        let query = InstanceQuery::new("Position").with_ids([1]).select(selection);
        assert_eq!(query.depth(), 12);
        assert!(compile(query).is_ok());
    }

    #[test]
    fn test_depth_budget() {
        let deep = Selection::linkto(
            "Document",
            vec![Selection::linkto("Company", vec![Selection::attribute("Name")])],
        );
        let query = InstanceQuery::new("Position").select(deep);
        let result = CompiledQuery::compile(&catalog(), &query, &QueryBudget::new(1, 10));
        assert!(matches!(result, Err(Error::BudgetExceeded(_))));
        assert!(CompiledQuery::compile(&catalog(), &query, &QueryBudget::new(2, 10)).is_ok());
    }
}
