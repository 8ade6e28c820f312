//! The attribute catalog: types, tables and where their attributes live.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::debug;

use super::{AttributeDef, AttributeKind, TableDef, TypeDef};
use crate::error::{Error, Result};

/// A catalog document: every table and type of a schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogDef {
    /// Physical tables.
    #[serde(default)]
    pub tables: Vec<TableDef>,
    /// Logical types, parents before children.
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

#[derive(Default)]
struct CatalogInner {
    tables: HashMap<String, Arc<TableDef>>,
    types: HashMap<String, Arc<TypeDef>>,
    type_names: HashMap<i64, String>,
    attributes: HashMap<(String, String), Arc<AttributeDef>>,
}

/// Static mapping from a type's attribute names to tables, columns and kinds.
///
/// Registration takes a write lock; lookups take a read lock and hand out `Arc`
/// snapshots, so one catalog can serve many evaluations.
#[derive(Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a JSON [`CatalogDef`] document.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: CatalogDef = serde_json::from_str(json)?;
        Self::from_def(def)
    }

    /// Build a catalog from a definition.
    pub fn from_def(def: CatalogDef) -> Result<Self> {
        let catalog = Self::new();
        for table in def.tables {
            catalog.register_table(table)?;
        }
        for ty in def.types {
            catalog.register_type(ty)?;
        }
        Ok(catalog)
    }

    /// Register a physical table.
    pub fn register_table(&self, table: TableDef) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.tables.contains_key(&table.name) {
            return Err(Error::DuplicateDefinition(format!("table {}", table.name)));
        }
        debug!(table = %table.name, "registered table");
        inner.tables.insert(table.name.clone(), Arc::new(table));
        Ok(())
    }

    /// Register a type and its attributes.
    ///
    /// The parent type, the main table and every attribute's table must already
    /// be registered. Attributes with an empty table are stored in the main table.
    pub fn register_type(&self, mut ty: TypeDef) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.types.contains_key(&ty.name) {
            return Err(Error::DuplicateDefinition(format!("type {}", ty.name)));
        }
        if let Some(existing) = inner.type_names.get(&ty.id) {
            return Err(Error::DuplicateDefinition(format!(
                "type id {} (used by {})",
                ty.id, existing
            )));
        }
        if let Some(parent) = &ty.parent {
            if !inner.types.contains_key(parent) {
                return Err(Error::UnknownType(parent.clone()));
            }
        }
        if !inner.tables.contains_key(&ty.main_table) {
            return Err(Error::UnknownTable(ty.main_table.clone()));
        }

        let mut names = std::collections::HashSet::new();
        for attr in &mut ty.attributes {
            if !names.insert(attr.name.clone()) {
                return Err(Error::DuplicateDefinition(format!(
                    "attribute {}.{}",
                    ty.name, attr.name
                )));
            }
            attr.owner = ty.name.clone();
            if attr.table.is_empty() {
                attr.table = ty.main_table.clone();
            }
            let table = inner
                .tables
                .get(&attr.table)
                .ok_or_else(|| Error::UnknownTable(attr.table.clone()))?;
            if attr.is_multi_line() && !table.is_child_table() {
                return Err(Error::InvalidDefinition(format!(
                    "multi-line attribute {}.{} needs a child table, {} has no parent column",
                    ty.name, attr.name, table.name
                )));
            }
            if let AttributeKind::MultiColumn(composer) = &attr.kind {
                if let Some(arity) = composer.arity() {
                    if attr.columns.len() != arity {
                        return Err(Error::InvalidDefinition(format!(
                            "attribute {}.{} needs {} columns, has {}",
                            ty.name,
                            attr.name,
                            arity,
                            attr.columns.len()
                        )));
                    }
                }
            }
        }

        for attr in &ty.attributes {
            inner.attributes.insert(
                (ty.name.clone(), attr.name.clone()),
                Arc::new(attr.clone()),
            );
        }
        debug!(
            type_name = %ty.name,
            type_id = ty.id,
            attributes = ty.attributes.len(),
            "registered type"
        );
        inner.type_names.insert(ty.id, ty.name.clone());
        inner.types.insert(ty.name.clone(), Arc::new(ty));
        Ok(())
    }

    /// Get a type by name.
    pub fn get_type(&self, name: &str) -> Result<Arc<TypeDef>> {
        self.inner
            .read()
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Get a type by its numeric id.
    pub fn type_by_id(&self, id: i64) -> Result<Arc<TypeDef>> {
        let inner = self.inner.read();
        inner
            .type_names
            .get(&id)
            .and_then(|name| inner.types.get(name))
            .cloned()
            .ok_or(Error::UnknownTypeId(id))
    }

    /// Get the name of the type with the given numeric id.
    pub fn type_name_by_id(&self, id: i64) -> Option<String> {
        self.inner.read().type_names.get(&id).cloned()
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Result<Arc<TableDef>> {
        self.inner
            .read()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Get the main table of a type.
    pub fn main_table(&self, type_name: &str) -> Result<Arc<TableDef>> {
        let ty = self.get_type(type_name)?;
        self.get_table(&ty.main_table)
    }

    /// Look up an attribute on a type, walking up the parent chain.
    pub fn get_attribute(&self, type_name: &str, name: &str) -> Result<Arc<AttributeDef>> {
        let inner = self.inner.read();
        let mut current = Some(type_name.to_string());

        while let Some(ty_name) = current {
            let ty = inner
                .types
                .get(&ty_name)
                .ok_or_else(|| Error::UnknownType(ty_name.clone()))?;
            if let Some(attr) = inner.attributes.get(&(ty_name.clone(), name.to_string())) {
                return Ok(attr.clone());
            }
            current = ty.parent.clone();
        }

        Err(Error::UnknownAttribute {
            type_name: type_name.to_string(),
            attribute: name.to_string(),
        })
    }

    /// Check whether `type_name` is `ancestor` or one of its subtypes.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        let inner = self.inner.read();
        let mut current = Some(type_name);

        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = inner.types.get(name).and_then(|t| t.parent.as_deref());
        }
        false
    }

    /// List all type names.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Catalog")
            .field("tables", &inner.tables.len())
            .field("types", &inner.types.len())
            .finish()
    }
}
