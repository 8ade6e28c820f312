//! Physical table and logical type definitions.

use serde::{Deserialize, Serialize};

use super::attribute::AttributeDef;

/// A physical SQL table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Identifier column.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Column holding the numeric type id of each row, for tables shared by
    /// several types.
    #[serde(default)]
    pub type_column: Option<String>,
    /// Column linking each row to its owner, for child tables.
    #[serde(default)]
    pub parent_column: Option<String>,
}

fn default_id_column() -> String {
    "ID".to_string()
}

impl TableDef {
    /// Create a table definition.
    pub fn new(name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_column: id_column.into(),
            type_column: None,
            parent_column: None,
        }
    }

    /// Set the type-id column.
    pub fn with_type_column(mut self, column: impl Into<String>) -> Self {
        self.type_column = Some(column.into());
        self
    }

    /// Set the parent column, making this a child table.
    pub fn with_parent_column(mut self, column: impl Into<String>) -> Self {
        self.parent_column = Some(column.into());
        self
    }

    /// Check if this is a child table.
    pub fn is_child_table(&self) -> bool {
        self.parent_column.is_some()
    }
}

/// A logical type mapped onto one or more tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Type name (unique within the catalog).
    pub name: String,
    /// Numeric type id, as stored in type-id columns.
    pub id: i64,
    /// Parent type whose attributes this type inherits.
    #[serde(default)]
    pub parent: Option<String>,
    /// Table holding one row per instance.
    pub main_table: String,
    /// Attributes declared on this type.
    #[serde(default)]
    pub attributes: Vec<AttributeDef>,
}

impl TypeDef {
    /// Create a type definition.
    pub fn new(name: impl Into<String>, id: i64, main_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            parent: None,
            main_table: main_table.into(),
            attributes: Vec::new(),
        }
    }

    /// Set the parent type.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = AttributeDef>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Get a declared (not inherited) attribute by name.
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScalarType;

    #[test]
    fn test_table_defaults_from_json() {
        let table: TableDef = serde_json::from_str(r#"{ "name": "T_DOC" }"#).unwrap();
        assert_eq!(table.id_column, "ID");
        assert!(table.type_column.is_none());
        assert!(!table.is_child_table());
    }

    #[test]
    fn test_type_builder() {
        let ty = TypeDef::new("Invoice", 12, "T_DOC")
            .with_parent("Document")
            .with_attribute(AttributeDef::scalar(
                "Total",
                "T_INVOICE",
                "TOTAL",
                ScalarType::Real,
            ));
        assert_eq!(ty.parent.as_deref(), Some("Document"));
        assert!(ty.get_attribute("Total").is_some());
        assert!(ty.get_attribute("Name").is_none());
    }
}
