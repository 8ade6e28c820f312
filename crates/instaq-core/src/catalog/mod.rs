//! Attribute catalog.
//!
//! Maps every attribute of a logical type to the physical table and columns that
//! store it, and to the kind of value those columns hold.

mod attribute;
#[allow(clippy::module_inception)]
mod catalog;
mod table;

pub use attribute::{AttributeDef, AttributeKind, Composer, ScalarType};
pub use catalog::{Catalog, CatalogDef};
pub use table::{TableDef, TypeDef};
