//! Attribute-kind aware conversion of cached cells into values.

use chrono::{DateTime, Utc};

use super::cache::RowView;
use crate::catalog::{AttributeDef, AttributeKind, Catalog, Composer, ScalarType};
use crate::error::{Error, Result};
use instaq_proto::{Instance, Value};

/// Reads attribute values from a joined row.
#[derive(Clone, Copy)]
pub struct AttributeValueReader<'a> {
    catalog: &'a Catalog,
}

impl<'a> AttributeValueReader<'a> {
    /// Create a reader resolving per-row link types through `catalog`.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Read `attr` from `row`, given the joined indices of its columns.
    pub fn read(&self, attr: &AttributeDef, indices: &[usize], row: &RowView<'_>) -> Result<Value> {
        let first = *indices
            .first()
            .ok_or_else(|| Error::NoColumns(attr.qualified_name()))?;

        match &attr.kind {
            AttributeKind::Scalar(scalar) => read_scalar(*scalar, row, first),
            AttributeKind::Link { .. } => Ok(self
                .read_link(attr, indices, row)?
                .map(Value::Instance)
                .unwrap_or(Value::Null)),
            AttributeKind::MultiColumn(composer) => compose(composer, row, indices),
            AttributeKind::MultiLine(_) => Err(Error::InvalidQuery(format!(
                "multi-line attribute {} has no single-row value",
                attr.qualified_name()
            ))),
        }
    }

    /// Read the instance a link attribute points at, `None` for a null link.
    ///
    /// With a second (type-id) column the instance is typed per row; otherwise
    /// it takes the link's static target type.
    pub fn read_link(
        &self,
        attr: &AttributeDef,
        indices: &[usize],
        row: &RowView<'_>,
    ) -> Result<Option<Instance>> {
        let target = attr.link_target().ok_or_else(|| {
            Error::InvalidQuery(format!("{} is not a link attribute", attr.qualified_name()))
        })?;
        let Some(&id_column) = indices.first() else {
            return Err(Error::NoColumns(attr.qualified_name()));
        };
        let Some(id) = row.get_long(id_column)? else {
            return Ok(None);
        };

        let type_name = match indices.get(1) {
            Some(&type_column) => match row.get_long(type_column)? {
                Some(type_id) => self.type_name(type_id)?,
                None => target.to_string(),
            },
            None => target.to_string(),
        };
        Ok(Some(Instance::new(type_name, id)))
    }

    /// Name of the type with `type_id`.
    pub fn type_name(&self, type_id: i64) -> Result<String> {
        self.catalog
            .type_name_by_id(type_id)
            .ok_or(Error::UnknownTypeId(type_id))
    }
}

/// Read one column as `scalar`.
pub fn read_scalar(scalar: ScalarType, row: &RowView<'_>, column: usize) -> Result<Value> {
    Ok(match scalar {
        ScalarType::Bool => row.get_bool(column)?.into(),
        ScalarType::Integer => row.get_long(column)?.into(),
        ScalarType::Real => row.get_double(column)?.into(),
        ScalarType::Text => row.get_string(column)?.into(),
        ScalarType::Bytes => row.get_bytes(column)?.into(),
        ScalarType::Timestamp => row
            .get_timestamp(column)?
            .map(|ts: DateTime<Utc>| Value::Timestamp(ts.timestamp_micros()))
            .unwrap_or(Value::Null),
    })
}

/// Combine the columns of a multi-column attribute.
pub fn compose(composer: &Composer, row: &RowView<'_>, indices: &[usize]) -> Result<Value> {
    match composer {
        Composer::Rate => {
            let (Some(num), Some(den)) = (indices.first(), indices.get(1)) else {
                return Err(Error::InvalidQuery("rate needs two columns".into()));
            };
            match (row.get_double(*num)?, row.get_double(*den)?) {
                (Some(n), Some(d)) if d != 0.0 => Ok(Value::Float64(n / d)),
                _ => Ok(Value::Null),
            }
        }
        Composer::Range => {
            let (Some(from), Some(to)) = (indices.first(), indices.get(1)) else {
                return Err(Error::InvalidQuery("range needs two columns".into()));
            };
            let from = row.get_object(*from).clone();
            let to = row.get_object(*to).clone();
            if from.is_null() && to.is_null() {
                Ok(Value::Null)
            } else {
                Ok(Value::List(vec![from, to]))
            }
        }
        Composer::Concat { separator } => {
            let parts = indices
                .iter()
                .filter_map(|&idx| row.get_string(idx).transpose())
                .collect::<Result<Vec<String>>>()?;
            if parts.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::String(parts.join(separator)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{TableDef, TypeDef};
    use crate::dialect::RawResultSet;
    use crate::query::cache::JoinedResultCache;

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        catalog.register_table(TableDef::new("T_PERSON", "ID")).unwrap();
        catalog
            .register_type(TypeDef::new("Person", 1, "T_PERSON"))
            .unwrap();
        catalog
            .register_type(TypeDef::new("Employee", 2, "T_PERSON").with_parent("Person"))
            .unwrap();
        catalog
    }

    fn cache(cells: Vec<Value>) -> JoinedResultCache {
        let mut cache = JoinedResultCache::new();
        let rs = RawResultSet::new(cells.len(), vec![cells]);
        cache.populate(&rs, 1, 1, None).unwrap();
        cache
    }

    #[test]
    fn test_scalar_kinds() {
        let cache = cache(vec![
            Value::Int64(1),
            Value::Int64(1),
            Value::from("12.5"),
            Value::Int64(0),
        ]);
        let row = cache.row(0).unwrap();
        assert_eq!(read_scalar(ScalarType::Bool, &row, 2).unwrap(), Value::Bool(true));
        assert_eq!(read_scalar(ScalarType::Real, &row, 3).unwrap(), Value::Float64(12.5));
        assert_eq!(read_scalar(ScalarType::Text, &row, 4).unwrap(), Value::from("0"));
        assert_eq!(
            read_scalar(ScalarType::Timestamp, &row, 4).unwrap(),
            Value::Timestamp(0)
        );
        assert_eq!(read_scalar(ScalarType::Integer, &row, 9).unwrap(), Value::Null);
    }

    #[test]
    fn test_link_static_and_typed() {
        let catalog = catalog();
        let reader = AttributeValueReader::new(&catalog);
        let cache = cache(vec![
            Value::Int64(114),
            Value::Int64(115),
            Value::Int64(2),
            Value::Null,
        ]);
        let row = cache.row(0).unwrap();

        let manager = AttributeDef::link("Manager", "T_PERSON", "MGR", "Person");
        assert_eq!(
            reader.read(&manager, &[2], &row).unwrap(),
            Value::Instance(Instance::new("Person", 115))
        );
        assert_eq!(
            reader.read_link(&manager, &[2, 3], &row).unwrap(),
            Some(Instance::new("Employee", 115))
        );
        assert_eq!(reader.read(&manager, &[4], &row).unwrap(), Value::Null);

        let unknown = cache_with_type(99);
        let row = unknown.row(0).unwrap();
        assert!(matches!(
            reader.read_link(&manager, &[2, 3], &row),
            Err(Error::UnknownTypeId(99))
        ));
    }

    fn cache_with_type(type_id: i64) -> JoinedResultCache {
        cache(vec![Value::Int64(1), Value::Int64(5), Value::Int64(type_id)])
    }

    #[test]
    fn test_compose_rate_range_concat() {
        let cache = cache(vec![
            Value::Int64(1),
            Value::Int64(3),
            Value::Int64(4),
            Value::Int64(0),
            Value::from("Ada"),
            Value::Null,
            Value::from("Lovelace"),
        ]);
        let row = cache.row(0).unwrap();

        assert_eq!(
            compose(&Composer::Rate, &row, &[2, 3]).unwrap(),
            Value::Float64(0.75)
        );
        assert_eq!(compose(&Composer::Rate, &row, &[2, 4]).unwrap(), Value::Null);
        assert_eq!(
            compose(&Composer::Range, &row, &[2, 3]).unwrap(),
            Value::List(vec![Value::Int64(3), Value::Int64(4)])
        );
        assert_eq!(compose(&Composer::Range, &row, &[6, 9]).unwrap(), Value::Null);
        assert_eq!(
            compose(
                &Composer::Concat {
                    separator: " ".into()
                },
                &row,
                &[5, 6, 7]
            )
            .unwrap(),
            Value::from("Ada Lovelace")
        );
    }

    #[test]
    fn test_multi_line_has_no_row_value() {
        let catalog = catalog();
        let reader = AttributeValueReader::new(&catalog);
        let cache = cache(vec![Value::Int64(1)]);
        let attr = AttributeDef::multi_line("Tags", "T_TAG", "TAG", ScalarType::Text);
        assert!(matches!(
            reader.read(&attr, &[1], &cache.row(0).unwrap()),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_coercion_error_propagates() {
        let catalog = catalog();
        let reader = AttributeValueReader::new(&catalog);
        let cache = cache(vec![Value::Int64(1), Value::from("n/a")]);
        let attr = AttributeDef::scalar("Age", "T_PERSON", "AGE", ScalarType::Integer);
        assert!(matches!(
            reader.read(&attr, &[2], &cache.row(0).unwrap()),
            Err(Error::Coercion { column: 2, .. })
        ));
    }
}
