//! Joined result cache.
//!
//! Merges the result sets of several table plans into logical rows that share a
//! join key. The first populate creates the rows; later populates write their
//! columns into the matching rows and drop rows whose key is unknown.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::trace;

use crate::dialect::RawResultSet;
use crate::error::{Error, Result};
use instaq_proto::Value;

/// Identity of a cached row: the join key, plus the row's own id in expand mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Join key (own id, or parent id for expand rows).
    pub key: i64,
    /// Row id for expand rows.
    pub sub_key: Option<i64>,
}

impl RowKey {
    /// Key of a plain row.
    pub fn new(key: i64) -> Self {
        Self { key, sub_key: None }
    }

    /// Key of an expand row.
    pub fn with_sub_key(key: i64, sub_key: i64) -> Self {
        Self {
            key,
            sub_key: Some(sub_key),
        }
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sub_key {
            Some(sub) => write!(f, "{}/{}", self.key, sub),
            None => write!(f, "{}", self.key),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRow {
    key: RowKey,
    cells: Vec<Value>,
}

/// In-memory joined rowset with a forward-only cursor.
#[derive(Debug, Clone, Default)]
pub struct JoinedResultCache {
    rows: Vec<CachedRow>,
    index: HashMap<RowKey, usize>,
    by_key: HashMap<i64, Vec<usize>>,
    populated: bool,
    cursor: Option<usize>,
}

impl JoinedResultCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a result set into the cache.
    ///
    /// Column `i` of `rs` lands at joined index `first_index + i`. `key_column`
    /// and `sub_key_column` are joined indices (1-based) inside that window.
    /// Returns the number of incoming rows that were stored.
    pub fn populate(
        &mut self,
        rs: &RawResultSet,
        first_index: usize,
        key_column: usize,
        sub_key_column: Option<usize>,
    ) -> Result<usize> {
        let window = first_index..first_index + rs.width;
        if first_index == 0 || !window.contains(&key_column) {
            return Err(Error::Precondition(format!(
                "key column {} outside result columns {:?}",
                key_column, window
            )));
        }
        if let Some(sub) = sub_key_column {
            if !window.contains(&sub) {
                return Err(Error::Precondition(format!(
                    "sub key column {} outside result columns {:?}",
                    sub, window
                )));
            }
        }

        let first = !self.populated;
        self.populated = true;
        let mut stored = 0;

        for raw in &rs.rows {
            let cell = |column: usize| raw.get(column - first_index).unwrap_or(&Value::Null);
            let Some(key) = key_cell_value(cell(key_column), key_column)? else {
                continue;
            };
            let row_key = match sub_key_column {
                Some(sub) => match key_cell_value(cell(sub), sub)? {
                    Some(sub_key) => RowKey::with_sub_key(key, sub_key),
                    None => continue,
                },
                None => RowKey::new(key),
            };

            let pos = match self.index.get(&row_key) {
                Some(&pos) => pos,
                None if first => {
                    let pos = self.rows.len();
                    self.rows.push(CachedRow {
                        key: row_key,
                        cells: Vec::new(),
                    });
                    self.index.insert(row_key, pos);
                    self.by_key.entry(key).or_default().push(pos);
                    pos
                }
                None => continue,
            };

            let cells = &mut self.rows[pos].cells;
            let end = first_index - 1 + raw.len();
            if cells.len() < end {
                cells.resize(end, Value::Null);
            }
            for (i, value) in raw.iter().enumerate() {
                cells[first_index - 1 + i] = value.clone();
            }
            stored += 1;
        }

        trace!(
            incoming = rs.len(),
            stored,
            first_index,
            first,
            "populated joined cache"
        );
        Ok(stored)
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the cache holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reset the cursor to before the first row.
    pub fn before_first(&mut self) {
        self.cursor = None;
    }

    /// Advance the cursor; returns whether a row is current. The cursor never
    /// moves past the position after the last row.
    pub fn next(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1).min(self.rows.len());
        self.cursor = Some(next);
        next < self.rows.len()
    }

    /// The row under the cursor.
    pub fn current(&self) -> Result<RowView<'_>> {
        match self.cursor {
            Some(pos) if pos < self.rows.len() => Ok(self.view(pos)),
            Some(_) => Err(Error::Precondition("cursor is after the last row".into())),
            None => Err(Error::Precondition("cursor is before the first row".into())),
        }
    }

    /// Read a raw cell of the current row.
    pub fn get_object(&self, column: usize) -> Result<&Value> {
        let view = self.current()?;
        Ok(view.cells.get(column.wrapping_sub(1)).unwrap_or(&Value::Null))
    }

    /// Read a cell of the current row as text.
    pub fn get_string(&self, column: usize) -> Result<Option<String>> {
        self.current()?.get_string(column)
    }

    /// Read a cell of the current row as an integer.
    pub fn get_long(&self, column: usize) -> Result<Option<i64>> {
        self.current()?.get_long(column)
    }

    /// Read a cell of the current row as a real.
    pub fn get_double(&self, column: usize) -> Result<Option<f64>> {
        self.current()?.get_double(column)
    }

    /// Read a cell of the current row as a timestamp.
    ///
    /// Integers are Unix seconds; text is RFC 3339 or SQLite's
    /// `YYYY-MM-DD HH:MM:SS[.fff]`.
    pub fn get_timestamp(&self, column: usize) -> Result<Option<DateTime<Utc>>> {
        self.current()?.get_timestamp(column)
    }

    /// Row at position `pos` in first-seen order.
    pub fn row(&self, pos: usize) -> Option<RowView<'_>> {
        (pos < self.rows.len()).then(|| self.view(pos))
    }

    /// The first row with join key `key`.
    pub fn row_by_key(&self, key: i64) -> Option<RowView<'_>> {
        self.by_key
            .get(&key)
            .and_then(|positions| positions.first())
            .map(|&pos| self.view(pos))
    }

    /// Every row with join key `key`, in first-seen order.
    pub fn rows_by_key(&self, key: i64) -> impl Iterator<Item = RowView<'_>> {
        self.by_key
            .get(&key)
            .into_iter()
            .flatten()
            .map(move |&pos| self.view(pos))
    }

    /// All rows in first-seen order.
    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |pos| self.view(pos))
    }

    /// Distinct join keys in first-seen order.
    pub fn keys(&self) -> Vec<i64> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .map(|r| r.key.key)
            .filter(|k| seen.insert(*k))
            .collect()
    }

    fn view(&self, pos: usize) -> RowView<'_> {
        let row = &self.rows[pos];
        RowView {
            key: row.key,
            cells: &row.cells,
        }
    }
}

fn key_cell_value(cell: &Value, column: usize) -> Result<Option<i64>> {
    match cell {
        Value::Null => Ok(None),
        Value::Int64(i) => Ok(Some(*i)),
        other => Err(Error::Coercion {
            column,
            row_key: "?".into(),
            expected: "integer key",
            found: describe(other),
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string '{}'", s),
        other => other.type_label().to_string(),
    }
}

/// Read-only view of one cached row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    key: RowKey,
    cells: &'a [Value],
}

impl<'a> RowView<'a> {
    /// Row identity.
    pub fn key(&self) -> RowKey {
        self.key
    }

    /// Raw cell by 1-based joined index; absent cells read as `Null`.
    pub fn get_object(&self, column: usize) -> &'a Value {
        self.cells
            .get(column.wrapping_sub(1))
            .unwrap_or(&Value::Null)
    }

    /// Cell as text. Numbers and booleans are formatted.
    pub fn get_string(&self, column: usize) -> Result<Option<String>> {
        match self.get_object(column) {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Int64(i) => Ok(Some(i.to_string())),
            Value::Float64(f) => Ok(Some(f.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            other => Err(self.coercion(column, "string", other)),
        }
    }

    /// Cell as an integer. Reals truncate; numeric text is parsed.
    pub fn get_long(&self, column: usize) -> Result<Option<i64>> {
        match self.get_object(column) {
            Value::Null => Ok(None),
            Value::Int64(i) => Ok(Some(*i)),
            Value::Float64(f) => Ok(Some(*f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                    .map(Some)
                    .ok_or_else(|| self.coercion(column, "integer", self.get_object(column)))
            }
            other => Err(self.coercion(column, "integer", other)),
        }
    }

    /// Cell as a real. Integers widen; numeric text is parsed.
    pub fn get_double(&self, column: usize) -> Result<Option<f64>> {
        match self.get_object(column) {
            Value::Null => Ok(None),
            Value::Float64(f) => Ok(Some(*f)),
            Value::Int64(i) => Ok(Some(*i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.coercion(column, "real", self.get_object(column))),
            other => Err(self.coercion(column, "real", other)),
        }
    }

    /// Cell as a boolean. Integers are true when non-zero.
    pub fn get_bool(&self, column: usize) -> Result<Option<bool>> {
        match self.get_object(column) {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::Int64(i) => Ok(Some(*i != 0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(self.coercion(column, "bool", self.get_object(column))),
            },
            other => Err(self.coercion(column, "bool", other)),
        }
    }

    /// Cell as bytes. Text yields its UTF-8 encoding.
    pub fn get_bytes(&self, column: usize) -> Result<Option<Vec<u8>>> {
        match self.get_object(column) {
            Value::Null => Ok(None),
            Value::Bytes(b) => Ok(Some(b.clone())),
            Value::String(s) => Ok(Some(s.as_bytes().to_vec())),
            other => Err(self.coercion(column, "bytes", other)),
        }
    }

    /// Cell as a timestamp; see [`JoinedResultCache::get_timestamp`].
    pub fn get_timestamp(&self, column: usize) -> Result<Option<DateTime<Utc>>> {
        let value = self.get_object(column);
        let parsed = match value {
            Value::Null => return Ok(None),
            Value::Timestamp(micros) => DateTime::from_timestamp_micros(*micros),
            Value::Int64(secs) => Utc.timestamp_opt(*secs, 0).single(),
            Value::String(s) => parse_timestamp(s.trim()),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| self.coercion(column, "timestamp", value))
    }

    fn coercion(&self, column: usize, expected: &'static str, found: &Value) -> Error {
        Error::Coercion {
            column,
            row_key: self.key.to_string(),
            expected,
            found: describe(found),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
