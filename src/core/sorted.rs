//! Purpose: Sorted row projections over a table and the identifier mapping built on them.
//! Exports: `Projection`, `Sorted`.
//! Role: Turns a table column into a binary-searchable index; implements `map`.
//! Invariants: Projection rows are ordered by byte-wise comparison of the projected field.
//! Invariants: Ties keep file order, so multi-match results follow the table's row order.
//! Invariants: `map` returns exactly one output per query, in query order.
use std::sync::Arc;

use bstr::{BStr, BString, ByteSlice, ByteVec};

use super::table::{ID_DELIM, Identifier, Table};

/// Row permutation of a table ordered by one field.
#[derive(Debug)]
pub struct Projection {
    field: BString,
    rows: Vec<usize>,
}

impl Projection {
    pub(crate) fn build(table: &Table, field: &[u8]) -> Self {
        let rows = match table.column(field) {
            Some(column) => {
                let mut rows: Vec<usize> = (0..column.len()).collect();
                rows.sort_by(|&a, &b| column[a].cmp(&column[b]));
                rows
            }
            None => Vec::new(),
        };
        Self {
            field: BString::from(field),
            rows,
        }
    }
}

/// A projection bound to the table it was built from.
///
/// The table is borrowed, never owned: dropping a table from the registry
/// drops its projections with it.
#[derive(Clone, Debug)]
pub struct Sorted<'a> {
    table: &'a Table,
    projection: Arc<Projection>,
}

impl<'a> Sorted<'a> {
    pub(crate) fn new(table: &'a Table, projection: Arc<Projection>) -> Self {
        Self { table, projection }
    }

    pub fn field(&self) -> &BStr {
        self.projection.field.as_bstr()
    }

    pub fn rows(&self) -> &[usize] {
        &self.projection.rows
    }

    pub fn len(&self) -> usize {
        self.projection.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.rows.is_empty()
    }

    pub fn field_exists(&self, field: &[u8]) -> bool {
        self.table.field_exists(field)
    }

    /// Value of `field` at sorted position `i`.
    pub fn at(&self, i: usize, field: &[u8]) -> Option<&'a BStr> {
        let row = *self.projection.rows.get(i)?;
        self.table
            .column(field)
            .and_then(|column| column.get(row))
            .map(|value| value.as_bstr())
    }

    /// Values of `field` in sorted order.
    pub fn values(&self, field: &[u8]) -> Vec<&'a BStr> {
        match self.table.column(field) {
            Some(column) => self
                .projection
                .rows
                .iter()
                .map(|&row| column[row].as_bstr())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Converts each query from the projected field into `dest` values.
    ///
    /// All non-empty destination values of the matching rows are joined with
    /// `ID_DELIM`. A query without a match, or whose matches are all empty,
    /// maps to the empty identifier, as does every query when `dest` is not
    /// a field of the table.
    pub fn map<Q: AsRef<[u8]>>(&self, queries: &[Q], dest: &[u8]) -> Vec<Identifier> {
        let (Some(src), Some(dst)) = (
            self.table.column(&self.projection.field),
            self.table.column(dest),
        ) else {
            return vec![Identifier::default(); queries.len()];
        };
        let rows = &self.projection.rows;

        queries
            .iter()
            .map(|query| {
                let query = query.as_ref();
                let start = rows.partition_point(|&row| src[row].as_slice() < query);
                let mut id = Identifier::default();
                for &row in rows[start..]
                    .iter()
                    .take_while(|&&row| src[row].as_slice() == query)
                {
                    let value = &dst[row];
                    if value.is_empty() {
                        continue;
                    }
                    if !id.is_empty() {
                        id.push_str(ID_DELIM);
                    }
                    id.push_str(value);
                }
                id
            })
            .collect()
    }
}
