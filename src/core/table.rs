//! Purpose: Parse delimited table files into immutable column-oriented storage.
//! Exports: `Table`, `Identifier`, `FIELD_DELIM`, `ID_DELIM`, `LINE_DELIM`.
//! Role: Leaf storage layer under the sorted projections and the registry.
//! Invariants: Every column holds exactly `nrows()` values (short rows are padded with empty values).
//! Invariants: Tables never change after parsing; only the projection cache grows.
//! Invariants: A source without a header line yields an empty table, not an error.
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use bstr::{BString, ByteSlice};

use super::error::{Error, ErrorKind};
use super::sorted::{Projection, Sorted};

/// Opaque identifier value; compared byte-wise, never interpreted.
pub type Identifier = BString;

pub const FIELD_DELIM: &str = "\t";
pub const ID_DELIM: &str = ",";
pub const LINE_DELIM: &str = "\n";

#[derive(Debug, Default)]
pub struct Table {
    fields: Vec<BString>,
    index: HashMap<BString, usize>,
    columns: Vec<Vec<Identifier>>,
    nrows: usize,
    sorted: RwLock<HashMap<BString, Arc<Projection>>>,
}

impl Table {
    /// Parses a header line followed by data lines.
    ///
    /// Fields past the header width are dropped and missing trailing fields
    /// read as empty, so ragged input still produces rectangular columns.
    /// A repeated header name resolves to its first column.
    pub fn parse(source: &[u8]) -> Self {
        let mut lines = source.lines();
        let Some(header) = lines.next() else {
            return Self::default();
        };

        let fields: Vec<BString> = header.split_str(FIELD_DELIM).map(BString::from).collect();
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            index.entry(field.clone()).or_insert(i);
        }

        let mut columns: Vec<Vec<Identifier>> = vec![Vec::new(); fields.len()];
        let mut nrows = 0;
        for line in lines {
            let mut tokens = line.split_str(FIELD_DELIM);
            for column in columns.iter_mut() {
                column.push(tokens.next().map(BString::from).unwrap_or_default());
            }
            nrows += 1;
        }

        Self {
            fields,
            index,
            columns,
            nrows,
            sorted: RwLock::default(),
        }
    }

    /// Reads and parses a table file.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read table file")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self::parse(&bytes))
    }

    pub fn fields(&self) -> &[BString] {
        &self.fields
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.fields.len()
    }

    pub fn field_exists(&self, field: &[u8]) -> bool {
        self.index.contains_key(field.as_bstr())
    }

    pub fn column(&self, field: &[u8]) -> Option<&[Identifier]> {
        self.index
            .get(field.as_bstr())
            .map(|&i| self.columns[i].as_slice())
    }

    /// Returns a view of this table ordered by `field`, sorting on first use.
    ///
    /// Projections are cached per field for the lifetime of the table. A field
    /// the table does not have yields an empty, uncached projection.
    pub fn sorted(&self, field: &[u8]) -> Sorted<'_> {
        let cached = self
            .sorted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field.as_bstr())
            .cloned();
        if let Some(projection) = cached {
            return Sorted::new(self, projection);
        }

        let projection = Arc::new(Projection::build(self, field));
        if !self.field_exists(field) {
            return Sorted::new(self, projection);
        }

        // Two racing builders produce equal projections; keep whichever landed first.
        let projection = self
            .sorted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(BString::from(field))
            .or_insert(projection)
            .clone();
        Sorted::new(self, projection)
    }

    pub fn cached_projections(&self) -> usize {
        self.sorted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
