//! Purpose: Process-wide catalogue of table names, their files, and the loaded tables.
//! Exports: `Registry`, `table_name`.
//! Role: Owns table lifecycle (load/unload/reload) behind one server context value.
//! Invariants: Table names are unique; the first registered path for a name wins.
//! Invariants: Paths are fixed after startup; only the loaded-table slots change.
//! Invariants: Readers clone an `Arc<Table>` snapshot; writers install or remove whole tables.
//! Invariants: Bulk operations attempt every table and report one aggregate failure.
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{error, info, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Identifier, Table};

/// Table name for a file path: the file name without its final extension.
pub fn table_name(path: &Path) -> String {
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    paths: BTreeMap<String, PathBuf>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `path` as the source of table `name`.
    pub fn register_path(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<(), Error> {
        let name = name.into();
        let path = path.into();
        if let Some(existing) = self.paths.get(&name) {
            return Err(Error::new(ErrorKind::NameConflict)
                .with_message(format!(
                    "table name already registered for {}",
                    existing.display()
                ))
                .with_table(name)
                .with_path(path));
        }
        let metadata = std::fs::metadata(&path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("path is not found or not accessible")
                .with_table(name.clone())
                .with_path(&path)
                .with_source(err)
        })?;
        if !metadata.is_file() {
            return Err(Error::new(ErrorKind::Io)
                .with_message("not a regular file")
                .with_table(name)
                .with_path(path));
        }
        self.paths.insert(name, path);
        Ok(())
    }

    /// Registers each path under its derived name, in order.
    ///
    /// Rejections are logged and returned; they never stop the remaining paths.
    pub fn register_paths<I, P>(&mut self, paths: I) -> Vec<(PathBuf, Error)>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut rejected = Vec::new();
        for path in paths {
            let path = path.into();
            let name = table_name(&path);
            match self.register_path(&name, &path) {
                Ok(()) => info!(table = %name, path = %path.display(), "registered table path"),
                Err(err) => {
                    match err.kind() {
                        ErrorKind::NameConflict => warn!(error = %err, "table name conflict"),
                        _ => error!(error = %err, "cannot register table path"),
                    }
                    rejected.push((path, err));
                }
            }
        }
        rejected
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Registered table names in ascending order, loaded or not.
    pub fn list(&self) -> Vec<String> {
        self.paths.keys().cloned().collect()
    }

    /// Names of the currently loaded tables in ascending order.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_tables().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn loaded(&self, name: &str) -> Option<Arc<Table>> {
        self.read_tables().get(name).cloned()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read_tables().contains_key(name)
    }

    /// Loads `name` unless it is already loaded, returning the installed table.
    pub fn load(&self, name: &str) -> Result<Arc<Table>, Error> {
        if let Some(table) = self.loaded(name) {
            return Ok(table);
        }
        let table = Arc::new(self.open(name)?);

        let mut tables = self.write_tables();
        if let Some(existing) = tables.get(name) {
            return Ok(Arc::clone(existing));
        }
        tables.insert(name.to_string(), Arc::clone(&table));
        info!(table = %name, rows = table.nrows(), fields = table.ncols(), "loaded table");
        Ok(table)
    }

    pub fn unload(&self, name: &str) -> Result<(), Error> {
        match self.write_tables().remove(name) {
            Some(_) => {
                info!(table = %name, "unloaded table");
                Ok(())
            }
            None => {
                let err = Error::new(ErrorKind::NotLoaded)
                    .with_message("table is not loaded")
                    .with_table(name);
                warn!(error = %err, "cannot unload table");
                Err(err)
            }
        }
    }

    /// Replaces `name` with a fresh read of its file.
    ///
    /// The new table is swapped in under one write lock, so concurrent readers
    /// see either the old or the new table. If the file can no longer be read
    /// the table ends up unloaded.
    pub fn reload(&self, name: &str) -> Result<Arc<Table>, Error> {
        match self.open(name) {
            Ok(table) => {
                let table = Arc::new(table);
                self.write_tables()
                    .insert(name.to_string(), Arc::clone(&table));
                info!(table = %name, rows = table.nrows(), fields = table.ncols(), "reloaded table");
                Ok(table)
            }
            Err(err) => {
                self.write_tables().remove(name);
                Err(err)
            }
        }
    }

    pub fn load_all(&self) -> Result<(), Error> {
        let names = self.list();
        aggregate("load", &names, |name| self.load(name).map(|_| ()))
    }

    pub fn unload_all(&self) -> Result<(), Error> {
        let names = self.loaded_names();
        aggregate("unload", &names, |name| self.unload(name))
    }

    pub fn reload_all(&self) -> Result<(), Error> {
        let names = self.list();
        aggregate("reload", &names, |name| self.reload(name).map(|_| ()))
    }

    /// Maps `queries` from `src` to `dest` through table `name`, loading it first if needed.
    pub fn map_identifiers<Q: AsRef<[u8]>>(
        &self,
        name: &str,
        src: &[u8],
        dest: &[u8],
        queries: &[Q],
    ) -> Result<Vec<Identifier>, Error> {
        let table = self.load(name)?;
        Ok(table.sorted(src).map(queries, dest))
    }

    fn open(&self, name: &str) -> Result<Table, Error> {
        let Some(path) = self.paths.get(name) else {
            let err = Error::new(ErrorKind::UnknownTable)
                .with_message("path to table is unknown")
                .with_table(name);
            error!(error = %err, "cannot load table");
            return Err(err);
        };
        Table::open(path).map_err(|err| {
            let err = err.with_table(name);
            error!(error = %err, "cannot load table");
            err
        })
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Table>>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Table>>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn aggregate<F>(action: &str, names: &[String], mut op: F) -> Result<(), Error>
where
    F: FnMut(&str) -> Result<(), Error>,
{
    let mut failed: Option<(usize, ErrorKind)> = None;
    for name in names {
        if let Err(err) = op(name) {
            let (count, _) = failed.get_or_insert((0, err.kind()));
            *count += 1;
        }
    }
    match failed {
        None => Ok(()),
        Some((count, kind)) => Err(Error::new(kind).with_message(format!(
            "failed to {action} {count} of {} tables",
            names.len()
        ))),
    }
}
