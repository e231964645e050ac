//! Purpose: Resolve candidate table file paths from a tables file and environment-driven directories.
//! Exports: `TableSources`, `read_tables_file`, `matching_files`, env var names.
//! Role: Configuration collaborator; produces the ordered path list the registry consumes.
//! Invariants: Discovery order is tables file, then directories, then extensions, then file name.
//! Invariants: Unreadable sources are logged and skipped; discovery itself never fails.
//! Invariants: Default extension is `tsv` when `ROSE_TABLES_EXT` is unset or empty.
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use tracing::{error, warn};

use crate::core::error::{Error, ErrorKind};

pub const TABLES_PATH_ENV: &str = "ROSE_TABLES_PATH";
pub const TABLES_EXT_ENV: &str = "ROSE_TABLES_EXT";
pub const DEFAULT_TABLE_EXT: &str = "tsv";

const COMMENT_PREFIX: &str = "#";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableSources {
    pub tables_file: Option<PathBuf>,
    pub dirs: Vec<PathBuf>,
    pub exts: Vec<String>,
}

impl TableSources {
    pub fn from_env(tables_file: Option<PathBuf>) -> Self {
        Self::from_values(
            tables_file,
            env::var_os(TABLES_PATH_ENV),
            env::var_os(TABLES_EXT_ENV),
        )
    }

    /// Builds sources from raw path-list values, as found in the environment.
    pub fn from_values(
        tables_file: Option<PathBuf>,
        dirs: Option<OsString>,
        exts: Option<OsString>,
    ) -> Self {
        let dirs = dirs
            .map(|value| {
                env::split_paths(&value)
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let mut exts: Vec<String> = exts
            .map(|value| {
                env::split_paths(&value)
                    .map(|ext| ext.to_string_lossy().trim_start_matches('.').to_string())
                    .filter(|ext| !ext.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if exts.is_empty() {
            exts.push(DEFAULT_TABLE_EXT.to_string());
        }
        Self {
            tables_file,
            dirs,
            exts,
        }
    }

    /// Candidate table paths in registration order.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(file) = &self.tables_file {
            match read_tables_file(file) {
                Ok(listed) => paths.extend(listed),
                Err(err) => error!(error = %err, "cannot read tables file"),
            }
        }
        for dir in &self.dirs {
            for ext in &self.exts {
                match matching_files(dir, ext) {
                    Ok(found) => paths.extend(found),
                    Err(err) => warn!(error = %err, "cannot scan table directory"),
                }
            }
        }
        paths
    }
}

/// Paths listed one per line; blank and `#` lines are skipped.
pub fn read_tables_file(path: &Path) -> Result<Vec<PathBuf>, Error> {
    let bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read tables file")
            .with_path(path)
            .with_source(err)
    })?;
    Ok(bytes
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with_str(COMMENT_PREFIX))
        .map(|line| PathBuf::from(line.to_str_lossy().into_owned()))
        .collect())
}

/// Entries of `dir` named `*.{ext}`, sorted by file name.
pub fn matching_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
    let suffix = format!(".{ext}");
    let entries = std::fs::read_dir(dir).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read table directory")
            .with_path(dir)
            .with_source(err)
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read table directory entry")
                .with_path(dir)
                .with_source(err)
        })?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name.len() > suffix.len() && file_name.ends_with(&suffix) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_TABLE_EXT, TableSources, matching_files, read_tables_file};
    use std::ffi::OsString;
    use std::path::PathBuf;

    fn touch(path: &std::path::Path) {
        std::fs::write(path, "id\n").expect("write");
    }

    fn join_paths(parts: &[&std::path::Path]) -> OsString {
        std::env::join_paths(parts).expect("join paths")
    }

    #[test]
    fn default_extension_is_tsv() {
        let sources = TableSources::from_values(None, None, None);
        assert!(sources.dirs.is_empty());
        assert_eq!(sources.exts, vec![DEFAULT_TABLE_EXT]);

        let sources = TableSources::from_values(None, None, Some(OsString::new()));
        assert_eq!(sources.exts, vec!["tsv"]);
    }

    #[test]
    fn extensions_accept_path_list_and_leading_dot() {
        let exts = std::env::join_paths(["tsv", ".txt"]).expect("join");
        let sources = TableSources::from_values(None, None, Some(exts));
        assert_eq!(sources.exts, vec!["tsv", "txt"]);
    }

    #[test]
    fn tables_file_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let list = dir.path().join("tables.txt");
        std::fs::write(&list, "# mapping tables\n/data/genes.tsv\n\n  /data/ids.tsv  \r\n").expect("write");
        let paths = read_tables_file(&list).expect("read");
        assert_eq!(
            paths,
            vec![PathBuf::from("/data/genes.tsv"), PathBuf::from("/data/ids.tsv")]
        );
    }

    #[test]
    fn matching_files_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.tsv", "a.tsv", "c.txt", "tsv", "d.tsv.bak"] {
            touch(&dir.path().join(name));
        }
        let found = matching_files(dir.path(), "tsv").expect("scan");
        let names: Vec<String> = found
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tsv", "b.tsv"]);
    }

    #[test]
    fn discover_orders_file_then_dirs_then_exts() {
        let root = tempfile::tempdir().expect("tempdir");
        let one = root.path().join("one");
        let two = root.path().join("two");
        std::fs::create_dir_all(&one).expect("mkdir");
        std::fs::create_dir_all(&two).expect("mkdir");
        touch(&one.join("z.tsv"));
        touch(&one.join("a.txt"));
        touch(&two.join("m.tsv"));
        let list = root.path().join("tables.txt");
        std::fs::write(&list, "/explicit/first.tsv\n").expect("write");

        let sources = TableSources::from_values(
            Some(list),
            Some(join_paths(&[&one, &two, &root.path().join("missing")])),
            Some(std::env::join_paths(["tsv", "txt"]).expect("join")),
        );
        let paths = sources.discover();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/explicit/first.tsv"),
                one.join("z.tsv"),
                one.join("a.txt"),
                two.join("m.tsv"),
            ]
        );
    }

    #[test]
    fn unreadable_tables_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sources = TableSources::from_values(Some(dir.path().join("nope.txt")), None, None);
        assert!(sources.discover().is_empty());
    }
}
