//! Export bundle layout, schema detection and extraction.
//!
//! A HANA export bundle holds `index/<SCHEMA>/<bucket>/<TABLE>/` directories,
//! each with `create.sql`, `table.xml` and `data.csv`.

use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

pub const INDEX_DIR: &str = "index";
pub const DDL_FILE: &str = "create.sql";
pub const METADATA_FILE: &str = "table.xml";
pub const DATA_FILE: &str = "data.csv";

const TABLE_FILES: [&str; 3] = [DDL_FILE, METADATA_FILE, DATA_FILE];

/// One table directory inside the schema tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDir {
    /// Directory name, which is the table name.
    pub name: String,
    pub path: PathBuf,
}

impl TableDir {
    pub fn ddl_path(&self) -> PathBuf {
        self.path.join(DDL_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }
}

/// An extracted bundle with its schema resolved.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    schema: String,
}

impl ArchiveLayout {
    /// Open an extracted bundle, resolving the schema name once.
    pub fn open(root: impl Into<PathBuf>, explicit_schema: Option<&str>) -> Result<Self> {
        let root = root.into();
        let schema = resolve_schema_name(&root, explicit_schema)?;
        Ok(Self { root, schema })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR).join(&self.schema)
    }

    /// All table directories under the schema, sorted by table name.
    pub fn table_dirs(&self) -> Result<Vec<TableDir>> {
        let mut found = Vec::new();
        collect_table_dirs(&self.schema_dir(), &mut found)?;
        found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        Ok(found)
    }
}

fn collect_table_dirs(dir: &Path, found: &mut Vec<TableDir>) -> Result<()> {
    let is_table = TABLE_FILES.iter().any(|f| dir.join(f).is_file());
    if is_table {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            found.push(TableDir {
                name: name.to_string(),
                path: dir.to_path_buf(),
            });
        }
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            collect_table_dirs(&entry.path(), found)?;
        }
    }
    Ok(())
}

/// Resolve the schema name: the explicit name when given, otherwise the sole
/// directory under `index/`.
pub fn resolve_schema_name(root: &Path, explicit: Option<&str>) -> Result<String> {
    let index = root.join(INDEX_DIR);
    if let Some(schema) = explicit {
        if !index.join(schema).is_dir() {
            return Err(MigrateError::archive(
                index.join(schema),
                "schema directory not found",
            ));
        }
        return Ok(schema.to_string());
    }

    if !index.is_dir() {
        return Err(MigrateError::archive(index, "no index directory"));
    }
    let mut schemas = BTreeSet::new();
    for entry in fs::read_dir(&index)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            schemas.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    sole_schema(schemas, &index)
}

/// Detect the schema from the bundle without extracting it.
pub fn detect_schema_from_archive(archive: &Path) -> Result<String> {
    let mut tar = open_archive(archive)?;
    let mut schemas = BTreeSet::new();
    for entry in tar.entries()? {
        let entry = entry?;
        let path = entry.path()?;
        if let Some(schema) = schema_of(&path) {
            schemas.insert(schema);
        }
    }
    sole_schema(schemas, archive)
}

fn sole_schema(schemas: BTreeSet<String>, at: &Path) -> Result<String> {
    let mut iter = schemas.into_iter();
    match (iter.next(), iter.next()) {
        (Some(schema), None) => Ok(schema),
        (None, _) => Err(MigrateError::archive(at, "no schema directory under index/")),
        (Some(first), Some(second)) => {
            let mut all = vec![first, second];
            all.extend(iter);
            Err(MigrateError::archive(
                at,
                format!(
                    "several schemas found ({}); set SCHEMA to pick one",
                    all.join(", ")
                ),
            ))
        }
    }
}

/// `index/<schema>/...` to `<schema>`.
fn schema_of(path: &Path) -> Option<String> {
    let mut parts = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned());
    if parts.next()? != INDEX_DIR {
        return None;
    }
    let schema = parts.next()?;
    // only count entries below the schema directory
    parts.next()?;
    Some(schema)
}

/// What [`extract`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub schema: String,
    /// True when a previous extraction of the same bundle was reused.
    pub cached: bool,
    /// Entries written (0 when cached).
    pub entries: usize,
}

/// Extract the `index/<schema>/` part of a bundle into `dest`.
///
/// A marker file records the bundle's size and modification time; a matching
/// marker skips extraction.
pub fn extract(archive: &Path, dest: &Path, schema: Option<&str>) -> Result<ExtractOutcome> {
    let schema = match schema {
        Some(s) => s.to_string(),
        None => detect_schema_from_archive(archive)?,
    };

    let stamp = archive_stamp(archive)?;
    let marker = dest.join(format!(".extracted-{}", schema));
    if fs::read_to_string(&marker).ok().as_deref() == Some(stamp.as_str())
        && dest.join(INDEX_DIR).join(&schema).is_dir()
    {
        info!("Reusing extracted bundle in {}", dest.display());
        return Ok(ExtractOutcome {
            schema,
            cached: true,
            entries: 0,
        });
    }

    info!("Extracting {} (schema {})", archive.display(), schema);
    fs::create_dir_all(dest)?;
    let mut tar = open_archive(archive)?;
    let mut entries = 0;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        if schema_of(&path).as_deref() != Some(schema.as_str()) {
            continue;
        }
        if entry.unpack_in(dest)? {
            entries += 1;
        } else {
            debug!("Skipped unsafe entry {}", path.display());
        }
    }

    if entries == 0 {
        return Err(MigrateError::archive(
            archive,
            format!("no entries under index/{}/", schema),
        ));
    }

    fs::write(&marker, &stamp)?;
    info!("Extracted {} entries", entries);
    Ok(ExtractOutcome {
        schema,
        cached: false,
        entries,
    })
}

fn open_archive(archive: &Path) -> Result<tar::Archive<GzDecoder<File>>> {
    let file = File::open(archive)
        .map_err(|e| MigrateError::archive(archive, format!("cannot open bundle: {}", e)))?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn archive_stamp(archive: &Path) -> Result<String> {
    let meta = fs::metadata(archive)
        .map_err(|e| MigrateError::archive(archive, format!("cannot open bundle: {}", e)))?;
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(format!("{} {}", meta.len(), modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_bundle(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_resolve_sole_schema() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("index/SHOP/OR/ORDERS")).unwrap();
        assert_eq!(resolve_schema_name(dir.path(), None).unwrap(), "SHOP");
        assert!(resolve_schema_name(dir.path(), Some("OTHER")).is_err());

        fs::create_dir_all(dir.path().join("index/HR")).unwrap();
        let err = resolve_schema_name(dir.path(), None).unwrap_err();
        assert!(err.to_string().contains("HR, SHOP"));
        assert_eq!(resolve_schema_name(dir.path(), Some("HR")).unwrap(), "HR");
    }

    #[test]
    fn test_table_dirs_sorted_at_any_depth() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("index/SHOP");
        for (bucket, table) in [("OR", "ORDERS"), ("CU", "CUSTOMERS"), ("IT", "ITEMS")] {
            let t = schema.join(bucket).join(table);
            fs::create_dir_all(&t).unwrap();
            fs::write(t.join(DDL_FILE), "").unwrap();
        }
        fs::create_dir_all(schema.join("EMPTY/NOTHING")).unwrap();

        let layout = ArchiveLayout::open(dir.path(), None).unwrap();
        let names: Vec<_> = layout
            .table_dirs()
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["CUSTOMERS", "ITEMS", "ORDERS"]);
    }

    #[test]
    fn test_extract_only_schema_and_cache() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("export.tar.gz");
        write_bundle(
            &bundle,
            &[
                ("index/SHOP/OR/ORDERS/create.sql", "CREATE TABLE ORDERS (ID INTEGER)"),
                ("index/SHOP/OR/ORDERS/data.csv", "1\n"),
                ("export/other.txt", "ignored"),
            ],
        );
        let dest = dir.path().join("extract");

        assert_eq!(detect_schema_from_archive(&bundle).unwrap(), "SHOP");

        let first = extract(&bundle, &dest, None).unwrap();
        assert_eq!(first.schema, "SHOP");
        assert!(!first.cached);
        assert_eq!(first.entries, 2);
        assert!(dest.join("index/SHOP/OR/ORDERS/create.sql").is_file());
        assert!(!dest.join("export/other.txt").exists());

        let second = extract(&bundle, &dest, Some("SHOP")).unwrap();
        assert!(second.cached);
    }

    #[test]
    fn test_extract_missing_bundle() {
        let dir = TempDir::new().unwrap();
        let err = extract(&dir.path().join("nope.tar.gz"), dir.path(), Some("S")).unwrap_err();
        assert!(matches!(err, MigrateError::Archive { .. }));
    }
}
