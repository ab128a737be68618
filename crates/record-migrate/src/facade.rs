//! Multi-entity export and import through directories and files.
//!
//! Each entity lives in `<dir>/<entity>.<serializer>`. Entities are always
//! processed with relation targets first, so natural foreign keys of a
//! dependent entity resolve against records imported moments before.
//!
//! A directory can also travel as one text file of sections, each opened by
//! a header block:
//!
//! ```text
//!
//! --
//! -- Name: blog; Type: ENTITY; Serializer: csv
//! --
//!
//! ```
//!
//! The `*_compressed_file` variants gzip that file, and the `*_entity_file`
//! functions move a single entity through a path named
//! `<entity>.<serializer>[.gz]`.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::{ImportOptions, MigrationOptions};
use crate::core::Catalog;
use crate::error::{MigrateError, Result};
use crate::orchestrator::Migration;
use crate::plans::ImportStats;
use crate::serializers::Source;
use crate::store::RecordStore;

/// Section type of entity data in a joined file.
const ENTITY_SECTION: &str = "ENTITY";

/// Order `entities` so that relation targets come before their dependents.
///
/// Relations leaving the set are ignored. Ties keep the given order.
pub fn sort_dependencies(store: &dyn RecordStore, entities: &[String]) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| (e.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; entities.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
    for (i, entity) in entities.iter().enumerate() {
        let schema = store.schema(entity)?;
        for target in schema.dependencies() {
            if let Some(&t) = index.get(target) {
                if t != i && !dependents[t].contains(&i) {
                    dependents[t].push(i);
                    in_degree[i] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..entities.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(entities.len());
    while let Some(i) = queue.pop_front() {
        sorted.push(entities[i].clone());
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if sorted.len() != entities.len() {
        let unresolved: Vec<&str> = entities
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, e)| e.as_str())
            .collect();
        return Err(MigrateError::Config(format!(
            "Circular relations between entities: {}",
            unresolved.join(", ")
        )));
    }
    Ok(sorted)
}

/// Export every entity of `entities` into `dir`, returning rows written per
/// entity in processing order.
pub fn export_directory(
    store: &dyn RecordStore,
    catalog: Arc<Catalog>,
    entities: &[String],
    dir: &Path,
    serializer: &str,
    options: &MigrationOptions,
) -> Result<Vec<(String, u64)>> {
    let format = catalog.require_serializer(serializer)?;
    let ordered = sort_dependencies(store, entities)?;
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(ordered.len());
    for entity in ordered {
        let migration =
            Migration::for_entity(store, &entity, options)?.with_catalog(catalog.clone());
        let path = dir.join(format!("{}.{}", entity, format.name()));
        let mut writer = BufWriter::new(File::create(&path)?);
        let rows = migration.export_with(store, &mut writer, format.as_ref())?;
        writer.flush()?;

        debug!("{}: wrote {}", entity, path.display());
        written.push((entity, rows));
    }

    info!(
        "Exported {} entities to {}",
        written.len(),
        dir.display()
    );
    Ok(written)
}

/// Import every `<entity>.<serializer>` file of `dir` whose entity the store
/// knows and whose extension names a registered serializer.
///
/// Each entity is imported by its own [`Migration::import_data`] call, so a
/// failure leaves the entities imported before it in place.
pub fn import_directory(
    store: &mut dyn RecordStore,
    catalog: Arc<Catalog>,
    dir: &Path,
    migration_options: &MigrationOptions,
    options: &ImportOptions,
) -> Result<Vec<(String, ImportStats)>> {
    let mut files: HashMap<String, (String, PathBuf)> = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let (Some(entity), Some(format)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        if !catalog.has_serializer(format) || store.schema(entity).is_err() {
            debug!("Skipping {}", path.display());
            continue;
        }
        if let Some((other, _)) = files.get(entity) {
            return Err(MigrateError::Config(format!(
                "{}: found both .{} and .{} files",
                entity, other, format
            )));
        }
        files.insert(entity.to_string(), (format.to_string(), path.clone()));
    }

    let mut entities: Vec<String> = files.keys().cloned().collect();
    entities.sort();
    let ordered = sort_dependencies(&*store, &entities)?;

    let mut imported = Vec::with_capacity(ordered.len());
    for entity in ordered {
        let Some((format, path)) = files.remove(&entity) else {
            continue;
        };
        let migration = Migration::for_entity(&*store, &entity, migration_options)?
            .with_catalog(catalog.clone());
        let options = options.clone().with_serializer(format);
        let stats = migration.import_data(store, File::open(&path)?, &options)?;
        imported.push((entity, stats));
    }

    info!(
        "Imported {} entities from {}",
        imported.len(),
        dir.display()
    );
    Ok(imported)
}

/// Export `entities` into one stream of sections, returning rows written per
/// entity in processing order.
pub fn export_file(
    store: &dyn RecordStore,
    catalog: Arc<Catalog>,
    entities: &[String],
    writer: &mut dyn Write,
    serializer: &str,
    options: &MigrationOptions,
) -> Result<Vec<(String, u64)>> {
    let format = catalog.require_serializer(serializer)?;
    let staging = staging_dir("export_")?;
    let written = export_directory(
        store,
        catalog.clone(),
        entities,
        staging.path(),
        serializer,
        options,
    )?;

    for (entity, _) in &written {
        let path = staging.path().join(format!("{}.{}", entity, format.name()));
        writer.write_all(section_header(entity, format.name()).as_bytes())?;
        io::copy(&mut File::open(&path)?, &mut *writer)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    remove_staging_dir(staging);
    Ok(written)
}

/// Import every entity section of a stream written by [`export_file`].
///
/// Sections of other types, of unknown entities or of unregistered
/// serializers are skipped. A stream without any section header is a
/// serialization error.
pub fn import_file(
    store: &mut dyn RecordStore,
    catalog: Arc<Catalog>,
    reader: &mut dyn Read,
    migration_options: &MigrationOptions,
    options: &ImportOptions,
) -> Result<Vec<(String, ImportStats)>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let sections = split_sections(&text)?;

    let staging = staging_dir("import_")?;
    for section in &sections {
        if section.kind != ENTITY_SECTION {
            debug!("Skipping {} section {}", section.kind, section.entity);
            continue;
        }
        let path = staging
            .path()
            .join(format!("{}.{}", section.entity, section.serializer));
        fs::write(path, section.content)?;
    }

    let imported = import_directory(store, catalog, staging.path(), migration_options, options)?;
    remove_staging_dir(staging);
    Ok(imported)
}

/// [`export_file`] through a gzip encoder.
pub fn export_compressed_file(
    store: &dyn RecordStore,
    catalog: Arc<Catalog>,
    entities: &[String],
    writer: &mut dyn Write,
    serializer: &str,
    options: &MigrationOptions,
) -> Result<Vec<(String, u64)>> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    let written = export_file(store, catalog, entities, &mut encoder, serializer, options)?;
    encoder.finish()?;
    Ok(written)
}

/// [`import_file`] through a gzip decoder.
pub fn import_compressed_file(
    store: &mut dyn RecordStore,
    catalog: Arc<Catalog>,
    reader: &mut dyn Read,
    migration_options: &MigrationOptions,
    options: &ImportOptions,
) -> Result<Vec<(String, ImportStats)>> {
    let mut decoder = GzDecoder::new(reader);
    import_file(store, catalog, &mut decoder, migration_options, options)
}

/// Export the entity named by `path` with the serializer named by its
/// extension; a trailing `.gz` compresses the output.
pub fn export_entity_file(
    store: &dyn RecordStore,
    catalog: Arc<Catalog>,
    path: &Path,
    options: &MigrationOptions,
) -> Result<u64> {
    let target = EntityFile::parse(path)?;
    let format = catalog.require_serializer(&target.serializer)?;
    let migration = Migration::for_entity(store, &target.entity, options)?.with_catalog(catalog);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = BufWriter::new(File::create(path)?);
    let rows = if target.compressed {
        let mut encoder = GzEncoder::new(file, Compression::default());
        let rows = migration.export_with(store, &mut encoder, format.as_ref())?;
        encoder.finish()?.flush()?;
        rows
    } else {
        let mut file = file;
        let rows = migration.export_with(store, &mut file, format.as_ref())?;
        file.flush()?;
        rows
    };

    debug!("{}: wrote {}", target.entity, path.display());
    Ok(rows)
}

/// Import the entity named by `path` with the serializer named by its
/// extension; a trailing `.gz` is decompressed first.
pub fn import_entity_file(
    store: &mut dyn RecordStore,
    catalog: Arc<Catalog>,
    path: &Path,
    migration_options: &MigrationOptions,
    options: &ImportOptions,
) -> Result<ImportStats> {
    let source = EntityFile::parse(path)?;
    let migration = Migration::for_entity(&*store, &source.entity, migration_options)?
        .with_catalog(catalog);
    let options = options.clone().with_serializer(source.serializer);

    let file = File::open(path)?;
    let input = if source.compressed {
        Source::reader(GzDecoder::new(file))
    } else {
        Source::from(file)
    };
    migration.import_data(store, input, &options)
}

/// Entity, serializer and compression read off a file name.
struct EntityFile {
    entity: String,
    serializer: String,
    compressed: bool,
}

impl EntityFile {
    fn parse(path: &Path) -> Result<Self> {
        let invalid = || {
            MigrateError::Config(format!(
                "Cannot tell entity and serializer from {}; expected <entity>.<serializer>[.gz]",
                path.display()
            ))
        };
        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let (name, compressed) = match name.strip_suffix(".gz") {
            Some(name) => (name, true),
            None => (name, false),
        };
        let (entity, serializer) = name
            .rsplit_once('.')
            .filter(|(e, s)| !e.is_empty() && !s.is_empty())
            .ok_or_else(invalid)?;
        Ok(Self {
            entity: entity.to_string(),
            serializer: serializer.to_string(),
            compressed,
        })
    }
}

/// One section of a joined file.
#[derive(Debug, PartialEq)]
struct Section<'a> {
    entity: &'a str,
    kind: &'a str,
    serializer: &'a str,
    content: &'a str,
}

fn section_header(entity: &str, serializer: &str) -> String {
    format!(
        "\n--\n-- Name: {}; Type: {}; Serializer: {}\n--\n\n",
        entity, ENTITY_SECTION, serializer
    )
}

/// Parse `-- Name: <entity>; Type: <kind>; Serializer: <serializer>`.
fn parse_title(line: &str) -> Option<(&str, &str, &str)> {
    let title = line
        .strip_prefix("-- Name: ")?
        .trim_end_matches(&['\r', '\n'][..]);
    let (entity, rest) = title.split_once("; Type: ")?;
    let (kind, serializer) = rest.split_once("; Serializer: ")?;
    let word = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    (word(entity) && word(kind) && word(serializer)).then_some((entity, kind, serializer))
}

/// Cut a joined file at its header blocks. Each section loses the newline
/// [`export_file`] appends after it.
fn split_sections(text: &str) -> Result<Vec<Section<'_>>> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut offsets = Vec::with_capacity(lines.len() + 1);
    let mut offset = 0;
    for line in &lines {
        offsets.push(offset);
        offset += line.len();
    }
    offsets.push(offset);

    let mut headers = Vec::new();
    let mut i = 0;
    while i + 5 <= lines.len() {
        let title = match lines[i..i + 5] {
            ["\n", "--\n", title, "--\n", "\n"] => parse_title(title),
            _ => None,
        };
        match title {
            Some(title) => {
                headers.push((offsets[i], offsets[i + 5], title));
                i += 5;
            }
            None => i += 1,
        }
    }
    if headers.is_empty() {
        return Err(MigrateError::Serialization(
            "Invalid file format: no section header found".to_string(),
        ));
    }

    let sections = headers
        .iter()
        .enumerate()
        .map(|(n, &(_, start, (entity, kind, serializer)))| {
            let end = headers.get(n + 1).map_or(text.len(), |next| next.0);
            let content = &text[start..end];
            Section {
                entity,
                kind,
                serializer,
                content: content.strip_suffix('\n').unwrap_or(content),
            }
        })
        .collect();
    Ok(sections)
}

fn staging_dir(prefix: &str) -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix(prefix).tempdir()?)
}

fn remove_staging_dir(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!("Failed to remove temp directory {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{row, DataType, EntitySchema, SchemaField, Value};
    use crate::store::MemoryStore;

    fn schemas() -> MemoryStore {
        MemoryStore::new()
            .with_entity(
                EntitySchema::new("category")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::foreign_key("blog", "blog", "id", DataType::Integer))
                    .with_field(SchemaField::new("name", DataType::Text))
                    .with_unique_together(["blog", "name"]),
            )
            .with_entity(
                EntitySchema::new("blog")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::new("name", DataType::Text).unique()),
            )
    }

    fn entities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sort_dependencies() {
        let store = schemas();
        let sorted = sort_dependencies(&store, &entities(&["category", "blog"])).unwrap();
        assert_eq!(sorted, entities(&["blog", "category"]));

        let sorted = sort_dependencies(&store, &entities(&["category"])).unwrap();
        assert_eq!(sorted, entities(&["category"]));
    }

    #[test]
    fn test_sort_dependencies_cycle() {
        let store = MemoryStore::new()
            .with_entity(
                EntitySchema::new("a")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::foreign_key("b", "b", "id", DataType::Integer)),
            )
            .with_entity(
                EntitySchema::new("b")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::foreign_key("a", "a", "id", DataType::Integer)),
            );
        let err = sort_dependencies(&store, &entities(&["a", "b"])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_directory_round_trip() {
        let mut source = schemas();
        source
            .insert_one("blog", row([("id", Value::Int(7)), ("name", Value::from("Pets"))]))
            .unwrap();
        source
            .insert_one("category", row([("blog_id", Value::Int(7)), ("name", Value::from("Toys"))]))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::with_builtins());
        let options = MigrationOptions::default().natural_keys();
        let written = export_directory(
            &source,
            catalog.clone(),
            &entities(&["category", "blog"]),
            dir.path(),
            "csv",
            &options,
        )
        .unwrap();
        assert_eq!(written, vec![("blog".to_string(), 1), ("category".to_string(), 1)]);
        assert!(dir.path().join("category.csv").exists());

        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("unknown.csv"), "x\n1\n").unwrap();

        let mut target = schemas();
        let imported =
            import_directory(&mut target, catalog, dir.path(), &options, &ImportOptions::default())
                .unwrap();
        let order: Vec<&str> = imported.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(order, vec!["blog", "category"]);

        let blogs = target.rows("blog").unwrap();
        let categories = target.rows("category").unwrap();
        assert_eq!(blogs[0]["name"], Value::from("Pets"));
        assert_eq!(categories[0]["blog_id"], blogs[0]["id"]);
        assert_eq!(categories[0]["name"], Value::from("Toys"));
    }

    #[test]
    fn test_export_unknown_serializer_writes_nothing() {
        let store = schemas();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let err = export_directory(
            &store,
            Arc::new(Catalog::with_builtins()),
            &entities(&["blog"]),
            &out,
            "xml",
            &MigrationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrateError::UnknownSerializer(_)));
        assert!(!out.exists());
    }

    fn populated() -> MemoryStore {
        let mut store = schemas();
        store
            .insert_one("blog", row([("id", Value::Int(7)), ("name", Value::from("Pets"))]))
            .unwrap();
        store
            .insert_one("category", row([("blog_id", Value::Int(7)), ("name", Value::from("Toys"))]))
            .unwrap();
        store
    }

    fn assert_copied(target: &MemoryStore) {
        let blogs = target.rows("blog").unwrap();
        let categories = target.rows("category").unwrap();
        assert_eq!(blogs.len(), 1);
        assert_eq!(blogs[0]["name"], Value::from("Pets"));
        assert_eq!(categories[0]["blog_id"], blogs[0]["id"]);
        assert_eq!(categories[0]["name"], Value::from("Toys"));
    }

    #[test]
    fn test_single_file_round_trip() {
        let source = populated();
        let catalog = Arc::new(Catalog::with_builtins());
        let options = MigrationOptions::default().natural_keys();

        let mut joined = Vec::new();
        let written = export_file(
            &source,
            catalog.clone(),
            &entities(&["category", "blog"]),
            &mut joined,
            "json",
            &options,
        )
        .unwrap();
        assert_eq!(written.len(), 2);

        let text = String::from_utf8(joined.clone()).unwrap();
        assert!(text.starts_with("\n--\n-- Name: blog; Type: ENTITY; Serializer: json\n--\n\n"));
        assert!(text.contains("-- Name: category; Type: ENTITY; Serializer: json"));

        let mut target = schemas();
        let imported = import_file(
            &mut target,
            catalog,
            &mut joined.as_slice(),
            &options,
            &ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(imported.len(), 2);
        assert_copied(&target);
    }

    #[test]
    fn test_split_sections() {
        let text = format!(
            "{}id,name\r\n7,Pets\r\n\n{}[{{\"name\": \"Toys\"}}]\n\n--\n-- Name: notes; Type: COMMENT; Serializer: txt\n--\n\nhello\n",
            section_header("blog", "csv"),
            section_header("category", "json"),
        );
        let sections = split_sections(&text).unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].entity, "blog");
        assert_eq!(sections[0].content, "id,name\r\n7,Pets\r\n");
        assert_eq!(sections[1].serializer, "json");
        assert_eq!(sections[1].content, "[{\"name\": \"Toys\"}]");
        assert_eq!(sections[2].kind, "COMMENT");
        assert_eq!(sections[2].content, "hello");
    }

    #[test]
    fn test_split_sections_rejects_plain_text() {
        let err = split_sections("id,name\n1,Pets\n").unwrap_err();
        assert!(matches!(err, MigrateError::Serialization(_)));
        assert!(parse_title("-- Name: ../etc; Type: ENTITY; Serializer: csv\n").is_none());
    }

    #[test]
    fn test_compressed_file_round_trip() {
        let source = populated();
        let catalog = Arc::new(Catalog::with_builtins());
        let options = MigrationOptions::default().natural_keys();

        let mut compressed = Vec::new();
        export_compressed_file(
            &source,
            catalog.clone(),
            &entities(&["blog", "category"]),
            &mut compressed,
            "yaml",
            &options,
        )
        .unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut target = schemas();
        import_compressed_file(
            &mut target,
            catalog,
            &mut compressed.as_slice(),
            &options,
            &ImportOptions::default(),
        )
        .unwrap();
        assert_copied(&target);
    }

    #[test]
    fn test_entity_file_round_trip() {
        let source = populated();
        let catalog = Arc::new(Catalog::with_builtins());
        let dir = tempfile::tempdir().unwrap();

        for name in ["blog.csv", "nested/blog.json.gz"] {
            let path = dir.path().join(name);
            let rows =
                export_entity_file(&source, catalog.clone(), &path, &MigrationOptions::default())
                    .unwrap();
            assert_eq!(rows, 1);

            let mut target = schemas();
            let stats = import_entity_file(
                &mut target,
                catalog.clone(),
                &path,
                &MigrationOptions::default(),
                &ImportOptions::default(),
            )
            .unwrap();
            assert_eq!(stats.inserted, 1, "{}", name);
            assert_eq!(target.rows("blog").unwrap(), source.rows("blog").unwrap());
        }
    }

    #[test]
    fn test_entity_file_needs_serializer_extension() {
        let store = schemas();
        let dir = tempfile::tempdir().unwrap();
        let err = export_entity_file(
            &store,
            Arc::new(Catalog::with_builtins()),
            &dir.path().join("blog"),
            &MigrationOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
