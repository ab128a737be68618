//! Migration orchestration.
//!
//! A [`Migration`] binds an entity to an ordered list of [`Field`]s. Every
//! property derived from the schema (importable fields, key, natural foreign
//! keys, capabilities) is computed once when the migration is built.
//!
//! - [`Migration::export_data`]: project, convert and serialize every record
//! - [`Migration::import_data`]: deserialize, coerce and hand batches to an
//!   [`ImportationPlan`] inside one transaction
//!
//! Submodules:
//! - `discovery`: path analysis and field discovery from schemas
//! - `natural_keys`: [`NaturalForeignKey`] resolution

mod discovery;
mod natural_keys;

pub use natural_keys::NaturalForeignKey;

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ImportOptions, MigrationOptions};
use crate::core::{Catalog, Cell, EntitySchema, Row, SchemaField, Value};
use crate::error::{MigrateError, Result};
use crate::fields::Field;
use crate::plans::{ImportStats, ImportationPlan};
use crate::serializers::{Serializer, Source};
use crate::store::RecordStore;

use discovery::{PathKind, SchemaCache};

/// Serializer used when none is named.
pub const DEFAULT_SERIALIZER: &str = "json";

/// Fields identifying a record during import.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    Single(Field),
    Composite(Vec<Field>),
}

impl PrimaryKey {
    pub fn fields(&self) -> Vec<&Field> {
        match self {
            PrimaryKey::Single(field) => vec![field],
            PrimaryKey::Composite(fields) => fields.iter().collect(),
        }
    }
}

/// Export and import of one entity through a fixed field list.
#[derive(Debug, Clone)]
pub struct Migration {
    entity: String,
    schema: EntitySchema,
    fields: Vec<Field>,
    fields_to_import: Vec<Field>,
    import_columns: Vec<String>,
    primary_key: Option<PrimaryKey>,
    key_attnames: Vec<String>,
    natural_foreign_keys: Vec<NaturalForeignKey>,
    can_create: bool,
    can_update: bool,
    requires_model_instances: bool,
    record_paths: Vec<String>,
    ignore_missing_foreign_keys: bool,
    catalog: Arc<Catalog>,
}

impl Migration {
    /// Discover fields from the entity schema according to `options`.
    pub fn for_entity(
        store: &dyn RecordStore,
        entity: &str,
        options: &MigrationOptions,
    ) -> Result<Self> {
        let mut cache = SchemaCache::new(store);
        let schema = cache.get(entity)?;
        let fields = discovery::discover_fields(&mut cache, &schema, options)?;
        let migration = Self::build(&mut cache, schema, fields)?;
        Ok(migration.with_ignore_missing_foreign_keys(options.ignore_missing_foreign_keys))
    }

    /// Use exactly `fields`, in order.
    pub fn for_fields(store: &dyn RecordStore, entity: &str, fields: Vec<Field>) -> Result<Self> {
        let mut cache = SchemaCache::new(store);
        let schema = cache.get(entity)?;
        Self::build(&mut cache, schema, fields)
    }

    fn build(cache: &mut SchemaCache<'_>, schema: EntitySchema, fields: Vec<Field>) -> Result<Self> {
        let mut paths = HashSet::new();
        for field in &fields {
            if field.path().is_empty() {
                return Err(MigrateError::Config(format!(
                    "{}: field '{}' has an empty path",
                    schema.name,
                    field.name()
                )));
            }
            if !paths.insert(field.path()) {
                return Err(MigrateError::Config(format!(
                    "{}: field path '{}' is used twice",
                    schema.name,
                    field.path()
                )));
            }
        }

        let mut fields_to_import = Vec::new();
        let mut import_columns = Vec::new();
        let mut attributes: Vec<SchemaField> = Vec::new();
        let mut natural_foreign_keys: Vec<NaturalForeignKey> = Vec::new();
        let mut requires_model_instances = false;

        for field in &fields {
            match discovery::classify(cache, &schema, field.path())? {
                PathKind::Attribute(attribute) => {
                    import_columns.push(attribute.attname.clone());
                    attributes.push(attribute);
                    fields_to_import.push(field.clone());
                }
                PathKind::NaturalKey {
                    relation,
                    target,
                    attribute,
                } => {
                    match natural_foreign_keys
                        .iter()
                        .position(|nfk| nfk.attname() == relation.attname)
                    {
                        Some(i) => natural_foreign_keys[i].push(field.clone(), &attribute),
                        None => natural_foreign_keys.push(NaturalForeignKey::new(
                            &relation,
                            &target,
                            field.clone(),
                            &attribute,
                        )),
                    }
                    import_columns.push(field.path().to_string());
                    attributes.push(relation);
                    fields_to_import.push(field.clone());
                }
                PathKind::Projection => {}
                PathKind::Derived => requires_model_instances = true,
            }
        }

        let record_paths = if requires_model_instances {
            fields
                .iter()
                .map(|f| discovery::record_path(cache, &schema, f.path()))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let covered: HashSet<&str> = attributes.iter().map(|a| a.attname.as_str()).collect();
        let can_create = schema
            .required_fields()
            .all(|f| covered.contains(f.attname.as_str()));
        let (primary_key, key_attnames) =
            match discover_primary_key(&schema, &fields_to_import, &attributes) {
                Some((key, attnames)) => (Some(key), attnames),
                None => (None, Vec::new()),
            };
        let can_update = primary_key.is_some();

        debug!(
            "{}: {} fields, {} importable, key {:?}, create={}, update={}",
            schema.name,
            fields.len(),
            fields_to_import.len(),
            key_attnames,
            can_create,
            can_update
        );

        Ok(Self {
            entity: schema.name.clone(),
            schema,
            fields,
            fields_to_import,
            import_columns,
            primary_key,
            key_attnames,
            natural_foreign_keys,
            can_create,
            can_update,
            requires_model_instances,
            record_paths,
            ignore_missing_foreign_keys: false,
            catalog: Arc::new(Catalog::with_builtins()),
        })
    }

    /// Resolve serializer and plan names in `catalog`.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Drop rows whose natural foreign key has no match instead of failing.
    #[must_use]
    pub fn with_ignore_missing_foreign_keys(mut self, ignore: bool) -> Self {
        self.ignore_missing_foreign_keys = ignore;
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Fields written on import: stored attributes and natural key sub-fields.
    pub fn fields_to_import(&self) -> &[Field] {
        &self.fields_to_import
    }

    /// Column names, one per field.
    pub fn headers(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// Storage attributes of the key, as they appear in prepared rows.
    pub fn key_attnames(&self) -> &[String] {
        &self.key_attnames
    }

    pub fn natural_foreign_keys(&self) -> &[NaturalForeignKey] {
        &self.natural_foreign_keys
    }

    /// Every required attribute is covered by an importable field.
    pub fn can_create(&self) -> bool {
        self.can_create
    }

    /// A key was found among the importable fields.
    pub fn can_update(&self) -> bool {
        self.can_update
    }

    pub fn can_import(&self) -> bool {
        !self.fields_to_import.is_empty() && (self.can_create || self.can_update)
    }

    pub fn can_export(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Export must materialize records because a path crosses a derived
    /// attribute.
    pub fn requires_model_instances(&self) -> bool {
        self.requires_model_instances
    }

    pub fn ignores_missing_foreign_keys(&self) -> bool {
        self.ignore_missing_foreign_keys
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Plan used when none is named.
    pub fn default_plan(&self) -> &'static str {
        match (self.can_create, self.can_update) {
            (true, true) => "update_or_create",
            (true, false) => "create",
            _ => "update",
        }
    }

    /// Serialize every record of the entity with the named serializer
    /// (JSON by default), returning the number of rows written.
    pub fn export_data(
        &self,
        store: &dyn RecordStore,
        writer: &mut dyn Write,
        serializer: Option<&str>,
    ) -> Result<u64> {
        let serializer = self
            .catalog
            .require_serializer(serializer.unwrap_or(DEFAULT_SERIALIZER))?;
        self.export_with(store, writer, serializer.as_ref())
    }

    /// [`Migration::export_data`] into a string.
    pub fn export_to_string(&self, store: &dyn RecordStore, serializer: Option<&str>) -> Result<String> {
        let mut buffer = Vec::new();
        self.export_data(store, &mut buffer, serializer)?;
        String::from_utf8(buffer).map_err(|e| MigrateError::Serialization(e.to_string()))
    }

    /// Serialize every record of the entity with `serializer`.
    pub fn export_with(
        &self,
        store: &dyn RecordStore,
        writer: &mut dyn Write,
        serializer: &dyn Serializer,
    ) -> Result<u64> {
        if !self.can_export() {
            return Err(MigrateError::UnableToExport);
        }

        let records: Vec<Vec<Value>> = if self.requires_model_instances {
            store
                .fetch_records(&self.entity)?
                .iter()
                .map(|record| {
                    self.record_paths
                        .iter()
                        .map(|path| record.resolve(path).unwrap_or(Value::Null))
                        .collect()
                })
                .collect()
        } else {
            let paths: Vec<Vec<String>> = self
                .fields
                .iter()
                .map(|f| f.path().split("__").map(str::to_string).collect())
                .collect();
            store.fetch_values(&self.entity, &paths)?
        };

        let count = records.len() as u64;
        let mut rows = records.into_iter().map(|values| {
            self.fields
                .iter()
                .zip(values)
                .map(|(field, value)| field.export_value(value, serializer))
                .collect::<Result<Vec<Value>>>()
        });
        serializer.dump(&self.headers(), &mut rows, writer)?;

        info!(
            "{}: exported {} rows as {}",
            self.entity,
            count,
            serializer.name()
        );
        Ok(count)
    }

    /// Lazily deserialize `source` into rows ready for natural key
    /// resolution.
    ///
    /// Rows are keyed by storage attribute, natural key sub-fields by path.
    /// Columns missing from the source are left out of the rows.
    pub fn get_data_to_import<'a>(
        &'a self,
        source: Source<'a>,
        serializer: &'a dyn Serializer,
    ) -> Result<Box<dyn Iterator<Item = Result<Row>> + 'a>> {
        let headers: Vec<String> = self
            .fields_to_import
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        let cells = serializer.load(&headers, source.into_reader())?;

        Ok(Box::new(cells.map(move |cells| {
            let cells = cells?;
            let mut row = Row::new();
            for ((field, column), cell) in self
                .fields_to_import
                .iter()
                .zip(&self.import_columns)
                .zip(cells)
            {
                if let Cell::Present(value) = cell {
                    row.insert(column.clone(), field.import_value(value, serializer)?);
                }
            }
            Ok(row)
        })))
    }

    /// Import `source` with the serializer and plan named in `options`.
    pub fn import_data<'a>(
        &self,
        store: &mut dyn RecordStore,
        source: impl Into<Source<'a>>,
        options: &ImportOptions,
    ) -> Result<ImportStats> {
        if !self.can_import() {
            return Err(MigrateError::UnableToImport);
        }
        let serializer = self
            .catalog
            .require_serializer(options.serializer.as_deref().unwrap_or(DEFAULT_SERIALIZER))?;
        let plan = self
            .catalog
            .require_plan(options.plan.as_deref().unwrap_or(self.default_plan()))?;
        self.import_with(
            store,
            source,
            serializer.as_ref(),
            plan.as_ref(),
            options.batch_size,
        )
    }

    /// Import `source` with explicit serializer and plan.
    ///
    /// Every batch runs inside one store transaction: either all rows are
    /// applied or, on the first error, none are.
    pub fn import_with<'a>(
        &self,
        store: &mut dyn RecordStore,
        source: impl Into<Source<'a>>,
        serializer: &dyn Serializer,
        plan: &dyn ImportationPlan,
        batch_size: usize,
    ) -> Result<ImportStats> {
        if !self.can_import() {
            return Err(MigrateError::UnableToImport);
        }
        plan.check(self)?;

        info!(
            "{}: importing {} via {} in batches of {}",
            self.entity,
            serializer.name(),
            plan.name(),
            batch_size
        );
        let mut rows = self.get_data_to_import(source.into(), serializer)?;
        let stats = plan.run(self, store, &mut rows, batch_size)?;
        info!(
            "{}: {} rows in {} batches: {} inserted, {} updated, {} deleted, {} skipped, {} dropped",
            self.entity,
            stats.rows_read,
            stats.batches,
            stats.inserted,
            stats.updated,
            stats.deleted,
            stats.skipped,
            stats.dropped
        );
        Ok(stats)
    }
}

/// The identity attribute if imported, else the first candidate key, else
/// the first unique-together set fully covered by importable fields.
fn discover_primary_key(
    schema: &EntitySchema,
    fields: &[Field],
    attributes: &[SchemaField],
) -> Option<(PrimaryKey, Vec<String>)> {
    let mut candidate = None;
    for (field, attribute) in fields.iter().zip(attributes) {
        if attribute.primary_key {
            return Some((PrimaryKey::Single(field.clone()), vec![attribute.attname.clone()]));
        }
        if candidate.is_none() && attribute.is_candidate_key() {
            candidate = Some((field, attribute));
        }
    }
    if let Some((field, attribute)) = candidate {
        return Some((PrimaryKey::Single(field.clone()), vec![attribute.attname.clone()]));
    }

    'sets: for set in &schema.unique_together {
        let mut key_fields = Vec::new();
        let mut attnames = Vec::new();
        for name in set {
            let Some(declared) = schema.field(name) else {
                continue 'sets;
            };
            let matching: Vec<Field> = fields
                .iter()
                .zip(attributes)
                .filter(|(_, a)| a.attname == declared.attname)
                .map(|(f, _)| f.clone())
                .collect();
            if matching.is_empty() {
                continue 'sets;
            }
            key_fields.extend(matching);
            attnames.push(declared.attname.clone());
        }
        if key_fields.is_empty() {
            continue;
        }
        let key = if key_fields.len() == 1 {
            PrimaryKey::Single(key_fields.remove(0))
        } else {
            PrimaryKey::Composite(key_fields)
        };
        return Some((key, attnames));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{row, DataType};
    use crate::plans::{CreatePlan, DirectPlan};
    use crate::serializers::CsvSerializer;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new()
            .with_entity(
                EntitySchema::new("blog")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::new("name", DataType::Text).unique()),
            )
            .with_entity(
                EntitySchema::new("category")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::foreign_key("blog", "blog", "id", DataType::Integer))
                    .with_field(SchemaField::new("name", DataType::Text))
                    .with_field(SchemaField::new("position", DataType::Integer).with_default())
                    .with_unique_together(["blog", "name"]),
            );
        store
            .insert_one("blog", row([("id", Value::Int(7)), ("name", Value::from("News"))]))
            .unwrap();
        store
            .insert_one(
                "category",
                row([
                    ("blog_id", Value::Int(7)),
                    ("name", Value::from("Tech")),
                    ("position", Value::Int(1)),
                ]),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_for_entity_derives_properties() {
        let store = store();
        let migration =
            Migration::for_entity(&store, "category", &MigrationOptions::default()).unwrap();
        assert_eq!(migration.headers(), vec!["id", "blog", "name", "position"]);
        assert_eq!(migration.key_attnames(), &["id".to_string()]);
        assert!(migration.can_create());
        assert!(migration.can_update());
        assert!(migration.can_import());
        assert!(!migration.requires_model_instances());
        assert_eq!(migration.default_plan(), "update_or_create");
    }

    #[test]
    fn test_natural_keys_use_unique_together() {
        let store = store();
        let options = MigrationOptions::default().natural_keys();
        let migration = Migration::for_entity(&store, "category", &options).unwrap();

        assert_eq!(migration.headers(), vec!["blog__name", "name", "position"]);
        assert_eq!(
            migration.key_attnames(),
            &["blog_id".to_string(), "name".to_string()]
        );
        assert!(matches!(migration.primary_key(), Some(PrimaryKey::Composite(f)) if f.len() == 2));
        assert_eq!(migration.natural_foreign_keys().len(), 1);
        assert_eq!(migration.natural_foreign_keys()[0].target(), "blog");
    }

    #[test]
    fn test_candidate_key_when_identity_missing() {
        let store = store();
        let migration =
            Migration::for_fields(&store, "blog", vec![Field::text("name")]).unwrap();
        assert_eq!(migration.key_attnames(), &["name".to_string()]);
        assert!(migration.can_create());
    }

    #[test]
    fn test_projection_is_export_only() {
        let store = store();
        let migration = Migration::for_fields(
            &store,
            "category",
            vec![Field::text("name"), Field::integer("blog__id__upper")],
        )
        .unwrap();
        assert_eq!(migration.fields_to_import().len(), 1);
        assert!(migration.requires_model_instances());
        assert!(!migration.can_create());
        assert!(!migration.can_update());
        assert!(!migration.can_import());
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let store = store();
        let err = Migration::for_fields(
            &store,
            "blog",
            vec![Field::text("name"), Field::text("name").with_name("label")],
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_export_csv() {
        let store = store();
        let options = MigrationOptions::default().natural_keys();
        let migration = Migration::for_entity(&store, "category", &options).unwrap();
        let csv = migration.export_to_string(&store, Some("csv")).unwrap();
        assert_eq!(csv, "blog__name,name,position\r\nNews,Tech,1\r\n");
    }

    #[test]
    fn test_export_modes_agree() {
        let store = store();
        let shared = vec![
            Field::integer("pk"),
            Field::integer("blog"),
            Field::integer("blog__pk"),
            Field::text("name"),
        ];
        let flat = Migration::for_fields(&store, "category", shared.clone()).unwrap();
        let mut fields = shared;
        fields.push(Field::year("name__year"));
        let whole = Migration::for_fields(&store, "category", fields).unwrap();

        assert!(!flat.requires_model_instances());
        assert!(whole.requires_model_instances());
        assert_eq!(
            flat.export_to_string(&store, Some("csv")).unwrap(),
            "pk,blog,blog__pk,name\r\n1,7,7,Tech\r\n"
        );
        assert_eq!(
            whole.export_to_string(&store, Some("csv")).unwrap(),
            "pk,blog,blog__pk,name,name__year\r\n1,7,7,Tech,\\N\r\n"
        );
    }

    #[test]
    fn test_export_without_fields() {
        let store = store();
        let migration = Migration::for_fields(&store, "blog", Vec::new()).unwrap();
        assert!(matches!(
            migration.export_to_string(&store, None),
            Err(MigrateError::UnableToExport)
        ));
    }

    #[test]
    fn test_get_data_to_import_skips_absent_columns() {
        let store = store();
        let migration =
            Migration::for_entity(&store, "category", &MigrationOptions::default()).unwrap();
        let serializer = CsvSerializer::new();
        let rows: Vec<Row> = migration
            .get_data_to_import(Source::Text("name,blog\nSport,7\n"), &serializer)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![row([("blog_id", Value::Int(7)), ("name", Value::from("Sport"))])]
        );
    }

    #[test]
    fn test_import_capability_errors() {
        let mut store = store();
        let migration = Migration::for_fields(&store, "category", vec![Field::text("name")]).unwrap();
        assert!(matches!(
            migration.import_with(&mut store, "name\nX\n", &CsvSerializer::new(), &CreatePlan, 10),
            Err(MigrateError::UnableToImport)
        ));

        let migration = Migration::for_fields(
            &store,
            "category",
            vec![Field::integer("id"), Field::text("name")],
        )
        .unwrap();
        assert!(matches!(
            migration.import_with(&mut store, "id,name\n9,X\n", &CsvSerializer::new(), &DirectPlan, 10),
            Err(MigrateError::UnableToCreate)
        ));
    }

    #[test]
    fn test_import_unknown_names() {
        let mut store = store();
        let migration =
            Migration::for_entity(&store, "blog", &MigrationOptions::default()).unwrap();
        let options = ImportOptions::default().with_serializer("xml");
        assert!(matches!(
            migration.import_data(&mut store, "", &options),
            Err(MigrateError::UnknownSerializer(_))
        ));
        let options = ImportOptions::default().with_plan("merge");
        assert!(matches!(
            migration.import_data(&mut store, "[]", &options),
            Err(MigrateError::UnknownPlan(_))
        ));
    }

    #[test]
    fn test_import_with_natural_foreign_key() {
        let mut store = store();
        let options = MigrationOptions::default().natural_keys();
        let migration = Migration::for_entity(&store, "category", &options).unwrap();
        let stats = migration
            .import_data(
                &mut store,
                "blog__name,name,position\nNews,Sport,2\nNews,Tech,5\n",
                &ImportOptions::default().with_serializer("csv"),
            )
            .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);

        let rows = store.rows("category").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["position"], Value::Int(5));
        assert_eq!(rows[1]["blog_id"], Value::Int(7));
        assert_eq!(rows[1]["name"], Value::from("Sport"));
    }
}
