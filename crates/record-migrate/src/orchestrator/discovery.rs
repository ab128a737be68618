//! Field discovery and path analysis against entity schemas.

use std::collections::HashMap;

use crate::config::MigrationOptions;
use crate::core::{EntitySchema, SchemaField};
use crate::error::{MigrateError, Result};
use crate::fields::{Field, FieldKind};
use crate::store::RecordStore;

/// Schemas fetched while building one migration.
pub(super) struct SchemaCache<'a> {
    store: &'a dyn RecordStore,
    schemas: HashMap<String, EntitySchema>,
}

impl<'a> SchemaCache<'a> {
    pub(super) fn new(store: &'a dyn RecordStore) -> Self {
        Self {
            store,
            schemas: HashMap::new(),
        }
    }

    pub(super) fn get(&mut self, entity: &str) -> Result<EntitySchema> {
        if let Some(schema) = self.schemas.get(entity) {
            return Ok(schema.clone());
        }
        let schema = self.store.schema(entity)?;
        self.schemas.insert(entity.to_string(), schema.clone());
        Ok(schema)
    }
}

/// What a field path reaches.
#[derive(Debug)]
pub(super) enum PathKind {
    /// A stored attribute of the entity itself.
    Attribute(SchemaField),

    /// `relation__attribute` where the attribute identifies a target record.
    NaturalKey {
        relation: SchemaField,
        target: EntitySchema,
        attribute: SchemaField,
    },

    /// Reachable through relations, but not importable.
    Projection,

    /// Crosses an attribute the schema does not describe.
    Derived,
}

/// Walk `path` through `schema` and the schemas of its relation targets.
pub(super) fn classify(
    cache: &mut SchemaCache<'_>,
    schema: &EntitySchema,
    path: &str,
) -> Result<PathKind> {
    let hops: Vec<&str> = path.split("__").collect();
    let Some(first) = schema.field(hops[0]) else {
        return Ok(PathKind::Derived);
    };
    if hops.len() == 1 {
        return Ok(PathKind::Attribute(first.clone()));
    }

    let mut attribute = first.clone();
    let mut target = None;
    for hop in &hops[1..] {
        let Some(relation) = &attribute.relation else {
            return Ok(PathKind::Derived);
        };
        let next_schema = cache.get(&relation.target)?;
        let Some(next) = next_schema.field(hop).cloned() else {
            return Ok(PathKind::Derived);
        };
        attribute = next;
        target = Some(next_schema);
    }

    match target {
        Some(target) if hops.len() == 2 && identifies(&target, &attribute) => {
            Ok(PathKind::NaturalKey {
                relation: first.clone(),
                target,
                attribute,
            })
        }
        _ => Ok(PathKind::Projection),
    }
}

/// Rewrite `path` into the layout of a materialized record.
///
/// Relations crossed on the way keep their name, the attribute the schema
/// walk stops on becomes its stored attname (`pk` included) and derived hops
/// after it are kept as written.
pub(super) fn record_path(
    cache: &mut SchemaCache<'_>,
    schema: &EntitySchema,
    path: &str,
) -> Result<String> {
    let hops: Vec<&str> = path.split("__").collect();
    let mut resolved = Vec::with_capacity(hops.len());
    let mut current = schema.clone();
    let mut consumed = 0;

    for (i, hop) in hops.iter().enumerate() {
        let Some(attribute) = current.field(hop).cloned() else {
            break;
        };
        consumed = i + 1;
        let target = match (&attribute.relation, hops.get(i + 1)) {
            (Some(relation), Some(next)) => {
                Some(cache.get(&relation.target)?).filter(|t| t.field(next).is_some())
            }
            _ => None,
        };
        match target {
            Some(target) => {
                resolved.push(attribute.name);
                current = target;
            }
            None => {
                resolved.push(attribute.attname);
                break;
            }
        }
    }

    resolved.extend(hops[consumed..].iter().map(|hop| (*hop).to_string()));
    Ok(resolved.join("__"))
}

/// Whether `attribute` alone, or with the rest of a unique-together set,
/// picks out one record of `target`.
fn identifies(target: &EntitySchema, attribute: &SchemaField) -> bool {
    if attribute.is_relation() {
        return false;
    }
    attribute.is_candidate_key()
        || target
            .unique_together
            .iter()
            .any(|set| set.contains(&attribute.name))
}

/// Build the field list of an entity from its schema.
pub(super) fn discover_fields(
    cache: &mut SchemaCache<'_>,
    schema: &EntitySchema,
    options: &MigrationOptions,
) -> Result<Vec<Field>> {
    let names: Vec<String> = if options.fields.is_empty() {
        let skip_identity = options.use_natural_primary_keys && schema.natural_key().is_some();
        schema
            .fields
            .iter()
            .filter(|f| !(skip_identity && f.primary_key))
            .map(|f| f.name.clone())
            .collect()
    } else {
        options.fields.clone()
    };

    let mut fields = Vec::with_capacity(names.len());
    for name in &names {
        if is_excluded(schema, &options.exclude, name) {
            continue;
        }
        if name.contains("__") {
            fields.push(path_field(cache, schema, name)?);
            continue;
        }

        let attribute = schema.field(name).ok_or_else(|| {
            MigrateError::Config(format!("{} has no attribute '{}'", schema.name, name))
        })?;
        match &attribute.relation {
            Some(relation) if options.use_natural_foreign_keys => {
                let target = cache.get(&relation.target)?;
                match target.natural_key() {
                    Some(key) if key.iter().all(|a| !a.is_relation()) => {
                        for key_attribute in key {
                            fields.push(
                                Field::new(
                                    FieldKind::for_data_type(key_attribute.data_type),
                                    format!("{}__{}", attribute.name, key_attribute.name),
                                )
                                .with_attname(attribute.attname.clone()),
                            );
                        }
                    }
                    _ => fields.push(plain_field(attribute)),
                }
            }
            _ => fields.push(plain_field(attribute)),
        }
    }
    Ok(fields)
}

/// A stored attribute exported under its logical name.
fn plain_field(attribute: &SchemaField) -> Field {
    Field::new(
        FieldKind::for_data_type(attribute.data_type),
        attribute.attname.clone(),
    )
    .with_name(attribute.name.clone())
}

/// A field for an explicit `__` path, typed after the attribute it ends on.
fn path_field(cache: &mut SchemaCache<'_>, schema: &EntitySchema, path: &str) -> Result<Field> {
    let unknown = || MigrateError::Config(format!("{} has no field '{}'", schema.name, path));
    let hops: Vec<&str> = path.split("__").collect();
    let first_attname = schema.field(hops[0]).ok_or_else(unknown)?.attname.clone();

    let mut current = schema.clone();
    for (i, hop) in hops.iter().enumerate() {
        let attribute = current.field(hop).cloned().ok_or_else(unknown)?;
        let rest = &hops[i + 1..];
        if rest.is_empty() {
            let kind = FieldKind::for_data_type(attribute.data_type);
            return Ok(Field::new(kind, path).with_attname(first_attname));
        }
        match &attribute.relation {
            Some(relation) => current = cache.get(&relation.target)?,
            None => {
                let kinds = rest
                    .iter()
                    .map(|hop| FieldKind::for_attribute(hop))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unknown)?;
                let kind = kinds.last().copied().ok_or_else(unknown)?;
                return Ok(Field::new(kind, path).with_attname(first_attname));
            }
        }
    }
    Err(unknown())
}

/// Whether `name` is listed in `exclude`, comparing by schema attribute when
/// both sides resolve to one.
fn is_excluded(schema: &EntitySchema, exclude: &[String], name: &str) -> bool {
    let canonical = |n: &str| schema.field(n).map_or_else(|| n.to_string(), |f| f.name.clone());
    let name = canonical(name);
    exclude.iter().any(|e| canonical(e) == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_entity(
                EntitySchema::new("blog")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::new("name", DataType::Text).unique())
                    .with_field(SchemaField::new("created", DataType::DateTime)),
            )
            .with_entity(
                EntitySchema::new("category")
                    .with_field(SchemaField::auto_id("id"))
                    .with_field(SchemaField::foreign_key("blog", "blog", "id", DataType::Integer))
                    .with_field(SchemaField::new("name", DataType::Text))
                    .with_unique_together(["blog", "name"]),
            )
    }

    fn kinds(store: &MemoryStore, path: &str) -> PathKind {
        let mut cache = SchemaCache::new(store);
        let schema = cache.get("category").unwrap();
        classify(&mut cache, &schema, path).unwrap()
    }

    #[test]
    fn test_classify_paths() {
        let store = store();
        assert!(matches!(kinds(&store, "name"), PathKind::Attribute(a) if a.attname == "name"));
        assert!(matches!(kinds(&store, "blog"), PathKind::Attribute(a) if a.attname == "blog_id"));
        assert!(matches!(kinds(&store, "pk"), PathKind::Attribute(a) if a.name == "id"));
        assert!(matches!(
            kinds(&store, "blog__name"),
            PathKind::NaturalKey { ref relation, .. } if relation.attname == "blog_id"
        ));
        assert!(matches!(kinds(&store, "blog__created"), PathKind::Projection));
        assert!(matches!(kinds(&store, "blog__created__year"), PathKind::Derived));
        assert!(matches!(kinds(&store, "name__upper"), PathKind::Derived));
        assert!(matches!(kinds(&store, "title"), PathKind::Derived));
    }

    #[test]
    fn test_record_paths_use_stored_attributes() {
        let store = store();
        let mut cache = SchemaCache::new(&store);
        let schema = cache.get("category").unwrap();
        let mut path = |p: &str| record_path(&mut cache, &schema, p).unwrap();

        assert_eq!(path("pk"), "id");
        assert_eq!(path("blog"), "blog_id");
        assert_eq!(path("blog__pk"), "blog__id");
        assert_eq!(path("blog__created__year"), "blog__created__year");
        assert_eq!(path("name__upper"), "name__upper");
        assert_eq!(path("title__year"), "title__year");
    }

    #[test]
    fn test_discover_all_attributes() {
        let store = store();
        let mut cache = SchemaCache::new(&store);
        let schema = cache.get("category").unwrap();
        let fields = discover_fields(&mut cache, &schema, &MigrationOptions::default()).unwrap();

        let described: Vec<(String, String)> = fields
            .iter()
            .map(|f| (f.name().to_string(), f.path().to_string()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("id".to_string(), "id".to_string()),
                ("blog".to_string(), "blog_id".to_string()),
                ("name".to_string(), "name".to_string()),
            ]
        );
    }

    #[test]
    fn test_discover_natural_keys() {
        let store = store();
        let mut cache = SchemaCache::new(&store);
        let schema = cache.get("category").unwrap();
        let options = MigrationOptions::default().natural_keys();
        let fields = discover_fields(&mut cache, &schema, &options).unwrap();

        let paths: Vec<&str> = fields.iter().map(Field::path).collect();
        assert_eq!(paths, vec!["blog__name", "name"]);
        assert_eq!(fields[0].attname(), "blog_id");
    }

    #[test]
    fn test_discover_selection_and_exclude() {
        let store = store();
        let mut cache = SchemaCache::new(&store);
        let schema = cache.get("category").unwrap();

        let options = MigrationOptions::default()
            .with_fields(["pk", "blog__created__year", "name"])
            .with_exclude(["name"]);
        let fields = discover_fields(&mut cache, &schema, &options).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].path(), "id");
        assert_eq!(fields[1].kind(), FieldKind::Year);
        assert_eq!(fields[1].attname(), "blog_id");

        let options = MigrationOptions::default().with_exclude(["blog_id"]);
        let fields = discover_fields(&mut cache, &schema, &options).unwrap();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_discover_unknown_attribute() {
        let store = store();
        let mut cache = SchemaCache::new(&store);
        let schema = cache.get("category").unwrap();
        let options = MigrationOptions::default().with_fields(["title"]);
        let err = discover_fields(&mut cache, &schema, &options).unwrap_err();
        assert!(err.is_configuration());

        let options = MigrationOptions::default().with_fields(["blog__title"]);
        assert!(discover_fields(&mut cache, &schema, &options).is_err());
    }
}
