//! End-to-end import and export scenarios against the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;
use record_migrate::core::{row, DataType, EntitySchema, Row, SchemaField};
use record_migrate::plans::{CreatePlan, DirectPlan, ImportationPlan};
use record_migrate::serializers::CsvSerializer;
use record_migrate::{
    export_directory, import_directory, Catalog, Field, ImportOptions, MemoryStore,
    MigrateError, Migration, MigrationOptions, RecordStore, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn person_store() -> MemoryStore {
    MemoryStore::new().with_entity(
        EntitySchema::new("person")
            .with_field(SchemaField::new("id", DataType::Integer).primary_key())
            .with_field(SchemaField::new("name", DataType::Text)),
    )
}

fn person_migration(store: &MemoryStore) -> Migration {
    Migration::for_entity(store, "person", &MigrationOptions::default()).unwrap()
}

fn people(store: &MemoryStore) -> Vec<(i64, String)> {
    let mut people: Vec<(i64, String)> = store
        .rows("person")
        .unwrap()
        .iter()
        .map(|r| match (&r["id"], &r["name"]) {
            (Value::Int(id), Value::Text(name)) => (*id, name.clone()),
            other => panic!("unexpected row {:?}", other),
        })
        .collect();
    people.sort();
    people
}

fn csv(plan: &str) -> ImportOptions {
    ImportOptions::default().with_serializer("csv").with_plan(plan)
}

fn blog_store() -> MemoryStore {
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
                .with_unique_together(["blog", "name"]),
        );
    store
        .insert_one("blog", row([("id", Value::Int(7)), ("name", Value::from("Pets"))]))
        .unwrap();
    store.reset_stats();
    store
}

// =============================================================================
// Plans
// =============================================================================

#[test]
fn test_direct_import_into_empty_entity() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);

    let stats = migration
        .import_data(&mut store, "id,name\n1,Alice\n2,Bob\n", &csv("direct"))
        .unwrap();

    assert_eq!(stats.inserted, 2);
    assert_eq!(
        people(&store),
        vec![(1, "Alice".to_string()), (2, "Bob".to_string())]
    );
}

#[test]
fn test_create_leaves_existing_records_untouched() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    migration
        .import_data(&mut store, "id,name\n1,Alice\n2,Bob\n", &csv("direct"))
        .unwrap();

    let stats = migration
        .import_data(&mut store, "id,name\n1,Alicia\n3,Carol\n", &csv("create"))
        .unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(
        people(&store),
        vec![
            (1, "Alice".to_string()),
            (2, "Bob".to_string()),
            (3, "Carol".to_string())
        ]
    );
}

#[test]
fn test_create_twice_is_idempotent() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    let data = "id,name\n4,Dan\n5,Eve\n";

    for plan in ["create", "bulk_create"] {
        migration.import_data(&mut store, data, &csv(plan)).unwrap();
        migration.import_data(&mut store, data, &csv(plan)).unwrap();
    }
    assert_eq!(people(&store).len(), 2);
}

#[test]
fn test_update_without_matches_writes_nothing() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    migration
        .import_data(&mut store, "id,name\n1,Alice\n", &csv("direct"))
        .unwrap();
    store.reset_stats();

    let stats = migration
        .import_data(&mut store, "id,name\n8,Hank\n9,Ivy\n", &csv("update"))
        .unwrap();

    assert_eq!(stats.skipped, 2);
    assert_eq!(store.write_stats().writes(), 0);
    assert_eq!(people(&store), vec![(1, "Alice".to_string())]);
}

#[test]
fn test_update_or_create_defaults() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    assert_eq!(migration.default_plan(), "update_or_create");

    migration
        .import_data(&mut store, r#"[{"id": 1, "name": "Alice"}]"#, &ImportOptions::default())
        .unwrap();
    let stats = migration
        .import_data(
            &mut store,
            r#"[{"id": 1, "name": "Alicia"}, {"id": 2, "name": "Bob"}]"#,
            &ImportOptions::default(),
        )
        .unwrap();

    assert_eq!(stats.updated, 1);
    assert_eq!(stats.inserted, 1);
    assert_eq!(
        people(&store),
        vec![(1, "Alicia".to_string()), (2, "Bob".to_string())]
    );
}

#[test]
fn test_replace_deletes_matching_keys_first() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    migration
        .import_data(&mut store, "id,name\n1,Alice\n2,Bob\n", &csv("direct"))
        .unwrap();

    let stats = migration
        .import_data(&mut store, "id,name\n2,Robert\n3,Carol\n", &csv("replace"))
        .unwrap();

    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.inserted, 2);
    assert_eq!(
        people(&store),
        vec![
            (1, "Alice".to_string()),
            (2, "Robert".to_string()),
            (3, "Carol".to_string())
        ]
    );
}

#[test]
fn test_replace_all_keeps_only_imported_rows() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);
    migration
        .import_data(&mut store, "id,name\n1,Alice\n2,Bob\n", &csv("direct"))
        .unwrap();

    migration
        .import_data(&mut store, "id,name\n5,Eve\n", &csv("replace_all"))
        .unwrap();

    assert_eq!(people(&store), vec![(5, "Eve".to_string())]);
}

// =============================================================================
// Batching and transactions
// =============================================================================

#[test]
fn test_batch_count_is_ceiling() {
    init_tracing();
    for (rows, batch_size, expected) in [(7, 3, 3), (6, 3, 2), (1, 100, 1), (0, 10, 0)] {
        let mut store = person_store();
        let migration = person_migration(&store);
        let mut data = String::from("id,name\n");
        for i in 0..rows {
            data.push_str(&format!("{},P{}\n", i, i));
        }

        let options = csv("direct").with_batch_size(batch_size);
        let stats = migration.import_data(&mut store, &data, &options).unwrap();
        assert_eq!(stats.batches, expected, "{} rows by {}", rows, batch_size);
        assert_eq!(stats.rows_read, rows as u64);
    }
}

#[test]
fn test_failure_in_later_batch_rolls_back_everything() {
    init_tracing();
    let mut store = person_store();
    let migration = person_migration(&store);

    // Third batch repeats id 1.
    let data = "id,name\n1,A\n2,B\n3,C\n4,D\n1,E\n";
    let err = migration
        .import_data(&mut store, data, &csv("direct").with_batch_size(2))
        .unwrap_err();
    assert!(matches!(err, MigrateError::Store { .. }));
    assert!(people(&store).is_empty());

    // Coercion failure in the second batch.
    let data = "id,name\n1,A\n2,B\nthree,C\n";
    let err = migration
        .import_data(&mut store, data, &csv("direct").with_batch_size(2))
        .unwrap_err();
    assert!(matches!(err, MigrateError::Coercion { .. }));
    assert!(people(&store).is_empty());
}

#[test]
fn test_capability_errors_come_before_io() {
    init_tracing();
    let mut store = person_store();
    let migration = Migration::for_fields(&store, "person", vec![Field::text("name")]).unwrap();
    assert!(!migration.can_create());
    assert!(!migration.can_update());
    assert!(matches!(
        migration.import_with(&mut store, "not,csv", &CsvSerializer::new(), &CreatePlan, 10),
        Err(MigrateError::UnableToImport)
    ));

    let migration = person_migration(&store);
    let err = migration
        .import_data(&mut store, "id,name\n1,A\n", &csv("upsert"))
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(store.write_stats().writes(), 0);
}

// =============================================================================
// Natural keys
// =============================================================================

#[test]
fn test_natural_foreign_key_resolves_to_identity() {
    init_tracing();
    let mut store = blog_store();
    let migration =
        Migration::for_entity(&store, "category", &MigrationOptions::default().natural_keys())
            .unwrap();

    migration
        .import_data(
            &mut store,
            r#"[{"blog__name": "Pets", "name": "Toys"}]"#,
            &ImportOptions::default().with_plan("direct"),
        )
        .unwrap();

    let categories = store.rows("category").unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0]["blog_id"], Value::Int(7));
    assert_eq!(categories[0]["name"], Value::from("Toys"));
}

#[test]
fn test_unresolved_natural_foreign_key() {
    init_tracing();
    let data = "blog__name,name\nPets,Toys\nGardening,Tools\nPets,Food\n";

    let mut store = blog_store();
    let migration =
        Migration::for_entity(&store, "category", &MigrationOptions::default().natural_keys())
            .unwrap();
    let err = migration
        .import_data(&mut store, data, &csv("create"))
        .unwrap_err();
    assert!(matches!(err, MigrateError::UnresolvedForeignKey { ref value, .. } if value == "Gardening"));
    assert!(store.rows("category").unwrap().is_empty());

    let options = MigrationOptions::default()
        .natural_keys()
        .ignore_missing_foreign_keys();
    let migration = Migration::for_entity(&store, "category", &options).unwrap();
    let stats = migration.import_data(&mut store, data, &csv("create")).unwrap();
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.inserted, 2);
    assert_eq!(store.rows("category").unwrap().len(), 2);
}

#[test]
fn test_round_trip_with_natural_key() {
    init_tracing();
    let schema = EntitySchema::new("country")
        .with_field(SchemaField::auto_id("id"))
        .with_field(SchemaField::new("code", DataType::Text).unique())
        .with_field(SchemaField::new("member", DataType::Boolean))
        .with_field(SchemaField::new("joined", DataType::Date).nullable())
        .with_field(SchemaField::new("motto", DataType::Text).nullable());
    let rows = vec![
        row([
            ("code", Value::from("FR")),
            ("member", Value::Bool(true)),
            ("joined", Value::Date(NaiveDate::from_ymd_opt(1958, 1, 1).unwrap())),
            ("motto", Value::from("Liberté, égalité, fraternité")),
        ]),
        row([
            ("code", Value::from("NO")),
            ("member", Value::Bool(false)),
            ("joined", Value::Null),
            ("motto", Value::Null),
        ]),
    ];
    let mut source = MemoryStore::new().with_entity(schema.clone());
    source.insert_many("country", rows).unwrap();

    let options = MigrationOptions::default().natural_keys();
    for serializer in ["csv", "tsv", "json", "yaml"] {
        let exporter = Migration::for_entity(&source, "country", &options).unwrap();
        assert_eq!(exporter.headers(), vec!["code", "member", "joined", "motto"]);
        let text = exporter.export_to_string(&source, Some(serializer)).unwrap();

        let mut target = MemoryStore::new().with_entity(schema.clone());
        let importer = Migration::for_entity(&target, "country", &options).unwrap();
        importer
            .import_data(
                &mut target,
                &text,
                &ImportOptions::default()
                    .with_serializer(serializer)
                    .with_plan("direct"),
            )
            .unwrap();

        let strip = |rows: &[Row]| -> Vec<Row> {
            rows.iter()
                .map(|r| {
                    let mut r = r.clone();
                    r.remove("id");
                    r
                })
                .collect()
        };
        assert_eq!(
            strip(target.rows("country").unwrap()),
            strip(source.rows("country").unwrap()),
            "round trip through {}",
            serializer
        );
    }
}

#[test]
fn test_export_derived_attribute() {
    init_tracing();
    let mut store = MemoryStore::new().with_entity(
        EntitySchema::new("event")
            .with_field(SchemaField::auto_id("id"))
            .with_field(SchemaField::new("day", DataType::Date)),
    );
    store
        .insert_one(
            "event",
            row([("day", Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()))]),
        )
        .unwrap();

    let migration =
        Migration::for_fields(&store, "event", vec![Field::integer("id"), Field::year("day__year")])
            .unwrap();
    assert!(migration.requires_model_instances());
    let text = migration.export_to_string(&store, Some("csv")).unwrap();
    assert_eq!(text, "id,day__year\r\n1,2024\r\n");
}

// =============================================================================
// Catalog and facade
// =============================================================================

#[test]
fn test_custom_catalog_plan() {
    init_tracing();

    struct AppendPlan;

    impl ImportationPlan for AppendPlan {
        fn name(&self) -> &str {
            "append"
        }

        fn needs_create(&self) -> bool {
            true
        }

        fn import_batch(
            &self,
            migration: &Migration,
            store: &mut dyn RecordStore,
            batch: record_migrate::core::Batch,
        ) -> record_migrate::Result<record_migrate::plans::BatchOutcome> {
            DirectPlan.import_batch(migration, store, batch)
        }
    }

    let mut catalog = Catalog::with_builtins();
    catalog.register_plan(AppendPlan);
    let mut store = person_store();
    let migration = person_migration(&store).with_catalog(Arc::new(catalog));

    let stats = migration
        .import_data(&mut store, "id,name\n1,Alice\n", &csv("append"))
        .unwrap();
    assert_eq!(stats.inserted, 1);
}

#[test]
fn test_directory_restores_related_entities() {
    init_tracing();
    let mut source = blog_store();
    source
        .insert_many(
            "category",
            vec![
                row([("blog_id", Value::Int(7)), ("name", Value::from("Toys"))]),
                row([("blog_id", Value::Int(7)), ("name", Value::from("Food"))]),
            ],
        )
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let catalog = Arc::new(Catalog::with_builtins());
    let options = MigrationOptions::default().natural_keys();
    let entities = vec!["category".to_string(), "blog".to_string()];
    export_directory(&source, catalog.clone(), &entities, dir.path(), "yaml", &options).unwrap();

    let mut target = MemoryStore::new()
        .with_entity(source.schema("blog").unwrap())
        .with_entity(source.schema("category").unwrap());
    let imported = import_directory(
        &mut target,
        catalog,
        dir.path(),
        &options,
        &ImportOptions::default(),
    )
    .unwrap();

    assert_eq!(imported[0].0, "blog");
    assert_eq!(imported[1].1.inserted, 2);
    let blog_id = target.rows("blog").unwrap()[0]["id"].clone();
    assert!(target
        .rows("category")
        .unwrap()
        .iter()
        .all(|c| c["blog_id"] == blog_id));
}
