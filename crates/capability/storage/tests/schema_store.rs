use domain::{IotProperty, IotSchema, PropertyRule, PropertyType, ReadWrite, make_uuid};
use edge_storage::{Databases, DatacenterStore, SchemaStore, SqlValue, SqliteSchemaStore};
use tempfile::TempDir;

fn property(schema_id: &str, name: &str, kind: PropertyType) -> IotProperty {
    IotProperty {
        uuid: make_uuid("PROPERTY"),
        schema_id: schema_id.to_string(),
        name: name.to_string(),
        label: name.to_string(),
        kind,
        rw: ReadWrite::RW,
        unit: String::new(),
        description: String::new(),
        rule: PropertyRule::default(),
    }
}

fn ddl(schema_uuid: &str) -> Vec<String> {
    vec![format!(
        "CREATE TABLE IF NOT EXISTS \"data_center_{uuid}\" (\
         id INTEGER PRIMARY KEY AUTOINCREMENT, \
         create_at DATETIME DEFAULT CURRENT_TIMESTAMP, \
         temp REAL DEFAULT 0)",
        uuid = schema_uuid
    )]
}

#[tokio::test]
async fn publish_is_one_shot_and_reset_drops_table() {
    let dir = TempDir::new().expect("tempdir");
    let dbs = Databases::open_in_dir(dir.path()).await.expect("open");
    let store = SqliteSchemaStore::new(dbs.config.clone(), dbs.datacenter.clone());
    let datacenter = DatacenterStore::new(dbs.datacenter.clone());

    let schema = store
        .create_schema(IotSchema::new("weather"))
        .await
        .expect("create schema");
    store
        .create_property(property(&schema.uuid, "temp", PropertyType::Float))
        .await
        .expect("create property");

    assert!(store.publish(&schema.uuid, &ddl(&schema.uuid)).await.expect("publish"));
    assert!(!store.publish(&schema.uuid, &ddl(&schema.uuid)).await.expect("publish again"));
    let found = store.find_schema(&schema.uuid).await.expect("find").expect("schema");
    assert!(found.published);
    assert_eq!(
        datacenter.table_columns(&schema.uuid).await.expect("columns"),
        vec!["id", "create_at", "temp"]
    );

    let id = datacenter
        .insert_row(&schema.uuid, &[("temp".to_string(), SqlValue::Real(21.5))])
        .await
        .expect("insert");
    assert_eq!(id, 1);
    let rows = datacenter.latest_rows(&schema.uuid, 10).await.expect("latest");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains(&("temp".to_string(), SqlValue::Real(21.5))));

    assert!(store.reset(&schema.uuid).await.expect("reset"));
    assert!(!datacenter.table_exists(&schema.uuid).await.expect("exists"));
    let found = store.find_schema(&schema.uuid).await.expect("find").expect("schema");
    assert!(!found.published);
}

#[tokio::test]
async fn failed_ddl_leaves_schema_unpublished() {
    let dir = TempDir::new().expect("tempdir");
    let dbs = Databases::open_in_dir(dir.path()).await.expect("open");
    let store = SqliteSchemaStore::new(dbs.config.clone(), dbs.datacenter.clone());
    let schema = store
        .create_schema(IotSchema::new("broken"))
        .await
        .expect("create schema");

    let result = store
        .publish(&schema.uuid, &["CREATE TABLE (".to_string()])
        .await;
    assert!(result.is_err());
    let found = store.find_schema(&schema.uuid).await.expect("find").expect("schema");
    assert!(!found.published);
}

#[tokio::test]
async fn delete_published_schema_cascades() {
    let dir = TempDir::new().expect("tempdir");
    let dbs = Databases::open_in_dir(dir.path()).await.expect("open");
    let store = SqliteSchemaStore::new(dbs.config.clone(), dbs.datacenter.clone());
    let datacenter = DatacenterStore::new(dbs.datacenter.clone());

    let schema = store
        .create_schema(IotSchema::new("meter"))
        .await
        .expect("create schema");
    store
        .create_property(property(&schema.uuid, "temp", PropertyType::Float))
        .await
        .expect("create property");
    store.publish(&schema.uuid, &ddl(&schema.uuid)).await.expect("publish");

    assert!(store.delete_schema(&schema.uuid).await.expect("delete"));
    assert!(store.find_schema(&schema.uuid).await.expect("find").is_none());
    assert!(store.list_properties(&schema.uuid).await.expect("list").is_empty());
    assert!(!datacenter.table_exists(&schema.uuid).await.expect("exists"));
}

#[tokio::test]
async fn property_names_are_unique_per_schema() {
    let dir = TempDir::new().expect("tempdir");
    let dbs = Databases::open_in_dir(dir.path()).await.expect("open");
    let store = SqliteSchemaStore::new(dbs.config.clone(), dbs.datacenter.clone());
    let schema = store
        .create_schema(IotSchema::new("dup"))
        .await
        .expect("create schema");
    store
        .create_property(property(&schema.uuid, "temp", PropertyType::Float))
        .await
        .expect("first");
    assert!(
        store
            .create_property(property(&schema.uuid, "temp", PropertyType::Integer))
            .await
            .is_err()
    );
}
