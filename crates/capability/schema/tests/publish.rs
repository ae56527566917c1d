use domain::{PropertyRule, Value};
use edge_cache::{DATA_SCHEMA_SLOT, InterCache};
use edge_schema::{DataSchemaCache, PropertyInput, SchemaError, SchemaPublisher};
use edge_storage::{Databases, DatacenterStore, SqlValue, SqliteSchemaStore};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    inter: Arc<InterCache>,
    publisher: SchemaPublisher,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let dbs = Databases::open_in_dir(dir.path()).await.expect("open");
    let store = Arc::new(SqliteSchemaStore::new(dbs.config.clone(), dbs.datacenter.clone()));
    let inter = Arc::new(InterCache::new());
    let cache = Arc::new(DataSchemaCache::new(inter.clone()));
    let publisher = SchemaPublisher::new(store, DatacenterStore::new(dbs.datacenter.clone()), cache);
    Fixture {
        _dir: dir,
        inter,
        publisher,
    }
}

fn temp_input() -> PropertyInput {
    PropertyInput {
        name: "temp".to_string(),
        label: "Temperature".to_string(),
        kind: "FLOAT".to_string(),
        rw: "R".to_string(),
        rule: PropertyRule {
            min: Some(0.0),
            max: Some(100.0),
            default_value: Some(json!(0)),
            round: Some(2),
            ..PropertyRule::default()
        },
        ..PropertyInput::default()
    }
}

fn input(name: &str, kind: &str) -> PropertyInput {
    PropertyInput {
        name: name.to_string(),
        kind: kind.to_string(),
        rw: "RW".to_string(),
        ..PropertyInput::default()
    }
}

#[tokio::test]
async fn publish_cycle_builds_projection_table() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("S", "").await.expect("schema");
    fx.publisher
        .add_property(&schema.uuid, temp_input())
        .await
        .expect("property");

    fx.publisher.publish(&schema.uuid).await.expect("publish");

    let dc = fx.publisher.datacenter();
    assert_eq!(
        dc.table_columns(&schema.uuid).await.expect("columns"),
        vec!["id", "create_at", "temp"]
    );
    assert_eq!(
        dc.table_objects(&schema.uuid, "index").await.expect("indexes"),
        vec![
            format!("idx_create_at_{}", schema.uuid),
            format!("idx_id_{}", schema.uuid)
        ]
    );
    assert_eq!(
        dc.table_objects(&schema.uuid, "trigger").await.expect("triggers"),
        vec![schema.uuid.clone()]
    );

    let err = fx.publisher.publish(&schema.uuid).await.expect_err("republish");
    assert_eq!(err.to_string(), "Data Schema Already published");

    assert!(fx.publisher.cache().get(&schema.uuid, "temp").is_some());
    assert!(fx.inter.get_value(DATA_SCHEMA_SLOT, "temp").is_some());
}

#[tokio::test]
async fn projection_table_keeps_rolling_window() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("window", "").await.expect("schema");
    fx.publisher
        .add_property(&schema.uuid, temp_input())
        .await
        .expect("property");
    fx.publisher.publish(&schema.uuid).await.expect("publish");

    let dc = fx.publisher.datacenter();
    let table = format!("data_center_{}", schema.uuid);
    let mut tx = dc.pool.begin().await.expect("begin");
    for n in 0..10_099 {
        sqlx::query(&format!("INSERT INTO \"{}\" (temp) VALUES (?)", table))
            .bind(n as f64)
            .execute(&mut *tx)
            .await
            .expect("insert");
    }
    tx.commit().await.expect("commit");
    // 只在行数到达整百时裁剪
    assert_eq!(dc.count_rows(&schema.uuid).await.expect("count"), 10_099);

    let id = dc
        .insert_row(&schema.uuid, &[("temp".to_string(), SqlValue::Real(1.0))])
        .await
        .expect("insert row");
    assert_eq!(id, 10_100);
    assert_eq!(dc.count_rows(&schema.uuid).await.expect("count"), 10_000);
    let oldest: (i64,) = sqlx::query_as(&format!("SELECT MIN(id) FROM \"{}\"", table))
        .fetch_one(&dc.pool)
        .await
        .expect("oldest");
    assert_eq!(oldest.0, 101);
}

#[tokio::test]
async fn columns_follow_newest_property_first() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("multi", "").await.expect("schema");
    for (name, kind) in [("a", "STRING"), ("b", "INTEGER"), ("c", "BOOL"), ("d", "GEO")] {
        fx.publisher
            .add_property(&schema.uuid, input(name, kind))
            .await
            .expect("property");
    }
    fx.publisher.publish(&schema.uuid).await.expect("publish");

    let properties = fx.publisher.list_properties(&schema.uuid).await.expect("list");
    let mut expected = vec!["id".to_string(), "create_at".to_string()];
    expected.extend(properties.iter().map(|p| p.name.clone()));
    assert_eq!(
        fx.publisher
            .datacenter()
            .table_columns(&schema.uuid)
            .await
            .expect("columns"),
        expected
    );
}

#[tokio::test]
async fn publish_requires_a_property() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("empty", "").await.expect("schema");
    let err = fx.publisher.publish(&schema.uuid).await.expect_err("empty");
    assert_eq!(err.to_string(), "Must contain at least one property");
    assert!(!fx.publisher.get_schema(&schema.uuid).await.expect("get").published);
}

#[tokio::test]
async fn fix_drops_table_and_keeps_properties() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("S", "").await.expect("schema");
    fx.publisher
        .add_property(&schema.uuid, temp_input())
        .await
        .expect("property");
    fx.publisher.publish(&schema.uuid).await.expect("publish");

    let mut row = BTreeMap::new();
    row.insert("temp".to_string(), Value::Float(21.5));
    fx.publisher.write(&schema.uuid, &row).await.expect("write 1");
    fx.publisher.write(&schema.uuid, &row).await.expect("write 2");

    // 已发布时属性不可变
    let err = fx
        .publisher
        .add_property(&schema.uuid, input("humidity", "FLOAT"))
        .await
        .expect_err("locked");
    assert_eq!(err.to_string(), "Data Schema Already published");

    fx.publisher.fix(&schema.uuid).await.expect("fix");

    assert!(!fx.publisher.get_schema(&schema.uuid).await.expect("get").published);
    assert!(
        !fx.publisher
            .datacenter()
            .table_exists(&schema.uuid)
            .await
            .expect("exists")
    );
    assert!(fx.publisher.cache().get(&schema.uuid, "temp").is_none());
    assert!(fx.inter.get_value(DATA_SCHEMA_SLOT, "temp").is_none());
    assert_eq!(
        fx.publisher.list_properties(&schema.uuid).await.expect("list").len(),
        1
    );
    fx.publisher
        .add_property(&schema.uuid, input("humidity", "FLOAT"))
        .await
        .expect("editable again");
}

#[tokio::test]
async fn writes_are_validated_against_the_cache() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("S", "").await.expect("schema");
    fx.publisher
        .add_property(&schema.uuid, temp_input())
        .await
        .expect("property");

    let mut row = BTreeMap::new();
    row.insert("temp".to_string(), Value::Float(50.0));
    assert!(matches!(
        fx.publisher.write(&schema.uuid, &row).await,
        Err(SchemaError::Validation(_))
    ));

    fx.publisher.publish(&schema.uuid).await.expect("publish");
    let id = fx.publisher.write(&schema.uuid, &row).await.expect("write");
    assert_eq!(id, 1);

    row.insert("temp".to_string(), Value::Float(100.0));
    assert!(matches!(
        fx.publisher.write(&schema.uuid, &row).await,
        Err(SchemaError::InvalidValue { .. })
    ));

    let mut unknown = BTreeMap::new();
    unknown.insert("pressure".to_string(), Value::Float(1.0));
    let err = fx.publisher.write(&schema.uuid, &unknown).await.expect_err("unknown");
    assert_eq!(err.to_string(), "unknown property: pressure");

    let latest = fx.publisher.query_latest(&schema.uuid, 10).await.expect("latest");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0]["temp"], json!(50.0));
    assert_eq!(latest[0]["id"], json!(1));
}

#[tokio::test]
async fn property_input_is_checked() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("S", "").await.expect("schema");

    let err = fx
        .publisher
        .add_property(&schema.uuid, input("x", "DECIMAL"))
        .await
        .expect_err("type");
    assert_eq!(err.to_string(), "invalid property type: DECIMAL");

    let mut bad_rw = input("x", "FLOAT");
    bad_rw.rw = "X".to_string();
    let err = fx
        .publisher
        .add_property(&schema.uuid, bad_rw)
        .await
        .expect_err("rw");
    assert_eq!(err.to_string(), "RW Value Only Support 'R' or 'W' or 'RW'");

    let err = fx
        .publisher
        .add_property(&schema.uuid, input("create_at", "STRING"))
        .await
        .expect_err("reserved");
    assert_eq!(err.to_string(), "invalid property name: create_at");

    fx.publisher
        .add_property(&schema.uuid, input("x", "FLOAT"))
        .await
        .expect("first");
    let err = fx
        .publisher
        .add_property(&schema.uuid, input("x", "INTEGER"))
        .await
        .expect_err("duplicate");
    assert_eq!(err.to_string(), "Already Exists Property:x");
}

#[tokio::test]
async fn deleting_published_schema_removes_everything() {
    let fx = fixture().await;
    let schema = fx.publisher.create_schema("S", "").await.expect("schema");
    fx.publisher
        .add_property(&schema.uuid, temp_input())
        .await
        .expect("property");
    fx.publisher.publish(&schema.uuid).await.expect("publish");

    fx.publisher.delete_schema(&schema.uuid).await.expect("delete");
    assert!(matches!(
        fx.publisher.get_schema(&schema.uuid).await,
        Err(SchemaError::NotFound(_))
    ));
    assert!(fx.publisher.cache().is_empty());
    assert!(
        !fx.publisher
            .datacenter()
            .table_exists(&schema.uuid)
            .await
            .expect("exists")
    );
}
