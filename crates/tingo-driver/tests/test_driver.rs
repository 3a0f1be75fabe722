//! End-to-end driver tests against the embedded store.
//!
//! Run with: cargo test -p tingo-driver --test test_driver

use bson::{doc, oid::ObjectId, Bson, Document};
use futures::TryStreamExt;
use tempfile::TempDir;
use tingo_driver::{
    create, create_from_json, Driver, DriverConfig, DriverError, Expression, IndexDescriptor,
    OrderDirection, QueryOptions, TingoDriver,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

async fn memory_driver() -> TingoDriver {
    init_tracing();
    create(DriverConfig::new("memory").mem_store(true))
        .await
        .unwrap()
}

async fn seed_people(driver: &TingoDriver) {
    let people = vec![
        doc! { "name": "ada", "age": 36, "team": "core" },
        doc! { "name": "bob", "age": 25, "team": "web" },
        doc! { "name": "cy", "age": 41, "team": "core" },
        doc! { "name": "dee", "age": 19, "team": "ops" },
        doc! { "name": "eve", "age": 52, "team": "web" },
    ];
    driver.create("people", people).await.unwrap();
}

fn names(rows: &[Document]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_str("name").unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_create_and_find_one() {
    let driver = memory_driver().await;

    let result = driver
        .create("people", vec![doc! { "name": "ada" }])
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.inserted_ids(), vec![Bson::Int64(1)]);

    let found = driver
        .find_one("people", Some(&Expression::eq("name", "ada")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("_id"), Some(&Bson::Int64(1)));

    let missing = driver
        .find_one("people", Some(&Expression::eq("name", "zed")))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_find_with_expression_tree() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let query = Expression::and(vec![
        Expression::gte("age", 20),
        Expression::or(vec![
            Expression::eq("team", "core"),
            Expression::regex("name", "^e"),
        ]),
    ]);
    let options = QueryOptions::new().order_by("age", OrderDirection::Desc);

    let mut cursor = driver.find("people", Some(&query), &options).await.unwrap();
    let rows = cursor.to_list().await.unwrap();
    assert_eq!(names(&rows), vec!["eve", "cy", "ada"]);
    cursor.close().await.unwrap();
}

#[tokio::test]
async fn test_find_not_and_in() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let query = Expression::and(vec![
        Expression::not(Expression::in_list(
            "team",
            vec![Bson::String("web".into()), Bson::String("ops".into())],
        )),
        Expression::not_in("name", vec![Bson::String("cy".into())]),
    ]);

    let mut cursor = driver
        .find("people", Some(&query), &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(names(&cursor.to_list().await.unwrap()), vec!["ada"]);
}

#[tokio::test]
async fn test_find_paginates_sorted_results() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let options = QueryOptions::new()
        .skip(1)
        .limit(2)
        .order_by("age", OrderDirection::Asc);
    let mut cursor = driver.find("people", None, &options).await.unwrap();
    assert_eq!(names(&cursor.to_list().await.unwrap()), vec!["bob", "ada"]);
}

#[tokio::test]
async fn test_cursor_close_twice() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let mut cursor = driver
        .find("people", None, &QueryOptions::new())
        .await
        .unwrap();
    assert!(cursor.next().await.unwrap().is_some());

    cursor.close().await.unwrap();
    assert!(cursor.is_closed());
    assert_eq!(cursor.next().await, Err(DriverError::CursorAlreadyClosed));
    assert_eq!(cursor.close().await, Err(DriverError::CursorAlreadyClosed));
}

#[tokio::test]
async fn test_cursor_next_surfaces_store_fetch_error() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let mut cursor = driver
        .find("people", Some(&Expression::regex("name", "(")), &QueryOptions::new())
        .await
        .unwrap();

    match cursor.next().await {
        Err(DriverError::Store { code, message }) => {
            assert_eq!(code, "query");
            assert!(message.contains("invalid regex '('"), "{}", message);
        }
        other => panic!("expected a store error, got {:?}", other),
    }
    assert!(!cursor.is_closed());
    cursor.close().await.unwrap();
}

#[tokio::test]
async fn test_cursor_stream() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let cursor = driver
        .find("people", Some(&Expression::eq("team", "web")), &QueryOptions::new())
        .await
        .unwrap();
    let rows: Vec<Document> = cursor.into_stream().try_collect().await.unwrap();
    assert_eq!(names(&rows), vec!["bob", "eve"]);
}

#[tokio::test]
async fn test_ensure_index_idempotent_and_conflict() {
    let driver = memory_driver().await;

    let index = IndexDescriptor::new("by_email")
        .field("email", OrderDirection::Asc)
        .unique(true);
    driver.ensure_index("users", &index).await.unwrap();
    driver.ensure_index("users", &index).await.unwrap();

    let conflicting = IndexDescriptor::new("by_email")
        .field("login", OrderDirection::Asc)
        .unique(true);
    let result = driver.ensure_index("users", &conflicting).await;
    assert!(matches!(result, Err(DriverError::IndexConflict(_))));
}

#[tokio::test]
async fn test_unique_index_violation_is_store_error() {
    let driver = memory_driver().await;

    let index = IndexDescriptor::new("by_email")
        .field("email", OrderDirection::Asc)
        .unique(true);
    driver.ensure_index("users", &index).await.unwrap();
    driver
        .create("users", vec![doc! { "email": "a@x.io" }])
        .await
        .unwrap();

    let err = driver
        .create("users", vec![doc! { "email": "a@x.io" }])
        .await
        .unwrap_err();
    assert!(err.is_store_error());
    assert!(matches!(err, DriverError::Store { ref code, .. } if code == "duplicate_key"));
}

#[tokio::test]
async fn test_save_replaces_document() {
    let driver = memory_driver().await;

    let created = driver
        .create("people", vec![doc! { "name": "ada", "age": 36, "team": "core" }])
        .await
        .unwrap();
    let id = created.inserted_ids()[0].clone();

    let modified = driver
        .save("people", doc! { "_id": id.clone() }, doc! { "name": "ada", "age": 37 })
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let stored = driver
        .find_one("people", Some(&Expression::eq("_id", id.clone())))
        .await
        .unwrap()
        .unwrap();
    // Whole-document replacement: fields missing from `data` are gone
    assert_eq!(stored, doc! { "_id": id, "name": "ada", "age": 37 });
}

#[tokio::test]
async fn test_save_and_remove_accept_store_operators() {
    let driver = memory_driver().await;
    seed_people(&driver).await;
    driver
        .create("people", vec![doc! { "name": "fay", "age": 30 }])
        .await
        .unwrap();

    let modified = driver
        .save(
            "people",
            doc! { "name": "ada" },
            doc! { "$inc": { "age": 1 }, "$unset": { "team": "" } },
        )
        .await
        .unwrap();
    assert_eq!(modified, 1);

    let ada = driver
        .find_one("people", Some(&Expression::eq("name", "ada")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ada.get_i32("age").unwrap(), 37);
    assert!(ada.get("team").is_none());

    let removed = driver
        .remove("people", doc! { "team": { "$exists": false } })
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_remove() {
    let driver = memory_driver().await;
    seed_people(&driver).await;

    let removed = driver
        .remove("people", doc! { "team": "web" })
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let mut cursor = driver
        .find("people", None, &QueryOptions::new())
        .await
        .unwrap();
    assert_eq!(cursor.to_list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_commit_and_rollback_always_succeed() {
    let driver = memory_driver().await;
    driver.commit().await.unwrap();
    driver.create("items", vec![doc! {}]).await.unwrap();
    driver.rollback().await.unwrap();
    driver.commit().await.unwrap();

    // Rolled back writes are not undone
    let mut cursor = driver.find("items", None, &QueryOptions::new()).await.unwrap();
    assert_eq!(cursor.to_list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ensure_collection_and_foreign_key() {
    let driver = memory_driver().await;

    let handle = driver
        .ensure_collection("orders", &["total".to_string()], &["_id".to_string()])
        .await
        .unwrap();
    assert_eq!(handle.name(), "orders");
    assert_eq!(handle.primary_key(), ["_id".to_string()]);

    // Idempotent
    driver
        .ensure_collection("orders", &["total".to_string()], &["_id".to_string()])
        .await
        .unwrap();

    driver
        .ensure_foreign_key("orders", "people", &["owner".to_string()])
        .await
        .unwrap();

    let invalid = driver.ensure_collection("a/b", &[], &[]).await;
    assert!(matches!(invalid, Err(DriverError::Store { ref code, .. }) if code == "invalid_name"));

    let invalid = driver.ensure_collection("items", &["$where".to_string()], &[]).await;
    assert!(matches!(invalid, Err(DriverError::Validation(_))));
}

#[tokio::test]
async fn test_operations_fail_after_close() {
    let driver = memory_driver().await;
    driver.close().await.unwrap();

    assert!(matches!(
        driver.find("people", None, &QueryOptions::new()).await,
        Err(DriverError::DriverClosed)
    ));
    assert_eq!(
        driver.create("people", vec![doc! {}]).await,
        Err(DriverError::DriverClosed)
    );
    assert_eq!(
        driver.remove("people", doc! {}).await,
        Err(DriverError::DriverClosed)
    );
    assert_eq!(driver.close().await, Err(DriverError::DriverClosed));
}

#[tokio::test]
async fn test_identifier_converter_round_trip() {
    init_tracing();
    let driver = create(DriverConfig::new("memory").mem_store(true).native_object_id(true))
        .await
        .unwrap();

    let created = driver.create("items", vec![doc! {}]).await.unwrap();
    let id = created.inserted_ids()[0].clone();
    assert!(matches!(id, Bson::ObjectId(_)));

    let raw_type = driver.coerce_type("identifier");
    let converter = driver.create_converter(raw_type);
    let rendered = converter.from_native(id.clone()).unwrap();
    assert_eq!(converter.to_native(rendered).unwrap(), id);

    assert!(matches!(
        converter.from_native(Bson::String("plain".into())),
        Err(DriverError::InvalidIdentifier(_))
    ));

    // Unmapped types fail open
    assert_eq!(driver.coerce_type("geometry"), "");
    let identity = driver.create_converter("");
    let oid = Bson::ObjectId(ObjectId::new());
    assert_eq!(identity.to_native(oid.clone()).unwrap(), oid);
}

#[tokio::test]
async fn test_on_disk_driver_survives_restart() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("db");
    let config = DriverConfig::new(path.to_string_lossy());

    {
        let driver = create(config.clone()).await.unwrap();
        driver
            .create("notes", vec![doc! { "text": "first" }, doc! { "text": "second" }])
            .await
            .unwrap();
        driver.close().await.unwrap();
    }

    let driver = create(config).await.unwrap();
    let mut cursor = driver
        .find(
            "notes",
            None,
            &QueryOptions::new().order_by("text", OrderDirection::Desc),
        )
        .await
        .unwrap();
    let rows = cursor.to_list().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("text").unwrap(), "second");
}

#[tokio::test]
async fn test_invalid_config_creates_nothing() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("db");

    let json = format!(
        r#"{{"path":"{}","cacheSize":0}}"#,
        path.to_string_lossy().replace('\\', "\\\\")
    );
    let result = create_from_json(&json).await;
    assert!(matches!(result, Err(DriverError::Validation(_))));
    assert!(!path.exists());

    let result = create(DriverConfig::new("")).await;
    assert!(matches!(result, Err(DriverError::Validation(_))));
}
