//! Integration tests for on-disk databases.
//!
//! Run with: cargo test -p tingo-store --test test_persistence

use bson::{doc, Bson, Document};
use tempfile::TempDir;
use tingo_store::{Cursor, Db, IdentifierKind, IndexOptions, StoreError, StoreOptions};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn drain(mut cursor: Cursor) -> Vec<Document> {
    let mut docs = Vec::new();
    while let Some(doc) = cursor.next_document().unwrap() {
        docs.push(doc);
    }
    docs
}

#[test]
fn test_documents_survive_reopen() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Db::open(temp_dir.path(), StoreOptions::default()).unwrap();
        let users = db.collection("users").unwrap();
        users
            .insert(vec![
                doc! { "name": "alice", "age": 30 },
                doc! { "name": "bob", "age": 25 },
                doc! { "name": "carol", "age": 41 },
            ])
            .unwrap();
        users
            .update(doc! { "name": "bob" }, doc! { "$set": { "age": 26 } })
            .unwrap();
        users.remove(doc! { "name": "carol" }).unwrap();
        db.close().unwrap();
    }

    let db = Db::open(temp_dir.path(), StoreOptions::default()).unwrap();
    let users = db.collection("users").unwrap();
    assert_eq!(users.count(), 2);

    let bob = users.find_one(doc! { "name": "bob" }).unwrap().unwrap();
    assert_eq!(bob.get_i32("age").unwrap(), 26);
    assert_eq!(users.find_one(doc! { "name": "carol" }).unwrap(), None);

    // Sequence continues after the highest replayed identifier
    let inserted = users.insert(vec![doc! { "name": "dave" }]).unwrap();
    assert_eq!(inserted[0].get("_id"), Some(&Bson::Int64(4)));
}

#[test]
fn test_indexes_survive_reopen() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Db::open(temp_dir.path(), StoreOptions::default()).unwrap();
        let users = db.collection("users").unwrap();
        users
            .ensure_index(
                doc! { "email": 1 },
                IndexOptions {
                    name: None,
                    unique: true,
                },
            )
            .unwrap();
        users.insert(vec![doc! { "email": "a@x.io" }]).unwrap();
        db.close().unwrap();
    }

    let db = Db::open(temp_dir.path(), StoreOptions::default()).unwrap();
    let users = db.collection("users").unwrap();
    let indexes = users.indexes();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "email_1");
    assert!(indexes[0].unique);

    let result = users.insert(vec![doc! { "email": "a@x.io" }]);
    assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
}

#[test]
fn test_object_id_store() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let options = StoreOptions {
        identifier: IdentifierKind::ObjectId,
        ..StoreOptions::default()
    };

    let id = {
        let db = Db::open(temp_dir.path(), options.clone()).unwrap();
        let inserted = db
            .collection("events")
            .unwrap()
            .insert(vec![doc! { "kind": "login" }])
            .unwrap();
        db.close().unwrap();
        inserted[0].get("_id").cloned().unwrap()
    };

    let db = Db::open(temp_dir.path(), options).unwrap();
    let found = db
        .collection("events")
        .unwrap()
        .find_one(doc! { "_id": id.clone() })
        .unwrap()
        .unwrap();
    assert_eq!(found.get("_id"), Some(&id));
}

#[test]
fn test_search_in_array() {
    init_tracing();
    let docs = vec![
        doc! { "name": "post", "tags": [{ "label": "rust" }, { "label": "db" }] },
        doc! { "name": "note", "tags": [{ "label": "misc" }] },
    ];

    let plain = Db::open("plain", StoreOptions::in_memory()).unwrap();
    let posts = plain.collection("posts").unwrap();
    posts.insert(docs.clone()).unwrap();
    assert_eq!(drain(posts.find(doc! { "tags.label": "rust" })).len(), 0);

    let options = StoreOptions {
        search_in_array: true,
        ..StoreOptions::in_memory()
    };
    let searching = Db::open("searching", options).unwrap();
    let posts = searching.collection("posts").unwrap();
    posts.insert(docs).unwrap();
    let found = drain(posts.find(doc! { "tags.label": "rust" }));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("name").unwrap(), "post");
}

#[test]
fn test_sorted_pagination() {
    init_tracing();
    let db = Db::open("memory", StoreOptions::in_memory()).unwrap();
    let items = db.collection("items").unwrap();
    items
        .insert(
            ["pear", "apple", "fig", "kiwi", "date"]
                .iter()
                .map(|name| doc! { "name": *name })
                .collect(),
        )
        .unwrap();

    let mut cursor = items.find(doc! {});
    cursor.sort(vec![("name".to_string(), 1)]).skip(1).limit(2);
    let names: Vec<String> = drain(cursor)
        .iter()
        .map(|d| d.get_str("name").unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["date", "fig"]);
}
