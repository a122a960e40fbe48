//! Tests for sessions
//!
//! These tests verify:
//! - Save / load round trips and the identity cache
//! - Entity lifecycle rules (create, set, save, delete, refresh, copy)
//! - Unit-of-work commit and rollback
//! - Lookups by unique and range-indexed columns
//! - Composite uniqueness end to end
//! - Relationship resolution and on-delete behavior, including cascade
//!   cycles and restrictions deep in the graph

#[path = "../common/mod.rs"]
mod common;

use std::ops::Bound;
use std::sync::Arc;

use common::{id_of, insert, memory_db, user_model};
use kvmodel::store::Command;
use kvmodel::{
    Column, Config, Database, GetByOptions, Lookup, MemoryStore, ModelDef, ModelError, OnDelete,
    Schema, Store, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn ids(entities: &[kvmodel::Entity]) -> Vec<i64> {
    entities.iter().map(id_of).collect()
}

fn seed_users(session: &kvmodel::Session, user: &Arc<Schema>, count: i64) -> Vec<i64> {
    (0..count)
        .map(|i| {
            let entity = insert(
                session,
                user,
                &[
                    ("email", Value::from(format!("user{}@example.com", i))),
                    ("age", Value::from(20 + i)),
                ],
            );
            id_of(&entity)
        })
        .collect()
}

fn library(on_delete: OnDelete) -> (Arc<MemoryStore>, Database, Arc<Schema>, Arc<Schema>) {
    let (store, db) = memory_db(true);
    let author = db
        .register(
            ModelDef::new("Author")
                .column("name", Column::string())
                .column("books", Column::one_to_many("Book")),
        )
        .unwrap();
    let book = db
        .register(
            ModelDef::new("Book")
                .column("title", Column::string())
                .column("author", Column::many_to_one("Author").on_delete(on_delete)),
        )
        .unwrap();
    (store, db, author, book)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_save_and_fetch_round_trip() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();

    let id = {
        let session = db.session();
        let entity = insert(
            &session,
            &user,
            &[
                ("email", Value::from("a@example.com")),
                ("name", Value::from("Alice")),
                ("age", Value::from(30)),
                ("score", Value::from(2.5)),
                ("active", Value::from(false)),
            ],
        );
        assert!(!entity.is_new());
        assert!(!entity.is_modified());
        id_of(&entity)
    };

    let session = db.session();
    let loaded = session.get(&user, id).unwrap().unwrap();
    assert_eq!(loaded.get("email").unwrap(), Value::from("a@example.com"));
    assert_eq!(loaded.get("name").unwrap(), Value::from("Alice"));
    assert_eq!(loaded.get("age").unwrap(), Value::Integer(30));
    assert_eq!(loaded.get("score").unwrap(), Value::Float(2.5));
    assert_eq!(loaded.get("active").unwrap(), Value::Boolean(false));
    assert_eq!(loaded.id(), Some(id));
}

#[test]
fn test_ids_are_assigned_in_sequence() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    assert_eq!(seed_users(&session, &user, 3), vec![1, 2, 3]);
}

#[test]
fn test_column_default_applied() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let entity = session
        .create(&user, [("email", Value::from("a@example.com"))])
        .unwrap();
    assert_eq!(entity.get("active").unwrap(), Value::Boolean(true));
    assert_eq!(entity.get("age").unwrap(), Value::Null);
    assert_eq!(entity.id(), None);
}

// =============================================================================
// Identity Cache Tests
// =============================================================================

#[test]
fn test_identity_cache_returns_same_instance() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let saved = insert(&session, &user, &[("email", Value::from("a@example.com"))]);

    let loaded = session.get(&user, id_of(&saved)).unwrap().unwrap();
    assert!(loaded.same_instance(&saved));

    // A different unit of work gets its own instance
    let other = db.session().get(&user, id_of(&saved)).unwrap().unwrap();
    assert!(!other.same_instance(&saved));
}

#[test]
fn test_identity_cache_does_not_keep_entities_alive() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let id = id_of(&insert(&session, &user, &[("email", Value::from("a@example.com"))]));

    let first = session.get(&user, id).unwrap().unwrap();
    first.set("age", 41).unwrap();
    drop(first);

    // The modified instance is gone; a fresh copy is loaded
    let second = session.get(&user, id).unwrap().unwrap();
    assert_eq!(second.get("age").unwrap(), Value::Null);
}

#[test]
fn test_identity_cache_disabled() {
    let store = Arc::new(MemoryStore::new());
    let db = Database::open(Config::builder().identity_cache(false).build(), store);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let saved = insert(&session, &user, &[("email", Value::from("a@example.com"))]);

    let loaded = session.get(&user, id_of(&saved)).unwrap().unwrap();
    assert!(!loaded.same_instance(&saved));
    assert_eq!(loaded.get("email").unwrap(), saved.get("email").unwrap());
}

#[test]
fn test_get_many_keeps_order_and_skips_missing() {
    let store = Arc::new(MemoryStore::new());
    let db = Database::open(Config::builder().fetch_batch_size(1).build(), store);
    let user = db.register(user_model()).unwrap();
    seed_users(&db.session(), &user, 3);

    let session = db.session();
    let found = session.get_many(&user, &[3, 1, 99, 2]).unwrap();
    assert_eq!(ids(&found), vec![3, 1, 2]);
    assert!(session.get(&user, 99).unwrap().is_none());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_unchanged_save_writes_nothing() {
    let (store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let entity = insert(&session, &user, &[("email", Value::from("a@example.com"))]);

    let writes = store.write_count();
    assert_eq!(session.save(&entity, false).unwrap(), 0);
    assert_eq!(store.write_count(), writes);

    // A forced save rewrites every column
    assert!(session.save(&entity, true).unwrap() > 0);
    assert!(store.write_count() > writes);
}

#[test]
fn test_create_rejects_bad_fields() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let explicit_id = session.create(&user, [("id", Value::from(5))]);
    assert!(matches!(explicit_id, Err(ModelError::InvalidOperation(_))));

    let unknown = session.create(&user, [("nope", Value::from(5))]);
    assert!(matches!(unknown, Err(ModelError::Column(_))));

    let wrong_type = session.create(&user, [("age", Value::from("old"))]);
    assert!(matches!(wrong_type, Err(ModelError::Column(_))));
}

#[test]
fn test_required_column_checked_on_save() {
    let (store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let entity = session.create(&user, [("age", Value::from(3))]).unwrap();
    let result = session.save(&entity, false);

    assert!(matches!(result, Err(ModelError::MissingColumn(_))));
    assert!(entity.is_new());
    assert_eq!(store.key_count(), 0);
}

#[test]
fn test_primary_key_cannot_change() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let entity = insert(&session, &user, &[("email", Value::from("a@example.com"))]);

    entity.set("id", id_of(&entity)).unwrap();
    let result = entity.set("id", id_of(&entity) + 1);
    assert!(matches!(result, Err(ModelError::InvalidOperation(_))));
}

#[test]
fn test_deleted_entity_cannot_be_saved() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let entity = insert(&session, &user, &[("email", Value::from("a@example.com"))]);

    session.delete(&entity).unwrap();
    let result = session.save(&entity, false);
    assert!(matches!(result, Err(ModelError::InvalidOperation(_))));

    // Deleting twice is harmless
    session.delete(&entity).unwrap();
}

#[test]
fn test_unsaved_entity_cannot_be_deleted() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let entity = session
        .create(&user, [("email", Value::from("a@example.com"))])
        .unwrap();

    assert!(matches!(
        session.delete(&entity),
        Err(ModelError::InvalidOperation(_))
    ));
}

#[test]
fn test_refresh_rules() {
    let (store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let unsaved = session
        .create(&user, [("email", Value::from("a@example.com"))])
        .unwrap();
    assert!(matches!(
        session.refresh(&unsaved, false),
        Err(ModelError::InvalidOperation(_))
    ));

    let entity = insert(
        &session,
        &user,
        &[("email", Value::from("b@example.com")), ("age", Value::from(30))],
    );
    let key = format!("User:{}", id_of(&entity));

    // Picks up a change made by another client
    store
        .apply(vec![Command::HSet {
            key: key.clone(),
            fields: vec![("age".to_string(), "99".to_string())],
        }])
        .unwrap();
    session.refresh(&entity, false).unwrap();
    assert_eq!(entity.get("age").unwrap(), Value::Integer(99));

    entity.set("age", 1).unwrap();
    assert!(matches!(
        session.refresh(&entity, false),
        Err(ModelError::InvalidOperation(_))
    ));
    session.refresh(&entity, true).unwrap();
    assert_eq!(entity.get("age").unwrap(), Value::Integer(99));
    assert!(!entity.is_modified());
}

#[test]
fn test_copy_is_new_entity() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let original = insert(
        &session,
        &user,
        &[("email", Value::from("a@example.com")), ("age", Value::from(30))],
    );

    let copy = session.copy(&original).unwrap();
    assert!(copy.is_new());
    assert_eq!(copy.id(), None);
    assert_eq!(copy.get("age").unwrap(), Value::Integer(30));

    // Same unique value as the original
    assert!(session.save(&copy, false).unwrap_err().is_unique_violation());

    copy.set("email", "b@example.com").unwrap();
    session.save(&copy, false).unwrap();
    assert_ne!(copy.id(), original.id());
}

#[test]
fn test_commit_saves_pending_and_modified() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let loaded = insert(&session, &user, &[("email", Value::from("a@example.com"))]);
    let first = session
        .create(&user, [("email", Value::from("b@example.com"))])
        .unwrap();
    let second = session
        .create(&user, [("email", Value::from("c@example.com"))])
        .unwrap();
    loaded.set("age", 50).unwrap();

    assert_eq!(session.commit().unwrap(), 3);
    assert!(!first.is_new());
    assert!(!second.is_new());
    assert!(!loaded.is_modified());
    assert_eq!(session.commit().unwrap(), 0);

    let fresh = db.session().get(&user, id_of(&loaded)).unwrap().unwrap();
    assert_eq!(fresh.get("age").unwrap(), Value::Integer(50));
}

#[test]
fn test_rollback_forgets_everything() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let saved = insert(&session, &user, &[("email", Value::from("a@example.com"))]);
    let pending = session
        .create(&user, [("email", Value::from("b@example.com"))])
        .unwrap();

    session.rollback();
    assert_eq!(session.commit().unwrap(), 0);
    assert!(pending.is_new());

    let reloaded = session.get(&user, id_of(&saved)).unwrap().unwrap();
    assert!(!reloaded.same_instance(&saved));
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_get_by_unique() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let users = seed_users(&session, &user, 3);

    let one = session
        .get_one_by(&user, "email", "user1@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(id_of(&one), users[1]);

    let many = session
        .get_by(
            &user,
            "email",
            Lookup::Any(vec![
                Value::from("user2@example.com"),
                Value::from("missing@example.com"),
                Value::from("user0@example.com"),
            ]),
            GetByOptions::default(),
        )
        .unwrap();
    assert_eq!(ids(&many), vec![users[2], users[0]]);

    assert!(session
        .get_one_by(&user, "email", "missing@example.com")
        .unwrap()
        .is_none());
}

#[test]
fn test_get_by_range() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let users = seed_users(&session, &user, 5);

    let exact = session
        .get_by(&user, "age", Lookup::Eq(Value::from(22)), GetByOptions::default())
        .unwrap();
    assert_eq!(ids(&exact), vec![users[2]]);

    let open_ended = session
        .get_by(
            &user,
            "age",
            Lookup::Range(Some(Value::from(21)), None),
            GetByOptions::default(),
        )
        .unwrap();
    assert_eq!(ids(&open_ended), users[1..].to_vec());

    let page = session
        .get_by(
            &user,
            "age",
            Lookup::Range(None, Some(Value::from(23))),
            GetByOptions::limit(1, 2),
        )
        .unwrap();
    assert_eq!(ids(&page), vec![users[1], users[2]]);

    // Integers widen for float columns
    let none = session
        .get_by(
            &user,
            "score",
            Lookup::Range(Some(Value::from(1)), Some(Value::from(2.5))),
            GetByOptions::default(),
        )
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_get_by_delegates_to_query() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let alice = insert(
        &session,
        &user,
        &[("email", Value::from("a@example.com")), ("name", Value::from("alice"))],
    );
    insert(
        &session,
        &user,
        &[("email", Value::from("b@example.com")), ("name", Value::from("bob"))],
    );

    let found = session
        .get_by(&user, "name", Lookup::Eq(Value::from("alice")), GetByOptions::default())
        .unwrap();
    assert_eq!(ids(&found), vec![id_of(&alice)]);

    let inactive = session
        .get_by(&user, "active", Lookup::Eq(Value::from(false)), GetByOptions::default())
        .unwrap();
    assert!(inactive.is_empty());
}

#[test]
fn test_get_by_request_errors() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();

    let unique_range = session.get_by(
        &user,
        "email",
        Lookup::Range(None, None),
        GetByOptions::default(),
    );
    assert!(matches!(unique_range, Err(ModelError::Request(_))));

    let unindexed = session.get_by(&user, "id", Lookup::Eq(Value::from(1)), GetByOptions::default());
    assert!(matches!(unindexed, Err(ModelError::Request(_))));

    let negative = session.get_by(
        &user,
        "age",
        Lookup::Range(None, None),
        GetByOptions::limit(-1, 5),
    );
    assert!(matches!(negative, Err(ModelError::Request(_))));

    let text_range = session.get_by(
        &user,
        "age",
        Lookup::Range(Some(Value::from(true)), None),
        GetByOptions::default(),
    );
    assert!(text_range.is_err());
}

#[test]
fn test_numeric_option_prefers_range_index() {
    let (_store, db) = memory_db(true);
    let item = db
        .register(ModelDef::new("Item").column("code", Column::integer().unique().index()))
        .unwrap();
    let session = db.session();
    for code in [10, 20, 30] {
        insert(&session, &item, &[("code", Value::from(code))]);
    }

    let range = Lookup::Range(Some(Value::from(15)), Some(Value::from(35)));
    let unique_lookup = session.get_by(&item, "code", range.clone(), GetByOptions::default());
    assert!(matches!(unique_lookup, Err(ModelError::Request(_))));

    let scanned = session
        .get_by(&item, "code", range, GetByOptions::default().numeric())
        .unwrap();
    assert_eq!(ids(&scanned), vec![2, 3]);
}

#[test]
fn test_index_update_moves_entity() {
    let (_store, db) = memory_db(true);
    let user = db.register(user_model()).unwrap();
    let session = db.session();
    let entity = insert(
        &session,
        &user,
        &[("email", Value::from("a@example.com")), ("age", Value::from(30))],
    );

    entity.set("age", 31).unwrap();
    session.save(&entity, false).unwrap();

    let old = session
        .get_by(&user, "age", Lookup::Eq(Value::from(30)), GetByOptions::default())
        .unwrap();
    let new = session
        .get_by(&user, "age", Lookup::Eq(Value::from(31)), GetByOptions::default())
        .unwrap();
    assert!(old.is_empty());
    assert_eq!(ids(&new), vec![id_of(&entity)]);
}

// =============================================================================
// Composite Unique Tests
// =============================================================================

#[test]
fn test_composite_unique_end_to_end() {
    let (store, db) = memory_db(true);
    let pair = db
        .register(
            ModelDef::new("Pair")
                .column("x", Column::integer())
                .column("y", Column::integer())
                .unique_together(&["x", "y"]),
        )
        .unwrap();
    let session = db.session();

    insert(&session, &pair, &[("x", Value::from(1)), ("y", Value::from(1))]);
    insert(&session, &pair, &[("x", Value::from(1)), ("y", Value::from(2))]);

    let clash = session
        .create(&pair, [("x", Value::from(1)), ("y", Value::from(1))])
        .unwrap();
    match session.save(&clash, false) {
        Err(ModelError::UniqueViolation { column, .. }) => assert_eq!(column, "x:y"),
        other => panic!("expected a unique violation, got {:?}", other),
    }
    assert!(!store.exists(&format!("Pair:{}", id_of(&clash))).unwrap());

    // A null component exempts the tuple
    insert(&session, &pair, &[("x", Value::from(1))]);
    insert(&session, &pair, &[("x", Value::from(1))]);
}

// =============================================================================
// Relationship Tests
// =============================================================================

#[test]
fn test_related_resolves_one_to_many() {
    let (_store, db, author, book) = library(OnDelete::NoAction);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let other = insert(&session, &author, &[("name", Value::from("Bo"))]);
    let a = insert(
        &session,
        &book,
        &[("title", Value::from("A")), ("author", Value::from(id_of(&writer)))],
    );
    let b = insert(
        &session,
        &book,
        &[("title", Value::from("B")), ("author", Value::from(id_of(&writer)))],
    );

    let books = session.related(&writer, "books").unwrap();
    assert_eq!(ids(&books), vec![id_of(&a), id_of(&b)]);
    assert!(session.related(&other, "books").unwrap().is_empty());
    assert!(session.related(&writer, "name").is_err());
}

#[test]
fn test_on_delete_restrict() {
    let (store, db, author, book) = library(OnDelete::Restrict);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    insert(
        &session,
        &book,
        &[("title", Value::from("A")), ("author", Value::from(id_of(&writer)))],
    );
    let writes = store.write_count();

    let result = session.delete(&writer);
    assert!(matches!(result, Err(ModelError::Restrict(_))));
    assert!(!writer.is_deleted());
    assert_eq!(store.write_count(), writes);
    assert!(session.get(&author, id_of(&writer)).unwrap().is_some());
}

#[test]
fn test_on_delete_cascade() {
    let (store, db, author, book) = library(OnDelete::Cascade);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let a = insert(
        &session,
        &book,
        &[("title", Value::from("A")), ("author", Value::from(id_of(&writer)))],
    );

    session.delete(&writer).unwrap();

    assert!(a.is_deleted());
    assert!(session.get(&book, id_of(&a)).unwrap().is_none());
    assert!(store.keys_with_prefix("Book:").iter().all(|k| k == "Book:id:"));
}

#[test]
fn test_on_delete_set_null() {
    let (store, db, author, book) = library(OnDelete::SetNull);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let a = insert(
        &session,
        &book,
        &[("title", Value::from("A")), ("author", Value::from(id_of(&writer)))],
    );

    session.delete(&writer).unwrap();

    assert!(!a.is_deleted());
    assert_eq!(a.get("author").unwrap(), Value::Null);
    let key = format!("Book:{}", id_of(&a));
    assert_eq!(store.hget(&key, "author").unwrap(), None);
    assert_eq!(store.hget(&key, "title").unwrap().as_deref(), Some("A"));
}

// =============================================================================
// On-Delete Graph Tests
// =============================================================================

/// Author <- Book <- Review, with the two reference rules given
fn shelf(
    book_rule: OnDelete,
    review_rule: OnDelete,
) -> (Arc<MemoryStore>, Database, Arc<Schema>, Arc<Schema>, Arc<Schema>) {
    let (store, db) = memory_db(true);
    let author = db
        .register(ModelDef::new("Author").column("name", Column::string()))
        .unwrap();
    let book = db
        .register(
            ModelDef::new("Book")
                .column("title", Column::string())
                .column("author", Column::many_to_one("Author").on_delete(book_rule)),
        )
        .unwrap();
    let review = db
        .register(
            ModelDef::new("Review")
                .column("body", Column::string())
                .column("book", Column::many_to_one("Book").on_delete(review_rule)),
        )
        .unwrap();
    (store, db, author, book, review)
}

fn row_exists(store: &MemoryStore, namespace: &str, entity: &kvmodel::Entity) -> bool {
    store
        .exists(&format!("{}:{}", namespace, id_of(entity)))
        .unwrap()
}

#[test]
fn test_cascade_cycle_terminates() {
    let (store, db) = memory_db(true);
    let node = db
        .register(
            ModelDef::new("Node")
                .column("label", Column::string())
                .column("peer", Column::many_to_one("Node").on_delete(OnDelete::Cascade)),
        )
        .unwrap();
    let session = db.session();

    // a -> b -> c -> a, plus an unrelated d
    let a = insert(&session, &node, &[("label", Value::from("a"))]);
    let b = insert(
        &session,
        &node,
        &[("label", Value::from("b")), ("peer", Value::from(id_of(&a)))],
    );
    let c = insert(
        &session,
        &node,
        &[("label", Value::from("c")), ("peer", Value::from(id_of(&b)))],
    );
    a.set("peer", id_of(&c)).unwrap();
    session.save(&a, false).unwrap();
    let d = insert(&session, &node, &[("label", Value::from("d"))]);

    session.delete(&b).unwrap();

    for entity in [&a, &b, &c] {
        assert!(entity.is_deleted());
        assert!(!row_exists(&store, "Node", entity));
    }
    assert!(!d.is_deleted());
    assert!(row_exists(&store, "Node", &d));
    let peers = store
        .zrange_by_score("Node:peer:idx", Bound::Unbounded, Bound::Unbounded, None)
        .unwrap();
    assert!(peers.is_empty());
}

#[test]
fn test_self_reference_pair_cascade() {
    let (store, db) = memory_db(false);
    let node = db
        .register(
            ModelDef::new("Node")
                .column("peer", Column::many_to_one("Node").on_delete(OnDelete::Cascade)),
        )
        .unwrap();
    let session = db.session();
    let a = insert(&session, &node, &[]);
    let b = insert(&session, &node, &[("peer", Value::from(id_of(&a)))]);
    a.set("peer", id_of(&b)).unwrap();
    session.save(&a, false).unwrap();

    session.delete(&a).unwrap();

    assert!(a.is_deleted());
    assert!(b.is_deleted());
    assert_eq!(store.keys_with_prefix("Node"), vec!["Node:id:".to_string()]);
}

#[test]
fn test_multi_level_cascade() {
    let (store, db, author, book, review) = shelf(OnDelete::Cascade, OnDelete::Cascade);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let first = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    let second = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    let note = insert(&session, &review, &[("book", Value::from(id_of(&second)))]);

    session.delete(&writer).unwrap();

    for entity in [&writer, &first, &second, &note] {
        assert!(entity.is_deleted());
    }
    assert!(!row_exists(&store, "Book", &first));
    assert!(!row_exists(&store, "Review", &note));
    assert!(session.get(&review, id_of(&note)).unwrap().is_none());
}

#[test]
fn test_restrict_below_cascade_blocks_whole_delete() {
    let (store, db, author, book, review) = shelf(OnDelete::Cascade, OnDelete::Restrict);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let first = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    let second = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    insert(&session, &review, &[("book", Value::from(id_of(&second)))]);
    let writes = store.write_count();

    let result = session.delete(&writer);

    assert!(matches!(result, Err(ModelError::Restrict(_))));
    assert_eq!(store.write_count(), writes);
    for (namespace, entity) in [("Author", &writer), ("Book", &first), ("Book", &second)] {
        assert!(!entity.is_deleted());
        assert!(row_exists(&store, namespace, entity));
    }
}

#[test]
fn test_set_null_below_cascade() {
    let (store, db, author, book, review) = shelf(OnDelete::Cascade, OnDelete::SetNull);
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let volume = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    let note = insert(
        &session,
        &review,
        &[("body", Value::from("good")), ("book", Value::from(id_of(&volume)))],
    );

    session.delete(&writer).unwrap();

    assert!(volume.is_deleted());
    assert!(!note.is_deleted());
    assert_eq!(note.get("book").unwrap(), Value::Null);
    let key = format!("Review:{}", id_of(&note));
    assert_eq!(store.hget(&key, "book").unwrap(), None);
    assert_eq!(store.hget(&key, "body").unwrap().as_deref(), Some("good"));
}

#[test]
fn test_restricting_row_removed_by_same_cascade() {
    let (store, db) = memory_db(true);
    let author = db
        .register(ModelDef::new("Author").column("name", Column::string()))
        .unwrap();
    let book = db
        .register(
            ModelDef::new("Book")
                .column("author", Column::many_to_one("Author").on_delete(OnDelete::Cascade)),
        )
        .unwrap();
    let review = db
        .register(
            ModelDef::new("Review")
                .column("book", Column::many_to_one("Book").on_delete(OnDelete::Cascade))
                .column("author", Column::many_to_one("Author").on_delete(OnDelete::Restrict)),
        )
        .unwrap();
    let session = db.session();
    let writer = insert(&session, &author, &[("name", Value::from("Ann"))]);
    let volume = insert(&session, &book, &[("author", Value::from(id_of(&writer)))]);
    let note = insert(
        &session,
        &review,
        &[
            ("book", Value::from(id_of(&volume))),
            ("author", Value::from(id_of(&writer))),
        ],
    );

    session.delete(&writer).unwrap();

    for (namespace, entity) in [("Author", &writer), ("Book", &volume), ("Review", &note)] {
        assert!(entity.is_deleted());
        assert!(!row_exists(&store, namespace, entity));
    }
}
