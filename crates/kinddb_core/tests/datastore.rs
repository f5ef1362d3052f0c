//! Integration tests for the datastore: persistence, hierarchies and
//! polymorphic queries.

use kinddb_core::{
    Config, CoreError, Datastore, Entity, Key, ModelSchema, Property, PropertyRef, PropertyValue,
    Query,
};
use kinddb_storage::{FileBackend, StorageBackend};
use std::sync::Arc;

fn account() -> Arc<ModelSchema> {
    ModelSchema::builder("Account")
        .property(Property::string("username"))
        .property(Property::string("email"))
        .build()
}

fn message() -> Arc<ModelSchema> {
    ModelSchema::builder("Message")
        .property(Property::text("text"))
        .property(Property::integer("rank"))
        .build()
}

#[test]
fn journal_replay_restores_entities_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.kdb");
    let (kept, dropped) = {
        let ds = Datastore::open(&path).unwrap();
        let mut a = Entity::with_values(&account(), [("username", "a")]).unwrap();
        let mut b = Entity::with_values(&account(), [("username", "b")]).unwrap();
        let keys = ds.put_multi(&mut [a.clone(), b.clone()]).unwrap();
        a.set_key(keys[0].clone()).unwrap();
        b.set_key(keys[1].clone()).unwrap();
        ds.delete(&keys[1]).unwrap();
        (a, keys[1].clone())
    };

    let ds = Datastore::open(&path).unwrap();
    ds.register(&account());
    assert_eq!(ds.len(), 1);
    let loaded = ds.get(kept.key().unwrap()).unwrap();
    assert_eq!(loaded, Some(kept));
    assert_eq!(ds.get(&dropped).unwrap(), None);

    // Ids keep counting after replay.
    let mut c = Entity::with_values(&account(), [("username", "c")]).unwrap();
    assert_eq!(ds.put(&mut c).unwrap().integer_id(), Some(3));
}

#[test]
fn kindless_ancestor_query_spans_kinds() {
    let ds = Datastore::open_in_memory().unwrap();
    let root = Key::new("Account", "sandy").unwrap();
    let mut sandy = Entity::with_values(&account(), [("username", "sandy")])
        .unwrap()
        .with_key(root.clone())
        .unwrap();
    let mut note = Entity::with_values(&message(), [("rank", 1i64)])
        .unwrap()
        .with_key(Key::with_parent("Message", 1, &root).unwrap())
        .unwrap();
    let mut other = Entity::with_values(&account(), [("username", "bo")]).unwrap();
    ds.put(&mut sandy).unwrap();
    ds.put(&mut note).unwrap();
    ds.put(&mut other).unwrap();

    let keys = ds.query_keys(&Query::kindless().ancestor(root.clone())).unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&root));
    assert!(keys.iter().any(|k| k.kind() == "Message"));
    assert_eq!(Query::kindless().kind(), None);
}

#[test]
fn torn_tail_is_repaired_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.kdb");
    let key = {
        let ds = Datastore::open(&path).unwrap();
        let mut a = Entity::with_values(&account(), [("username", "a")]).unwrap();
        ds.put(&mut a).unwrap()
    };
    let intact = {
        let mut backend = FileBackend::open(&path).unwrap();
        let size = backend.size().unwrap();
        backend.append(&[0x40, 0, 0, 0, 1, 2]).unwrap();
        backend.sync().unwrap();
        size
    };

    assert!(matches!(
        Datastore::open_with_config(&path, Config::default().repair_torn_tail(false)),
        Err(CoreError::JournalCorruption { .. })
    ));

    let ds = Datastore::open(&path).unwrap();
    ds.register(&account());
    assert!(ds.get(&key).unwrap().is_some());
    assert_eq!(FileBackend::open(&path).unwrap().size().unwrap(), intact);
}

#[test]
fn ancestor_queries_stay_in_their_group() {
    let ds = Datastore::open_in_memory().unwrap();
    let sandy = Key::new("Account", "sandy@example.com").unwrap();
    let other = Key::new("Account", "other@example.com").unwrap();

    for (parent, rank) in [(&sandy, 2), (&sandy, 1), (&other, 3)] {
        let mut m = Entity::with_values(
            &message(),
            [("text", PropertyValue::from("hi")), ("rank", rank.into())],
        )
        .unwrap()
        .with_parent(parent)
        .unwrap();
        ds.put(&mut m).unwrap();
    }

    let rank = PropertyRef::generic("rank");
    let found = ds
        .run_query(&Query::new("Message").ancestor(sandy.clone()).order(rank.asc()))
        .unwrap();
    let ranks: Vec<_> = found
        .iter()
        .map(|m| m.get("rank").unwrap().as_integer().unwrap())
        .collect();
    assert_eq!(ranks, [1, 2]);
    assert!(found
        .iter()
        .all(|m| m.key().unwrap().parent().as_ref() == Some(&sandy)));

    // Ids are scoped by parent.
    let keys = ds.query_keys(&Query::new("Message").ancestor(other)).unwrap();
    assert_eq!(keys[0].integer_id(), Some(1));
    assert_eq!(ds.count(&Query::new("Message")).unwrap(), 3);
}

#[test]
fn polymodel_queries_filter_by_class() {
    let contact = ModelSchema::builder("Contact")
        .polymodel()
        .property(Property::string("phone_number"))
        .build();
    let person = ModelSchema::builder("Person")
        .extends(&contact)
        .property(Property::string("first_name"))
        .build();
    let company = ModelSchema::builder("Company")
        .extends(&contact)
        .property(Property::string("name"))
        .build();

    let ds = Datastore::open_in_memory().unwrap();
    let mut p = Entity::with_values(&person, [("first_name", "Ann"), ("phone_number", "1")]).unwrap();
    let mut c = Entity::with_values(&company, [("name", "Acme"), ("phone_number", "2")]).unwrap();
    let pk = ds.put(&mut p).unwrap();
    ds.put(&mut c).unwrap();

    assert_eq!(pk.kind(), "Contact");
    assert_eq!(ds.count(&Query::for_schema(&contact)).unwrap(), 2);
    let people = ds.run_query(&Query::for_schema(&person)).unwrap();
    assert_eq!(people, vec![p]);
    assert_eq!(people[0].schema().class_name(), "Person");

    let by_name = Query::for_schema(&person).filter(person.property("first_name").unwrap().equal("Ann"));
    assert_eq!(ds.count(&by_name).unwrap(), 1);
    let wrong_type = Query::for_schema(&person).filter(person.property("first_name").unwrap().equal(5));
    assert!(matches!(ds.run_query(&wrong_type), Err(CoreError::BadValue { .. })));
}

#[test]
fn multi_operations() {
    let ds = Datastore::open_in_memory().unwrap();
    let schema = account();
    let mut batch: Vec<Entity> = ["a", "b", "c"]
        .iter()
        .map(|name| Entity::with_values(&schema, [("username", *name)]).unwrap())
        .collect();
    let keys = ds.put_multi(&mut batch).unwrap();
    assert!(batch.iter().zip(&keys).all(|(e, k)| e.key() == Some(k)));

    let fetched = ds.get_multi(&keys).unwrap();
    assert!(fetched.iter().all(Option::is_some));

    ds.delete_multi(&keys).unwrap();
    assert!(ds.get_multi(&keys).unwrap().iter().all(Option::is_none));
    // Deleting again is fine.
    ds.delete_multi(&keys).unwrap();
}
