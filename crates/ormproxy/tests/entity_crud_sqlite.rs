use ormproxy::prelude::*;
use ormproxy::{NO_ROW, NOT_APPLICABLE};
use tempfile::TempDir;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: i32,
}

fn user(name: &str, age: i32) -> User {
    User {
        id: 0,
        name: name.to_string(),
        age,
    }
}

fn open(dir: &TempDir) -> DbProxy {
    DbProxy::builder()
        .name("crud.db")
        .directory(dir.path())
        .version(1)
        .create_table::<User>()
        .build()
        .expect("build proxy")
}

#[test]
fn user_lifecycle_round_trips_through_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    let mut ada = user("ada", 36);
    let id = proxy.insert(&mut ada).unwrap();
    assert!(id >= 1);
    assert_eq!(ada.id, id);

    let found: User = proxy.query_by_key(id).unwrap().expect("row exists");
    assert_eq!(found, ada);

    ada.age = 37;
    assert_eq!(proxy.update(&ada).unwrap(), 1);
    let found: User = proxy.query_by_key(id).unwrap().unwrap();
    assert_eq!(found.age, 37);

    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 1);
    assert_eq!(proxy.delete_by_key::<User>(id).unwrap(), 1);
    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 0);
    assert_eq!(proxy.query_by_key::<User>(id).unwrap(), None);

    assert_eq!(proxy.lease_count().unwrap(), 0);
    assert!(!proxy.is_open().unwrap());
}

#[test]
fn update_never_writes_the_key_column() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    let mut first = user("first", 1);
    let mut second = user("second", 2);
    proxy.insert(&mut first).unwrap();
    proxy.insert(&mut second).unwrap();

    // Aim `first`'s values at `second`'s row; the key stays put.
    let changed = proxy.update_by_key(&first, second.id).unwrap();
    assert_eq!(changed, 1);

    let rows: Vec<User> = proxy
        .query_list(None, &[], &QueryOptions::new().order_by("\"_key_id\""))
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, second.id);
    assert_eq!(rows[1].name, "first");
}

#[test]
fn update_of_unsaved_entity_is_not_applicable() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    assert_eq!(proxy.update(&user("ghost", 0)).unwrap(), NOT_APPLICABLE);
    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 0);
}

#[test]
fn update_where_matches_predicate_rows() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut users = vec![user("a", 10), user("b", 20), user("c", 30)];
    proxy.insert_all(&mut users).unwrap();

    let template = user("adult", 99);
    let changed = proxy
        .update_where(&template, Some("age >= ?"), &[Value::from(20)])
        .unwrap();
    assert_eq!(changed, 2);
    assert_eq!(
        proxy
            .query_count::<User>(Some("name = ?"), &[Value::from("adult")])
            .unwrap(),
        2
    );
}

#[test]
fn missing_predicates_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let template = user("x", 1);

    let err = proxy.update_where(&template, None, &[]).unwrap_err();
    assert!(matches!(err, Error::MissingPredicate(_)));

    let err = proxy.update_where(&template, Some("   "), &[]).unwrap_err();
    assert!(matches!(err, Error::MissingPredicate(_)));

    let err = proxy.query_primary_key::<User>(None, &[]).unwrap_err();
    assert!(matches!(err, Error::MissingPredicate(_)));
}

#[test]
fn insert_or_update_picks_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    let mut bob = user("bob", 40);
    let id = proxy.insert_or_update(&mut bob).unwrap();
    assert_eq!(bob.id, id);

    bob.age = 41;
    assert_eq!(proxy.insert_or_update(&mut bob).unwrap(), 1);
    assert_eq!(bob.id, id);

    let stored: User = proxy.query_by_key(id).unwrap().unwrap();
    assert_eq!(stored.age, 41);
    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 1);
    assert_eq!(proxy.lease_count().unwrap(), 0);
}

#[test]
fn insert_or_update_all_mixes_inserts_and_updates() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    let mut existing = user("old", 1);
    proxy.insert(&mut existing).unwrap();
    existing.name = "renamed".to_string();

    let mut batch = vec![existing.clone(), user("new", 2)];
    proxy.insert_or_update_all(&mut batch).unwrap();

    assert_eq!(batch[0].id, existing.id);
    assert!(batch[1].id > existing.id);

    let names: Vec<User> = proxy
        .query_list(None, &[], &QueryOptions::new().order_by("\"_key_id\""))
        .unwrap();
    let names: Vec<_> = names.into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["renamed", "new"]);
}

#[test]
fn update_all_skips_unsaved_entities() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);

    let mut users = vec![user("a", 1), user("b", 2)];
    proxy.insert_all(&mut users).unwrap();
    for u in &mut users {
        u.age += 10;
    }
    users.push(user("unsaved", 3));

    assert_eq!(proxy.update_all(&users).unwrap(), 2);
    assert_eq!(
        proxy.query_count::<User>(Some("age > ?"), &[Value::from(10)]).unwrap(),
        2
    );
    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 2);
}

#[test]
fn query_primary_key_and_first_row() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut carol = user("carol", 50);
    proxy.insert(&mut carol).unwrap();

    let key = proxy
        .query_primary_key::<User>(Some("name = ?"), &[Value::from("carol")])
        .unwrap();
    assert_eq!(key, carol.id);

    let key = proxy
        .query_primary_key::<User>(Some("name = ?"), &[Value::from("nobody")])
        .unwrap();
    assert_eq!(key, NO_ROW);

    let found: Option<User> = proxy.query(Some("age = ?"), &[Value::from(50)]).unwrap();
    assert_eq!(found, Some(carol));
    let missing: Option<User> = proxy.query(Some("age = ?"), &[Value::from(1)]).unwrap();
    assert_eq!(missing, None);
}

#[test]
fn query_list_and_pages() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut users: Vec<User> = (1..=7).map(|i| user(&format!("u{i}"), i)).collect();
    proxy.insert_all(&mut users).unwrap();

    let page_one: Vec<User> = proxy.query_page(None, 1, 3, &[]).unwrap();
    let page_three: Vec<User> = proxy.query_page(None, 3, 3, &[]).unwrap();
    let page_zero: Vec<User> = proxy.query_page(None, 0, 3, &[]).unwrap();
    assert_eq!(page_one.len(), 3);
    assert_eq!(page_three.len(), 1);
    assert_eq!(page_zero, page_one);

    let filtered: Vec<User> = proxy
        .query_page(Some("age > ?"), 1, 10, &[Value::from(4)])
        .unwrap();
    assert_eq!(filtered.len(), 3);

    let oldest: Vec<User> = proxy
        .query_list(None, &[], &QueryOptions::new().order_by("age DESC").limit("2"))
        .unwrap();
    let ages: Vec<_> = oldest.iter().map(|u| u.age).collect();
    assert_eq!(ages, vec![7, 6]);
}

#[test]
fn raw_sql_queries_build_entities() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut users = vec![user("x", 1), user("y", 2)];
    proxy.insert_all(&mut users).unwrap();

    let table = proxy.table_name::<User>().unwrap();
    let sql = format!("SELECT * FROM \"{table}\" ORDER BY age DESC");

    let first: Option<User> = proxy.query_sql(&sql, &[]).unwrap();
    assert_eq!(first.map(|u| u.name), Some("y".to_string()));

    let all: Vec<User> = proxy.query_sql_list(&sql, &[]).unwrap();
    assert_eq!(all.len(), 2);

    // Columns missing from the result keep their defaults.
    let partial: Vec<User> = proxy
        .query_sql_list(&format!("SELECT name FROM \"{table}\""), &[])
        .unwrap();
    assert!(partial.iter().all(|u| u.id == 0 && u.age == 0));
}

#[test]
fn delete_with_and_without_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut users = vec![user("a", 1), user("b", 2), user("c", 3)];
    proxy.insert_all(&mut users).unwrap();

    assert_eq!(proxy.delete::<User>(Some("age < ?"), &[Value::from(2)]).unwrap(), 1);
    assert_eq!(proxy.delete::<User>(None, &[]).unwrap(), 2);
    assert_eq!(proxy.query_count::<User>(None, &[]).unwrap(), 0);
}

#[test]
fn empty_batches_are_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = open(&dir);
    let mut none: Vec<User> = Vec::new();

    proxy.insert_all(&mut none).unwrap();
    proxy.insert_or_update_all(&mut none).unwrap();
    assert_eq!(proxy.update_all(&none).unwrap(), 0);
    proxy.execute(&[]).unwrap();
    assert!(!dir.path().join("crud.db").exists());
}
