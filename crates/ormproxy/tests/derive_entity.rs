use std::sync::Arc;

use ormproxy::prelude::*;
use ormproxy::table_name_for;

#[derive(Entity, Debug, Default, Clone, PartialEq)]
struct Greeter {
    id: i64,
    name: String,
    #[entity(skip)]
    greeting: String,
}

#[derive(Entity, Debug, Default, Clone, PartialEq)]
struct Invoice {
    #[entity(primary_key)]
    number: i64,
    total: f64,
    paid: bool,
    memo: Option<String>,
    attachment: Vec<u8>,
}

#[derive(Entity, Debug, Default)]
struct Labelled {
    id: i64,
    labels: Vec<String>,
}

mod billing {
    use ormproxy::Entity;

    #[derive(Entity, Debug, Default)]
    pub struct LineItem {
        pub id: i64,
    }
}

fn memory_proxy() -> DbProxy {
    DbProxy::with_connection(Arc::new(SqliteConnection::open_memory().unwrap()))
}

fn create<T: Entity>(proxy: &DbProxy, columns: &str) {
    let table = proxy.table_name::<T>().unwrap();
    proxy
        .execute(&[&format!(
            "CREATE TABLE \"{table}\" (\"_key_id\" INTEGER PRIMARY KEY AUTOINCREMENT, {columns})"
        )])
        .unwrap();
}

#[test]
fn table_names_follow_the_type_path() {
    let proxy = memory_proxy();
    assert_eq!(proxy.table_name::<Greeter>().unwrap(), "derive_entity_greeter");
    assert_eq!(
        proxy.table_name::<billing::LineItem>().unwrap(),
        "derive_entity_billing_line_item"
    );
    assert_eq!(
        table_name_for(<billing::LineItem as Entity>::TYPE_PATH),
        "derive_entity_billing_line_item"
    );
}

#[test]
fn skipped_fields_are_not_persisted() {
    let proxy = memory_proxy();
    create::<Greeter>(&proxy, "\"name\" TEXT");

    let mut greeter = Greeter {
        id: 0,
        name: "ada".into(),
        greeting: "hello".into(),
    };
    proxy.insert(&mut greeter).unwrap();

    let stored: Greeter = proxy.query_by_key(greeter.id).unwrap().unwrap();
    assert_eq!(stored.name, "ada");
    assert_eq!(stored.greeting, "");
}

#[test]
fn explicit_primary_key_and_value_types() {
    let proxy = memory_proxy();
    create::<Invoice>(
        &proxy,
        "\"total\" REAL, \"paid\" INTEGER, \"memo\" TEXT, \"attachment\" BLOB",
    );

    let mut invoice = Invoice {
        number: 0,
        total: 19.5,
        paid: true,
        memo: None,
        attachment: vec![1, 2, 3],
    };
    let key = proxy.insert(&mut invoice).unwrap();
    assert_eq!(invoice.number, key);

    let stored: Invoice = proxy.query_by_key(key).unwrap().unwrap();
    assert_eq!(stored, invoice);

    let raw = proxy
        .query_map(
            &format!("SELECT paid FROM \"{}\"", proxy.table_name::<Invoice>().unwrap()),
            &[],
        )
        .unwrap()
        .unwrap();
    assert_eq!(raw.get(0), Some(&Value::BigInt(1)));
}

#[test]
fn unsupported_field_type_is_reported_on_use() {
    let proxy = memory_proxy();
    let mut labelled = Labelled {
        id: 0,
        labels: vec!["a".into()],
    };

    match proxy.insert(&mut labelled) {
        Err(Error::UnsupportedFieldType { field, declared, .. }) => {
            assert_eq!(field, "labels");
            assert_eq!(declared, "Vec<String>");
        }
        other => panic!("expected unsupported field error, got {other:?}"),
    }

    // The failure is not cached away.
    assert!(matches!(
        proxy.query_count::<Labelled>(None, &[]),
        Err(Error::UnsupportedFieldType { .. })
    ));
    assert!(!labelled.is_persisted());
}
