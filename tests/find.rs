//! Integration tests for reads: find, find_one, find_by_id, count,
//! materialized field values and the `Orm` entry point.

mod common;

use std::io::Write;
use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use entity_mapper::{Config, Criteria, LoadPolicy, Order, Orm, OrmError, Schema, Value};

use common::{SCHEMA_YAML, setup};

// ============================================================================
// Materialized values
// ============================================================================

#[tokio::test]
async fn test_fields_are_coerced() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let contact = contacts.find_by_id(1).await.unwrap().unwrap();
    assert!(!contact.is_new());
    assert_eq!(contact.entity_type(), "contact");
    assert_eq!(contact.get("age"), Some(&Value::Int(27)));
    assert!(contact.get("life_years").is_none());
    assert_eq!(
        contact.get("extra"),
        Some(&Value::Json(serde_json::json!({ "hello": "world" })))
    );
    assert_eq!(contact.get("created_at"), Some(&Value::Int(1_500_000_000_000)));
    assert_eq!(contact.get("updated_at"), Some(&Value::Null));

    // Snapshot keeps column names
    assert_eq!(contact.attribute("life_years"), Some(&Value::Int(27)));
    assert!(contact.attribute("age").is_none());
}

#[tokio::test]
async fn test_invalid_json_kept_raw() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let contact = contacts.find_by_id(2).await.unwrap().unwrap();
    assert_eq!(contact.get("extra"), Some(&Value::from("{not json")));
    assert_eq!(contact.get("created_at"), Some(&Value::Null));
}

#[tokio::test]
async fn test_to_json_includes_loaded_relations_only() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let contact = contacts.with("address").find_by_id(1).await.unwrap().unwrap();
    let json = contact.to_json();

    assert_eq!(json["first_name"], "Joabe");
    assert_eq!(json["age"], 27);
    assert_eq!(json["extra"]["hello"], "world");
    assert_eq!(json["address"]["street"], "Rua Augusta");
    assert!(json.get("phones").is_none());
}

// ============================================================================
// Finds
// ============================================================================

#[tokio::test]
async fn test_find_filter_order_and_page() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let active = contacts
        .find(Some(Criteria::eq("status", 1)), None, None, &[Order::desc("id")])
        .await
        .unwrap();
    let names: Vec<_> = active.iter().filter_map(|c| c.get("first_name").cloned()).collect();
    assert_eq!(names, vec![Value::from("Felipe"), Value::from("Joabe")]);

    let page = contacts
        .find(None, Some(1), Some(1), &[Order::asc("id")])
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id(), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_query_builder_combines_filters() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let rows = contacts
        .query()
        .filter(Criteria::like("first_name", "%e%"))
        .filter(Criteria::gt("life_years", 20))
        .order_by("id")
        .fetch_all()
        .await
        .unwrap();

    let ids: Vec<_> = rows.iter().filter_map(|c| c.id().cloned()).collect();
    assert_eq!(ids, vec![Value::Int(1)]);
}

#[tokio::test]
async fn test_default_limit_applies() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact").default_limit(2);

    assert_eq!(contacts.find(None, None, None, &[]).await.unwrap().len(), 2);
    assert_eq!(contacts.find(None, Some(10), None, &[]).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_find_one_and_missing_id() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let contact = contacts
        .find_one(Criteria::eq("last_name", "Faria"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.id(), Some(&Value::Int(3)));
    assert_eq!(contact.get("age"), Some(&Value::Int(18)));

    assert!(contacts.find_by_id(99).await.unwrap().is_none());
    assert!(
        contacts
            .find_one(Criteria::eq("last_name", "Nobody"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_count() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");
    let phones = fixture.repository("phone");

    assert_eq!(contacts.count(None).await.unwrap(), 3);
    assert_eq!(contacts.count(Some(Criteria::eq("status", 0))).await.unwrap(), 1);
    assert_eq!(phones.count(Some(Criteria::eq("contact_id", 1))).await.unwrap(), 2);
}

#[tokio::test]
async fn test_read_failure_is_an_error() {
    let fixture = setup().await;
    let contacts = fixture.repository("contact");

    let result = contacts
        .find(Some(Criteria::eq("no_such_column", 1)), None, None, &[])
        .await;
    assert_matches!(result, Err(OrmError::Database(_)));
}

// ============================================================================
// Orm entry point
// ============================================================================

#[tokio::test]
async fn test_orm_applies_config() {
    let fixture = setup().await;
    let config = Config {
        default_limit: 1,
        relation_load_policy: LoadPolicy::Memoize,
        ..Config::default()
    };
    let orm = Orm::new(fixture.db.clone(), fixture.schema.clone(), config);

    let contacts = orm.repository("contact").unwrap();
    let found = contacts.find(None, None, None, &[]).await.unwrap();
    assert_eq!(found.len(), 1);

    found[0].load("phones").await.unwrap();
    found[0].load("phones").await.unwrap();
    assert_eq!(fixture.db.count("contact_phones"), 1);

    assert!(matches!(
        orm.repository("invoice"),
        Err(OrmError::UnknownEntity(_))
    ));
}

#[tokio::test]
async fn test_orm_connect_with_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("schema.yaml");
    std::fs::File::create(&schema_path)
        .unwrap()
        .write_all(SCHEMA_YAML.as_bytes())
        .unwrap();

    let config = Config {
        database_url: format!("sqlite://{}", dir.path().join("orm.db").display()),
        max_connections: 1,
        schema_path: Some(schema_path),
        ..Config::default()
    };
    let orm = Orm::connect(config).await.unwrap();
    assert_eq!(orm.schema().len(), 4);

    let pool = {
        let db = entity_mapper::db::Database::connect(&orm.config().database_url, 1)
            .await
            .unwrap();
        db.pool().clone()
    };
    sqlx::query(
        "CREATE TABLE addresses (id INTEGER PRIMARY KEY AUTOINCREMENT, contact_id INTEGER, street TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut addresses = orm.repository("address").unwrap();
    let mut address = addresses.create();
    address.set("street", "Avenida Paulista");
    assert!(addresses.save(&mut address).await, "{}", addresses.errors());
    assert_eq!(addresses.count(None).await.unwrap(), 1);
}

// ============================================================================
// Schema files
// ============================================================================

#[test]
fn test_schema_load_json() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
            "entities": [{{
                "name": "tag",
                "table": "tags",
                "fields": [
                    {{ "name": "id", "type": "pk" }},
                    {{ "name": "label", "type": "varchar", "required": true }}
                ]
            }}]
        }}"#
    )
    .unwrap();

    let schema = Schema::load(file.path()).unwrap();
    let tag = schema.get("tag").unwrap();
    assert_eq!(tag.table, "tags");
    assert_eq!(tag.fields.len(), 2);
    assert!(tag.fields[1].required);
}

#[test]
fn test_schema_rejects_dangling_relation() {
    let source = r#"
entities:
  - name: phone
    table: phones
    fields:
      - { name: id, type: pk }
    relations:
      - { name: owner, type: BELONGSTO, field: owner_id, referencedField: id, referencedEntity: person }
"#;
    let err = Schema::from_yaml(source).unwrap_err();
    assert!(format!("{:#}", err).contains("unknown entity 'person'"), "{:#}", err);
}

#[test]
fn test_fixture_schema_shared() {
    let schema = Arc::new(Schema::from_yaml(SCHEMA_YAML).unwrap());
    let contact = schema.get("contact").unwrap();
    assert_eq!(contact.relations.len(), 4);
    assert_eq!(
        contact.find_field("life_years").map(|f| f.property_name()),
        Some("age")
    );
}
