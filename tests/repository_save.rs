//! Integration tests for the save pipeline against SQLite
//!
//! - Insert assigns the generated key and stamps created_at
//! - Unchanged entities do not issue an UPDATE
//! - Dirty columns are written and read back
//! - Validation, hook and database failures land in the error set

mod common;

use async_trait::async_trait;

use entity_mapper::orm::{DATABASE_KEY, VALIDATION_KEY};
use entity_mapper::{Entity, ErrorSet, Repository, RepositoryHooks, Value};

use common::setup;

// ============================================================================
// Insert
// ============================================================================

#[tokio::test]
async fn test_insert_assigns_key_and_created_at() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.create();
    contact.fill([("first_name", "A"), ("last_name", "B")]);

    assert!(contacts.save(&mut contact).await, "{}", contacts.errors());
    assert_eq!(contact.id(), Some(&Value::Int(4)));
    assert!(contact.get("created_at").and_then(Value::as_i64).is_some());
    assert!(contact.get("updated_at").is_none());

    let stored = contacts.find_by_id(4).await.unwrap().unwrap();
    assert_eq!(stored.get("first_name"), Some(&Value::from("A")));
    assert_eq!(stored.get("status"), Some(&Value::Int(1)));
    assert_eq!(stored.get("age"), Some(&Value::Int(18)));
    assert_eq!(stored.get("updated_at"), Some(&Value::Null));

    // Loaded in milliseconds
    let written = contact.get("created_at").and_then(Value::as_i64).unwrap();
    assert_eq!(stored.get("created_at"), Some(&Value::Int(written * 1000)));
}

#[tokio::test]
async fn test_insert_json_field() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.create();
    contact.fill([("first_name", "Json"), ("last_name", "Holder")]);
    contact.set("extra", serde_json::json!({ "tags": ["a", "b"] }));
    assert!(contacts.save(&mut contact).await);

    let stored = contacts.find_by_id(contact.id().cloned().unwrap()).await.unwrap().unwrap();
    assert_eq!(
        stored.get("extra"),
        Some(&Value::Json(serde_json::json!({ "tags": ["a", "b"] })))
    );
}

#[tokio::test]
async fn test_missing_required_field() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.create();
    contact.set("first_name", "Fellipe");

    assert!(!contacts.save(&mut contact).await);
    assert!(contacts.has_errors());
    assert_eq!(contacts.errors().get("last_name").unwrap(), ["Field is required"]);
    assert_eq!(contacts.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn test_length_limits() {
    let fixture = setup().await;
    let mut phones = fixture.repository("phone");

    let mut phone = phones.create();
    phone.fill([("contact_id", Value::Int(1)), ("number", Value::from("123"))]);
    assert!(!phones.save(&mut phone).await);
    assert_eq!(phones.errors().get("number").unwrap(), ["Field length must be over 8"]);

    phone.set("number", "1".repeat(21));
    assert!(!phones.save(&mut phone).await);
    assert_eq!(phones.errors().get("number").unwrap(), ["Field length must be under 20"]);
}

#[tokio::test]
async fn test_database_error_recorded() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    sqlx::query("DROP TABLE contacts")
        .execute(fixture.db.inner().pool())
        .await
        .unwrap();

    let mut contact = contacts.create();
    contact.fill([("first_name", "A"), ("last_name", "B")]);
    assert!(!contacts.save(&mut contact).await);

    let messages = contacts.errors().get(DATABASE_KEY).unwrap();
    assert!(messages[0].contains("no such table"), "{:?}", messages);
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_unchanged_save_writes_nothing() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.find_by_id(1).await.unwrap().unwrap();
    fixture.db.reset();

    assert!(contacts.save(&mut contact).await, "{}", contacts.errors());
    assert_eq!(fixture.db.total(), 0);

    // Numeric string equal to the stored number is not a change
    contact.set("age", "27");
    assert!(contacts.save(&mut contact).await);
    assert_eq!(fixture.db.total(), 0);
}

#[tokio::test]
async fn test_update_dirty_fields() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.find_by_id(1).await.unwrap().unwrap();
    contact.set("first_name", "Rafael");
    contact.set("age", 28);
    fixture.db.reset();

    assert!(contacts.save(&mut contact).await, "{}", contacts.errors());
    assert_eq!(fixture.db.total(), 1);
    assert!(contact.get("updated_at").and_then(Value::as_i64).is_some());

    // Snapshot still holds the loaded state
    assert_eq!(contact.attribute("first_name"), Some(&Value::from("Joabe")));

    let stored = contacts.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(stored.get("first_name"), Some(&Value::from("Rafael")));
    assert_eq!(stored.get("age"), Some(&Value::Int(28)));
    assert_eq!(stored.get("last_name"), Some(&Value::from("Santos")));
    assert!(stored.get("updated_at").is_some_and(Value::is_truthy));
    assert_eq!(stored.get("created_at"), Some(&Value::Int(1_500_000_000_000)));
}

#[tokio::test]
async fn test_clearing_a_field_writes_null() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let mut contact = contacts.find_by_id(1).await.unwrap().unwrap();
    contact.set("extra", Value::Null);
    assert!(contacts.save(&mut contact).await);

    let stored = contacts.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(stored.get("extra"), Some(&Value::Null));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_twice() {
    let fixture = setup().await;
    let mut contacts = fixture.repository("contact");

    let contact = contacts.find_by_id(3).await.unwrap().unwrap();
    assert!(contacts.delete(&contact).await, "{}", contacts.errors());
    assert!(contacts.find_by_id(3).await.unwrap().is_none());

    assert!(!contacts.delete(&contact).await);
    assert!(contacts.errors().contains(DATABASE_KEY));
    assert_eq!(contacts.count(None).await.unwrap(), 2);
}

// ============================================================================
// Hooks
// ============================================================================

/// Rejects last names that already exist, and counts saves.
#[derive(Default)]
struct UniqueLastName {
    saved: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl RepositoryHooks for UniqueLastName {
    async fn before_validate(&self, entity: &Entity, errors: &mut ErrorSet) -> bool {
        if entity.get("last_name") == Some(&Value::from("Santos")) {
            errors.add("last_name", "Last name already taken");
            return false;
        }
        true
    }

    async fn after_save(&self, entity: &Entity, _errors: &mut ErrorSet) -> bool {
        if let Some(name) = entity.get("first_name").and_then(Value::as_str) {
            self.saved.lock().push(name.to_string());
        }
        true
    }
}

#[tokio::test]
async fn test_hooks_around_save() {
    let fixture = setup().await;
    let mut contacts: Repository<UniqueLastName> =
        Repository::with_hooks(fixture.db.clone(), fixture.schema.clone(), "contact", UniqueLastName::default())
            .unwrap();

    let mut contact = contacts.create();
    contact.fill([("first_name", "Other"), ("last_name", "Santos")]);
    assert!(!contacts.save(&mut contact).await);
    assert_eq!(
        contacts.errors().get("last_name").unwrap(),
        ["Last name already taken"]
    );
    assert!(!contacts.errors().contains(VALIDATION_KEY));

    contact.set("last_name", "Souza");
    assert!(contacts.save(&mut contact).await, "{}", contacts.errors());
    assert_eq!(*contacts.hooks().saved.lock(), vec!["Other".to_string()]);
}

struct AlwaysReject;

#[async_trait]
impl RepositoryHooks for AlwaysReject {
    async fn before_validate(&self, _entity: &Entity, _errors: &mut ErrorSet) -> bool {
        false
    }
}

#[tokio::test]
async fn test_silent_rejection_gets_generic_error() {
    let fixture = setup().await;
    let mut contacts =
        Repository::with_hooks(fixture.db.clone(), fixture.schema.clone(), "contact", AlwaysReject)
            .unwrap();

    let mut contact = contacts.create();
    contact.fill([("first_name", "A"), ("last_name", "B")]);
    assert!(!contacts.save(&mut contact).await);
    assert_eq!(
        contacts.errors().get(VALIDATION_KEY).unwrap(),
        ["Presented problems before validating"]
    );
}
