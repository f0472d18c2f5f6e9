//! Shared fixtures: an in-memory SQLite database seeded with contacts,
//! phones, addresses and schedules, and a query-counting wrapper around it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use entity_mapper::db::Database;
use entity_mapper::{DatabaseAccess, DbError, Query, QueryOutput, Repository, Schema};

pub const SCHEMA_YAML: &str = r#"
entities:
  - name: contact
    table: contacts
    fields:
      - { name: id, type: pk, required: true }
      - { name: first_name, type: varchar, required: true, max: 100 }
      - { name: last_name, type: varchar, required: true, max: 100 }
      - { name: status, type: integer, default: 1 }
      - { name: life_years, alias: age, type: integer, default: 18 }
      - { name: a_json_field, alias: extra, type: json }
      - { name: created_at, type: created_at }
      - { name: updated_at, type: updated_at }
    relations:
      - { name: phones, type: HASMANY, field: id, referencedField: contact_id, referencedEntity: phone }
      - { name: address, type: HASONE, field: id, referencedField: contact_id, referencedEntity: address }
      - { name: schedules, type: MANYMANY, table: contacts_schedules, field: contact_id, referencedField: schedule_id, referencedEntity: schedule }
      - { name: something, type: SOMETHING, field: id, referencedField: id, referencedEntity: nothing }

  - name: phone
    table: contact_phones
    fields:
      - { name: id, type: pk, required: true }
      - { name: contact_id, type: integer, required: true }
      - { name: number, type: varchar, required: true, min: 8, max: 20 }
    relations:
      - { name: contact, type: BELONGSTO, field: contact_id, referencedField: id, referencedEntity: contact }

  - name: address
    table: addresses
    fields:
      - { name: id, type: pk, required: true }
      - { name: contact_id, type: integer }
      - { name: street, type: varchar }

  - name: schedule
    table: schedules
    fields:
      - { name: id, type: pk, required: true }
      - { name: start_time, type: date, required: true }
      - { name: end_time, type: date, required: true }
      - { name: extra, type: varchar }
      - { name: active, type: boolean, default: true }
"#;

const TABLES: &[&str] = &[
    "CREATE TABLE contacts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name VARCHAR(100) NOT NULL,
        last_name VARCHAR(100) NOT NULL,
        status TINYINT DEFAULT 1,
        life_years TINYINT DEFAULT 18,
        a_json_field TEXT,
        created_at INTEGER,
        updated_at INTEGER
    )",
    "CREATE TABLE contact_phones (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER NOT NULL,
        number VARCHAR(20) NOT NULL
    )",
    "CREATE TABLE addresses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INTEGER,
        street VARCHAR(100)
    )",
    "CREATE TABLE schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        start_time DATETIME NOT NULL,
        end_time DATETIME NOT NULL,
        extra TEXT,
        active BOOLEAN DEFAULT 1
    )",
    "CREATE TABLE contacts_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        contact_id INT NOT NULL,
        schedule_id INT NOT NULL
    )",
];

const SEED: &[&str] = &[
    r#"INSERT INTO contacts (first_name, last_name, status, life_years, a_json_field, created_at)
       VALUES ('Joabe', 'Santos', 1, 27, '{"hello":"world"}', 1500000000)"#,
    "INSERT INTO contacts (first_name, last_name, status, life_years, a_json_field)
       VALUES ('Lucio', 'Pamplona', 0, 30, '{not json')",
    "INSERT INTO contacts (first_name, last_name) VALUES ('Felipe', 'Faria')",
    "INSERT INTO contact_phones (contact_id, number) VALUES (1, '5511999990001')",
    "INSERT INTO contact_phones (contact_id, number) VALUES (1, '5511999990002')",
    "INSERT INTO contact_phones (contact_id, number) VALUES (2, '5521988880001')",
    "INSERT INTO addresses (contact_id, street) VALUES (1, 'Rua Augusta')",
    "INSERT INTO schedules (start_time, end_time, extra, active) VALUES ('2017-10-02 17:00:00', '2017-10-02 17:30:00', '_', 1)",
    "INSERT INTO schedules (start_time, end_time, extra, active) VALUES ('2017-10-03 09:00:00', '2017-10-03 10:00:00', NULL, 0)",
    "INSERT INTO schedules (start_time, end_time, extra, active) VALUES ('2017-10-04 14:00:00', '2017-10-04 14:30:00', NULL, 1)",
    "INSERT INTO schedules (start_time, end_time, extra, active) VALUES ('2017-10-05 08:00:00', '2017-10-05 08:15:00', NULL, 1)",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (1, 1)",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (1, 2)",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (1, 3)",
    "INSERT INTO contacts_schedules (contact_id, schedule_id) VALUES (2, 4)",
];

/// Wraps the SQLite adapter and counts executed queries per table.
pub struct CountingDatabase {
    inner: Database,
    counts: Mutex<HashMap<String, usize>>,
}

impl CountingDatabase {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &Database {
        &self.inner
    }

    /// Queries executed against `table` (the FROM/INTO table).
    pub fn count(&self, table: &str) -> usize {
        self.counts.lock().get(table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }

    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

#[async_trait]
impl DatabaseAccess for CountingDatabase {
    async fn execute(&self, query: &Query) -> Result<QueryOutput, DbError> {
        *self
            .counts
            .lock()
            .entry(query.table().to_string())
            .or_default() += 1;
        self.inner.execute(query).await
    }
}

pub struct Fixture {
    pub db: Arc<CountingDatabase>,
    pub schema: Arc<Schema>,
}

impl Fixture {
    pub fn repository(&self, entity: &str) -> Repository {
        Repository::new(self.db.clone(), self.schema.clone(), entity)
            .expect("entity declared in fixture schema")
    }
}

/// Fresh in-memory database with tables and seed rows.
pub async fn setup() -> Fixture {
    // A single connection keeps every query on the same in-memory database
    let database = Database::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database");

    for statement in TABLES.iter().chain(SEED) {
        sqlx::query(statement)
            .execute(database.pool())
            .await
            .expect("fixture statement");
    }

    Fixture {
        db: Arc::new(CountingDatabase::new(database)),
        schema: Arc::new(Schema::from_yaml(SCHEMA_YAML).expect("fixture schema")),
    }
}
