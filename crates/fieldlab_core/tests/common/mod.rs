#![allow(dead_code)]

use chrono::NaiveDate;
use fieldlab_core::repo::attribute_repo::{AttributeRepository, SqliteAttributeRepository};
use fieldlab_core::repo::record_repo::{RecordRepository, SqliteRecordRepository};
use fieldlab_core::search::RecordProjection;
use fieldlab_core::{
    AttributeCatalog, AttributeDefinition, DocumentIndex, FixedAttributes, IndexDocument,
    NewAttributeDefinition, Record, SqliteDocumentIndex, TypedValue, ValueType,
};
use rusqlite::Connection;
use uuid::Uuid;

pub struct Seeded {
    pub definitions: Vec<AttributeDefinition>,
    pub records: Vec<Record>,
}

impl Seeded {
    pub fn definition(&self, wire_name: &str) -> &AttributeDefinition {
        self.definitions
            .iter()
            .find(|definition| definition.wire_name == wire_name)
            .unwrap()
    }

    pub fn catalog(&self) -> AttributeCatalog {
        AttributeCatalog::new(self.definitions.clone())
    }
}

pub fn definitions() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::new(
            NewAttributeDefinition::new("Tier", "tier__c", ValueType::Enum)
                .with_options(["gold", "silver", "bronze"])
                .with_display_order(1),
        )
        .unwrap(),
        AttributeDefinition::new(
            NewAttributeDefinition::new("Score", "score__c", ValueType::Number)
                .with_display_order(2),
        )
        .unwrap(),
        AttributeDefinition::new(
            NewAttributeDefinition::new("Joined", "joined__c", ValueType::Date)
                .with_display_order(3),
        )
        .unwrap(),
        AttributeDefinition::new(
            NewAttributeDefinition::new("Nickname", "nickname__c", ValueType::Text)
                .with_display_order(4),
        )
        .unwrap(),
    ]
}

struct Row {
    name: &'static str,
    email: &'static str,
    created_at: i64,
    tier: Option<&'static str>,
    score: f64,
    joined: Option<(i32, u32, u32)>,
    nickname: Option<&'static str>,
}

const ROWS: [Row; 5] = [
    Row {
        name: "Ada Lovelace",
        email: "ada@example.com",
        created_at: 1000,
        tier: Some("gold"),
        score: 90.0,
        joined: Some((2020, 1, 5)),
        nickname: Some("countess"),
    },
    Row {
        name: "Alan Turing",
        email: "alan@example.com",
        created_at: 2000,
        tier: Some("silver"),
        score: 75.5,
        joined: Some((2019, 3, 10)),
        nickname: None,
    },
    Row {
        name: "Grace Hopper",
        email: "grace@navy.example.com",
        created_at: 3000,
        tier: Some("gold"),
        score: 99.0,
        joined: Some((2021, 7, 1)),
        nickname: None,
    },
    Row {
        name: "Edsger Dijkstra",
        email: "edsger@example.org",
        created_at: 4000,
        tier: Some("bronze"),
        score: 60.0,
        joined: None,
        nickname: None,
    },
    Row {
        name: "Barbara Liskov",
        email: "barbara@example.com",
        created_at: 5000,
        tier: None,
        score: 88.0,
        joined: Some((2018, 11, 11)),
        nickname: None,
    },
];

/// Builds the five fixture records against `definitions`.
pub fn build_records(definitions: &[AttributeDefinition]) -> Vec<Record> {
    let find = |wire_name: &str| {
        definitions
            .iter()
            .find(|definition| definition.wire_name == wire_name)
            .unwrap()
    };

    ROWS.iter()
        .enumerate()
        .map(|(position, row)| {
            let id = Uuid::from_u128(position as u128 + 1);
            let mut record =
                Record::create_at(id, FixedAttributes::new(row.name, row.email), row.created_at)
                    .unwrap();
            if let Some(tier) = row.tier {
                record
                    .set_attribute_value(find("tier__c"), TypedValue::Enum(tier.to_string()))
                    .unwrap();
            }
            record
                .set_attribute_value(find("score__c"), TypedValue::Number(row.score))
                .unwrap();
            if let Some((year, month, day)) = row.joined {
                let date = NaiveDate::from_ymd_opt(year, month, day).unwrap();
                record
                    .set_attribute_value(find("joined__c"), TypedValue::Date(date))
                    .unwrap();
            }
            if let Some(nickname) = row.nickname {
                record
                    .set_attribute_value(find("nickname__c"), TypedValue::Text(nickname.to_string()))
                    .unwrap();
            }
            record
        })
        .collect()
}

/// Seeds the relational store only.
pub fn seed_relational(db: &Connection) -> Seeded {
    let definitions = definitions();
    let attributes = SqliteAttributeRepository::new(db);
    for definition in &definitions {
        attributes.create_definition(definition).unwrap();
    }

    let records = build_records(&definitions);
    let repo = SqliteRecordRepository::new(db);
    for record in &records {
        repo.save_record(record).unwrap();
    }

    Seeded {
        definitions,
        records,
    }
}

/// Seeds both stores with the same catalog and records.
pub fn seed(db: &Connection, index: &Connection) -> Seeded {
    let seeded = seed_relational(db);
    let catalog = seeded.catalog();
    let documents = SqliteDocumentIndex::new(index);
    for record in &seeded.records {
        documents
            .upsert_document(&IndexDocument::from_record(record, &catalog).unwrap())
            .unwrap();
    }
    seeded
}

pub fn names(records: &[RecordProjection]) -> Vec<&str> {
    records.iter().map(|record| record.name.as_str()).collect()
}

/// Adds one record with no custom fields to the relational store and,
/// when given, the index.
pub fn add_plain_record(
    db: &Connection,
    index: Option<&Connection>,
    seeded: &Seeded,
    name: &str,
    email: &str,
    created_at: i64,
) -> Record {
    let id = Uuid::from_u128(seeded.records.len() as u128 + 100);
    let record = Record::create_at(id, FixedAttributes::new(name, email), created_at).unwrap();
    SqliteRecordRepository::new(db).save_record(&record).unwrap();
    if let Some(index) = index {
        SqliteDocumentIndex::new(index)
            .upsert_document(&IndexDocument::from_record(&record, &seeded.catalog()).unwrap())
            .unwrap();
    }
    record
}
