mod common;

use fieldlab_core::db::open_db_in_memory;
use fieldlab_core::repo::attribute_repo::{AttributeRepository, SqliteAttributeRepository};
use fieldlab_core::repo::record_repo::{RecordRepository, SqliteRecordRepository};
use fieldlab_core::{RepoError, TypedValue};
use uuid::Uuid;

#[test]
fn saved_record_reads_back_with_typed_values() {
    let conn = open_db_in_memory().unwrap();
    let seeded = common::seed_relational(&conn);
    let repo = SqliteRecordRepository::new(&conn);

    let ada = &seeded.records[0];
    let loaded = repo.get_record(ada.id()).unwrap().unwrap();

    assert_eq!(&loaded, ada);
    let score = seeded.definition("score__c");
    assert_eq!(
        loaded
            .get_attribute_value(score.id)
            .unwrap()
            .typed_value(score)
            .unwrap(),
        Some(TypedValue::Number(90.0))
    );
}

#[test]
fn save_replaces_the_full_value_set() {
    let conn = open_db_in_memory().unwrap();
    let seeded = common::seed_relational(&conn);
    let repo = SqliteRecordRepository::new(&conn);

    let mut ada = repo.get_record(seeded.records[0].id()).unwrap().unwrap();
    ada.remove_attribute_value("nickname__c");
    ada.set_attribute_value(seeded.definition("score__c"), TypedValue::Number(42.0))
        .unwrap();
    repo.save_record(&ada).unwrap();

    let loaded = repo.get_record(ada.id()).unwrap().unwrap();
    assert_eq!(loaded.all_attribute_values().len(), 3);
    assert!(loaded
        .get_attribute_value(seeded.definition("nickname__c").id)
        .is_none());
    assert_eq!(
        loaded
            .get_attribute_value(seeded.definition("score__c").id)
            .unwrap()
            .raw_value
            .as_deref(),
        Some("42")
    );
}

#[test]
fn get_missing_record_returns_none_and_delete_reports_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRecordRepository::new(&conn);
    let id = Uuid::new_v4();

    assert!(repo.get_record(id).unwrap().is_none());
    assert!(matches!(
        repo.delete_record(id),
        Err(RepoError::NotFound(missing)) if missing == id
    ));
}

#[test]
fn delete_removes_record_and_values() {
    let conn = open_db_in_memory().unwrap();
    let seeded = common::seed_relational(&conn);
    let repo = SqliteRecordRepository::new(&conn);

    repo.delete_record(seeded.records[0].id()).unwrap();

    assert!(repo.get_record(seeded.records[0].id()).unwrap().is_none());
    let orphaned: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attribute_values WHERE record_id = ?1;",
            [seeded.records[0].id().to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphaned, 0);
}

#[test]
fn values_of_inactive_definitions_stay_readable() {
    let conn = open_db_in_memory().unwrap();
    let seeded = common::seed_relational(&conn);
    let attributes = SqliteAttributeRepository::new(&conn);

    let mut tier = seeded.definition("tier__c").clone();
    tier.deactivate();
    attributes.update_definition(&tier).unwrap();

    let loaded = SqliteRecordRepository::new(&conn)
        .get_record(seeded.records[0].id())
        .unwrap()
        .unwrap();
    assert_eq!(
        loaded.get_attribute_value(tier.id).unwrap().raw_value.as_deref(),
        Some("gold")
    );
    assert_eq!(attributes.list_active().unwrap().len(), 3);
    assert_eq!(attributes.list_definitions().unwrap().len(), 4);
}

#[test]
fn definitions_round_trip_with_options_in_order() {
    let conn = open_db_in_memory().unwrap();
    let seeded = common::seed_relational(&conn);
    let attributes = SqliteAttributeRepository::new(&conn);

    let tier = attributes.find_by_wire_name("tier__c").unwrap().unwrap();
    assert_eq!(&tier, seeded.definition("tier__c"));
    assert_eq!(
        tier.enum_options.as_deref(),
        Some(&["gold".to_string(), "silver".to_string(), "bronze".to_string()][..])
    );
    assert!(attributes.find_by_wire_name("missing__c").unwrap().is_none());

    let listed = attributes
        .list_definitions()
        .unwrap()
        .into_iter()
        .map(|definition| definition.wire_name)
        .collect::<Vec<_>>();
    assert_eq!(listed, vec!["tier__c", "score__c", "joined__c", "nickname__c"]);
}
