mod common;

use common::names;
use fieldlab_core::db::open_db_in_memory;
use fieldlab_core::index::open_index_in_memory;
use fieldlab_core::search::{run_indexed_search, GroupCount};
use fieldlab_core::{
    Backend, DocumentIndex, Filter, FilterOperator, FilterValue, IndexDocument, QueryWarning,
    SearchError, SearchQuery, SortDirection, SortTerm, SqliteDocumentIndex, TypedValue,
};
use rusqlite::Connection;

fn query() -> SearchQuery {
    SearchQuery::new(Backend::Indexed)
}

fn seeded_index() -> (Connection, common::Seeded) {
    let db = open_db_in_memory().unwrap();
    let index = open_index_in_memory().unwrap();
    let seeded = common::seed(&db, &index);
    (index, seeded)
}

#[test]
fn no_criteria_returns_everything_newest_first() {
    let (index, seeded) = seeded_index();

    let page = run_indexed_search(&index, &seeded.catalog(), &query()).unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(
        names(&page.records),
        vec!["Barbara Liskov", "Edsger Dijkstra", "Grace Hopper", "Alan Turing", "Ada Lovelace"]
    );
    assert!(page.warnings.is_empty());
}

#[test]
fn full_text_uses_trigram_match() {
    let (index, seeded) = seeded_index();
    let catalog = seeded.catalog();

    let ada = run_indexed_search(&index, &catalog, &query().with_free_text("ADA")).unwrap();
    assert_eq!(names(&ada.records), vec!["Ada Lovelace"]);
    assert_eq!(
        ada.records[0].custom_fields["joined__c"],
        TypedValue::Date(chrono::NaiveDate::from_ymd_opt(2020, 1, 5).unwrap())
    );

    let domain = run_indexed_search(&index, &catalog, &query().with_free_text("example.com")).unwrap();
    assert_eq!(domain.total, 4);

    let quoted = run_indexed_search(&index, &catalog, &query().with_free_text("\"ada")).unwrap();
    assert_eq!(quoted.total, 0);
}

#[test]
fn short_free_text_falls_back_to_substring_scan() {
    let (index, seeded) = seeded_index();

    let page = run_indexed_search(&index, &seeded.catalog(), &query().with_free_text("al")).unwrap();
    assert_eq!(names(&page.records), vec!["Alan Turing"]);
}

#[test]
fn short_free_text_folds_case_beyond_ascii() {
    let db = open_db_in_memory().unwrap();
    let index = open_index_in_memory().unwrap();
    let seeded = common::seed(&db, &index);
    common::add_plain_record(&db, Some(&index), &seeded, "Élodie Ärger", "elodie@exemple.fr", 6000);
    let catalog = seeded.catalog();

    for text in ["ÄR", "är", "É"] {
        let page = run_indexed_search(&index, &catalog, &query().with_free_text(text)).unwrap();
        assert_eq!(names(&page.records), vec!["Élodie Ärger"], "free text {text}");
    }
}

#[test]
fn eq_filters_match_flattened_fields() {
    let (index, seeded) = seeded_index();
    let catalog = seeded.catalog();

    let gold = run_indexed_search(
        &index,
        &catalog,
        &query().with_filter(Filter::new("tier__c", FilterOperator::Eq, FilterValue::single("gold"))),
    )
    .unwrap();
    assert_eq!(names(&gold.records), vec!["Grace Hopper", "Ada Lovelace"]);

    let score = run_indexed_search(
        &index,
        &catalog,
        &query().with_filter(Filter::new("score__c", FilterOperator::Eq, FilterValue::single("75.5"))),
    )
    .unwrap();
    assert_eq!(names(&score.records), vec!["Alan Turing"]);

    let email = run_indexed_search(
        &index,
        &catalog,
        &query().with_filter(Filter::new(
            "email",
            FilterOperator::Eq,
            FilterValue::single("edsger@example.org"),
        )),
    )
    .unwrap();
    assert_eq!(names(&email.records), vec!["Edsger Dijkstra"]);
}

#[test]
fn non_eq_operators_are_skipped_with_warning() {
    let (index, seeded) = seeded_index();

    let page = run_indexed_search(
        &index,
        &seeded.catalog(),
        &query().with_filter(Filter::new("score__c", FilterOperator::Gt, FilterValue::single(80.0))),
    )
    .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(
        page.warnings,
        vec![QueryWarning::UnsupportedOperator {
            path: "score__c".to_string(),
            operator: FilterOperator::Gt,
        }]
    );
}

#[test]
fn unknown_fields_are_forwarded_and_match_nothing() {
    let (index, seeded) = seeded_index();

    let page = run_indexed_search(
        &index,
        &seeded.catalog(),
        &query().with_filter(Filter::new("unknown__x", FilterOperator::Eq, FilterValue::single("y"))),
    )
    .unwrap();

    assert_eq!(page.total, 0);
    assert_eq!(
        page.warnings,
        vec![QueryWarning::UnknownAttribute {
            path: "unknown__x".to_string()
        }]
    );
}

#[test]
fn dynamic_sort_orders_by_flattened_value() {
    let (index, seeded) = seeded_index();
    let catalog = seeded.catalog();

    let by_score = run_indexed_search(
        &index,
        &catalog,
        &query().with_sort(SortTerm::new("score__c", SortDirection::Desc)),
    )
    .unwrap();
    assert_eq!(
        names(&by_score.records),
        vec!["Grace Hopper", "Ada Lovelace", "Barbara Liskov", "Alan Turing", "Edsger Dijkstra"]
    );
    assert!(by_score.warnings.is_empty());

    let by_joined = run_indexed_search(
        &index,
        &catalog,
        &query().with_sort(SortTerm::new("joined__c", SortDirection::Asc)),
    )
    .unwrap();
    assert_eq!(
        names(&by_joined.records),
        vec!["Barbara Liskov", "Alan Turing", "Ada Lovelace", "Grace Hopper", "Edsger Dijkstra"]
    );
}

#[test]
fn pagination_and_grouping_follow_the_filtered_set() {
    let (index, seeded) = seeded_index();
    let catalog = seeded.catalog();

    let page = run_indexed_search(
        &index,
        &catalog,
        &query().with_page(2, 2).with_group_by("tier__c"),
    )
    .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(names(&page.records), vec!["Grace Hopper", "Alan Turing"]);
    assert_eq!(
        page.groups.unwrap(),
        vec![
            GroupCount { key: "gold".to_string(), count: 2 },
            GroupCount { key: "bronze".to_string(), count: 1 },
            GroupCount { key: "silver".to_string(), count: 1 },
        ]
    );

    let scores = run_indexed_search(&index, &catalog, &query().with_group_by("score__c")).unwrap();
    let keys = scores
        .groups
        .unwrap()
        .into_iter()
        .map(|group| group.key)
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["60", "75.5", "88", "90", "99"]);
}

#[test]
fn upsert_refreshes_full_text_entries() {
    let (index, seeded) = seeded_index();
    let catalog = seeded.catalog();
    let documents = SqliteDocumentIndex::new(&index);

    let mut ada = IndexDocument::from_record(&seeded.records[0], &catalog).unwrap();
    ada.name = "Augusta King".to_string();
    documents.upsert_document(&ada).unwrap();

    let old = run_indexed_search(&index, &catalog, &query().with_free_text("Lovelace")).unwrap();
    assert_eq!(old.total, 0);
    let renamed = run_indexed_search(&index, &catalog, &query().with_free_text("Augusta")).unwrap();
    assert_eq!(names(&renamed.records), vec!["Augusta King"]);

    assert!(documents.delete_document(ada.id).unwrap());
    assert!(!documents.delete_document(ada.id).unwrap());
    let gone = run_indexed_search(&index, &catalog, &query().with_free_text("Augusta")).unwrap();
    assert_eq!(gone.total, 0);
}

#[test]
fn between_on_indexed_backend_is_skipped_not_rejected() {
    let (index, seeded) = seeded_index();

    let page = run_indexed_search(
        &index,
        &seeded.catalog(),
        &query().with_filter(Filter::new(
            "joined__c",
            FilterOperator::Between,
            FilterValue::range("2019-01-01", "2020-12-31"),
        )),
    )
    .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.warnings.len(), 1);
}

#[test]
fn eq_with_range_value_is_invalid() {
    let (index, seeded) = seeded_index();

    let err = run_indexed_search(
        &index,
        &seeded.catalog(),
        &query().with_filter(Filter::new(
            "score__c",
            FilterOperator::Eq,
            FilterValue::range(1.0, 2.0),
        )),
    )
    .unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery(_)));
}
