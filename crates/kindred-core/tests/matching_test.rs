//! Integration tests for end-to-end matching.
//!
//! Runs configured engines over small corpora and checks the events, the
//! links written to a store and the evaluation against a gold standard.

use kindred_core::listeners::ReportHandle;
use kindred_core::{
    load_gold_standard, AcceptanceStrategy, DataSource, EvaluationListener, EventRecorder,
    InMemoryDataSource, InMemoryLinkStore, LinkKind, LinkStatus, LinkStore, LinkStoreListener,
    MatchConfig, MatchEngine, Record,
};
use std::sync::Arc;

const CONFIG: &str = r#"
threshold = 0.8

[engine]
threads = 2
batch_size = 3

[[properties]]
name = "ID"
role = "id"

[[properties]]
name = "NAME"
comparator = { type = "levenshtein" }
low = 0.3
high = 0.9

[[properties]]
name = "EMAIL"
comparator = { type = "exact" }
low = 0.4
high = 0.95
lookup = "always"
"#;

fn person(id: &str, name: &str, email: &str) -> Record {
    Record::new()
        .with_value("ID", id)
        .with_value("NAME", name)
        .with_value("EMAIL", email)
}

fn people() -> Vec<Record> {
    vec![
        person("1", "John Smith", "js@example.com"),
        person("2", "Jon Smith", "js@example.com"),
        person("3", "Mary Jones", "mj@example.org"),
        person("4", "John Smith", "js@example.com"),
    ]
}

fn source(records: Vec<Record>) -> Vec<Box<dyn DataSource>> {
    vec![Box::new(InMemoryDataSource::new(records))]
}

fn ids(r1: &Record, r2: &Record) -> (String, String) {
    (
        r1.value("ID").unwrap_or_default().to_string(),
        r2.value("ID").unwrap_or_default().to_string(),
    )
}

fn engine() -> MatchEngine {
    let config = MatchConfig::from_toml_str(CONFIG).unwrap();
    MatchEngine::from_config(&config).unwrap()
}

#[test]
fn test_deduplicate_finds_cluster() {
    let recorder = EventRecorder::new();
    let mut engine = engine().with_listener(recorder.clone());
    engine.deduplicate(source(people())).unwrap();

    let found: Vec<(String, String)> = recorder
        .recorded_matches()
        .iter()
        .map(|(r1, r2, _)| ids(r1, r2))
        .collect();
    assert_eq!(
        found,
        vec![
            ("2".to_string(), "1".to_string()),
            ("4".to_string(), "1".to_string()),
            ("4".to_string(), "2".to_string()),
        ]
    );
    assert!(recorder.recorded_matches().iter().all(|(_, _, conf)| *conf > 0.8));
    assert!(recorder.no_matches().is_empty());
}

#[test]
fn test_deduplicate_into_link_store() {
    let store = Arc::new(InMemoryLinkStore::new().with_inference(true));
    let mut engine = engine();
    let listener = LinkStoreListener::new(Arc::clone(engine.model()), store.clone());
    engine.add_listener(Box::new(listener));
    engine.deduplicate(source(people())).unwrap();

    let links = store.all_links().unwrap();
    assert_eq!(links.len(), 3);
    assert!(links
        .iter()
        .all(|l| l.kind == LinkKind::Same && l.status == LinkStatus::Inferred));
    assert_eq!(store.class_of("1").unwrap().len(), 3);
    assert!(store.links_for("3").unwrap().is_empty());
    assert!(store.check_consistency().unwrap().is_empty());
}

#[test]
fn test_evaluation_against_gold_standard() {
    let gold = InMemoryLinkStore::new();
    load_gold_standard("+1,2\n+1,4\n+2,4\n-1,3\n".as_bytes(), &gold).unwrap();

    let mut engine = engine();
    let evaluation = EvaluationListener::new(Arc::clone(engine.model()), Arc::new(gold));
    let report: ReportHandle = evaluation.report_handle();
    engine.add_listener(Box::new(evaluation));
    engine.deduplicate(source(people())).unwrap();

    let report = report.get().unwrap();
    assert_eq!(report.correct_found, 3);
    assert_eq!(report.wrong_found, 0);
    assert_eq!(report.precision, 1.0);
    assert_eq!(report.recall, 1.0);
    assert_eq!(report.f_measure, 1.0);
}

#[test]
fn test_linkage_against_master() {
    let recorder = EventRecorder::new();
    let mut engine = engine().with_listener(recorder.clone());
    engine
        .link(
            source(vec![
                person("a1", "John Smith", "js@example.com"),
                person("a2", "Mary Jones", "mj@example.org"),
            ]),
            source(vec![
                person("b1", "Jon Smith", "js@example.com"),
                person("b2", "Peter Pan", "pp@example.net"),
            ]),
            AcceptanceStrategy::BestOnly,
        )
        .unwrap();

    let found: Vec<(String, String)> = recorder
        .recorded_matches()
        .iter()
        .map(|(r1, r2, _)| ids(r1, r2))
        .collect();
    assert_eq!(found, vec![("b1".to_string(), "a1".to_string())]);

    let unmatched: Vec<String> = recorder
        .no_matches()
        .iter()
        .map(|r| r.value("ID").unwrap_or_default().to_string())
        .collect();
    assert_eq!(unmatched, vec!["b2"]);
}
