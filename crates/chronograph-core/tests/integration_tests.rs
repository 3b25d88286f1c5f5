//! Chronograph Core Integration Tests

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use chronograph_core::{
    Error, ServiceOptions, TemporalService,
    domain::decay::{DecayFunction, DecayPolicy},
    domain::index::Direction,
    domain::versioning::{DataMap, ManualClock, VersionStore},
    storage::{export_store, import_from_reader},
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn map(value: Value) -> DataMap {
    value.as_object().cloned().unwrap()
}

fn edge(from: &str, to: &str, confidence: f64) -> DataMap {
    map(json!({"from": from, "to": to, "type": "uses", "confidence": confidence}))
}

async fn service_with(options: ServiceOptions) -> (Arc<ManualClock>, TemporalService) {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(VersionStore::with_clock(clock.clone()));
    let service = TemporalService::open(store, options).await.unwrap();
    (clock, service)
}

async fn service() -> (Arc<ManualClock>, TemporalService) {
    service_with(ServiceOptions::default()).await
}

#[tokio::test]
async fn test_element_history_authors_in_order() {
    let (clock, service) = service().await;

    for (level, author) in [(1, "user1"), (2, "user2"), (3, "user3")] {
        let change = if level == 1 { "create" } else { "update" };
        service
            .record_element_change(
                "skill-python",
                "skill",
                map(json!({"name": "python", "level": level})),
                author,
                change,
                &format!("level {}", level),
            )
            .await
            .unwrap();
        clock.advance(Duration::minutes(10));
    }

    let history = service
        .get_element_history("skill-python", None, None)
        .await
        .unwrap();
    let authors: Vec<&str> = history.iter().map(|e| e.author.as_str()).collect();
    assert_eq!(authors, vec!["user1", "user2", "user3"]);
    let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(history[2].element_data["level"], json!(3));
    assert_eq!(history[1].changes.get("level"), Some(&json!(2)));
}

#[tokio::test]
async fn test_relationship_history_with_decay() {
    let (clock, service) = service().await;
    service
        .record_relationship_change("rel-1", edge("skill-1", "persona-1", 0.9), "user1", "create", "")
        .await
        .unwrap();
    clock.advance(Duration::days(3));
    service
        .record_relationship_change("rel-1", edge("skill-1", "persona-1", 0.85), "user1", "update", "")
        .await
        .unwrap();
    clock.advance(Duration::days(10));

    let history = service
        .get_relationship_history("rel-1", None, None, true)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].original_confidence, 0.9);
    assert_eq!(history[1].original_confidence, 0.85);
    for entry in &history {
        let decayed = entry.decayed_confidence.unwrap();
        assert!(decayed <= entry.original_confidence);
        assert!(decayed > 0.0);
    }
    // The older version has decayed for longer
    let first_ratio = history[0].decayed_confidence.unwrap() / history[0].original_confidence;
    let second_ratio = history[1].decayed_confidence.unwrap() / history[1].original_confidence;
    assert!(first_ratio < second_ratio);
}

#[tokio::test]
async fn test_threshold_validation_touches_nothing() {
    let (_, service) = service().await;
    service
        .record_relationship_change("rel-1", edge("a", "b", 0.5), "u", "create", "")
        .await
        .unwrap();
    let stats_before = service.get_version_stats().await;
    let index_before = service.index_stats();

    for threshold in [-0.5, 1.5] {
        let err = service.get_decayed_graph(threshold).await.unwrap_err();
        assert!(matches!(err, Error::ThresholdOutOfRange(_)));
        assert!(err.is_validation());
    }

    assert_eq!(service.get_version_stats().await, stats_before);
    assert_eq!(service.index_stats(), index_before);
}

#[tokio::test]
async fn test_graph_before_first_change_is_empty() {
    let (_, service) = service().await;
    service
        .record_element_change("persona-1", "persona", map(json!({"name": "Ada"})), "u", "create", "")
        .await
        .unwrap();
    service
        .record_relationship_change("rel-1", edge("persona-1", "skill-1", 0.7), "u", "create", "")
        .await
        .unwrap();

    let snapshot = service
        .get_graph_at_time(start() - Duration::seconds(1), true)
        .await
        .unwrap();
    assert_eq!(snapshot.element_count(), 0);
    assert_eq!(snapshot.relationship_count(), 0);
}

#[tokio::test]
async fn test_time_travel_and_delete_semantics() {
    let (clock, service) = service().await;
    let t1 = start();
    service
        .record_element_change("agent-1", "agent", map(json!({"state": "draft"})), "u", "create", "")
        .await
        .unwrap();
    clock.advance(Duration::hours(1));
    let t2 = clock_now(&service);
    service
        .record_element_change("agent-1", "agent", map(json!({"state": "active"})), "u", "update", "")
        .await
        .unwrap();
    clock.advance(Duration::hours(1));
    let t3 = clock_now(&service);
    service
        .record_element_change("agent-1", "agent", DataMap::new(), "u", "delete", "retired")
        .await
        .unwrap();

    let state_at = |t: DateTime<Utc>| {
        let service = &service;
        async move {
            service
                .get_element_at_time("agent-1", t)
                .await
                .unwrap()
                .map(|view| view.data["state"].clone())
        }
    };

    assert_eq!(state_at(t1 - Duration::seconds(1)).await, None);
    assert_eq!(state_at(t1).await, Some(json!("draft")));
    assert_eq!(state_at(t2 - Duration::seconds(1)).await, Some(json!("draft")));
    assert_eq!(state_at(t2).await, Some(json!("active")));
    assert_eq!(state_at(t3).await, None);
    assert_eq!(state_at(t3 + Duration::days(365)).await, None);

    let err = service
        .record_element_change("agent-1", "agent", map(json!({"state": "zombie"})), "u", "update", "")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TerminalEntity { .. }));

    clock.advance(Duration::hours(1));
    let t4 = clock_now(&service);
    service
        .record_element_change("agent-1", "agent", map(json!({"state": "reborn"})), "u", "create", "")
        .await
        .unwrap();
    assert_eq!(state_at(t4 - Duration::seconds(1)).await, None);
    assert_eq!(state_at(t4).await, Some(json!("reborn")));

    // Known entity, empty window: success with no entries
    let empty = service
        .get_element_history("agent-1", Some(t4 + Duration::days(1)), None)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

fn clock_now(service: &TemporalService) -> DateTime<Utc> {
    service.version_store().now()
}

#[tokio::test]
async fn test_critical_relationships_never_decay() {
    let (clock, service) = service().await;
    let mut critical = edge("skill-1", "persona-1", 0.6);
    critical.insert("critical".to_string(), json!(true));
    service
        .record_relationship_change("pinned", critical, "u", "create", "")
        .await
        .unwrap();
    service
        .record_relationship_change("plain", edge("skill-1", "agent-1", 0.6), "u", "create", "")
        .await
        .unwrap();

    for days in [1, 30, 365, 3650] {
        clock.set(start() + Duration::days(days));
        let graph = service.get_decayed_graph(0.0).await.unwrap();
        let pinned = &graph.snapshot.relationships["pinned"];
        assert_eq!(pinned.decayed_confidence, pinned.original_confidence);
        assert!(graph.snapshot.relationships["plain"].decayed_confidence < 0.6);
    }
}

#[tokio::test]
async fn test_decayed_graph_accounting_holds_for_every_threshold() {
    let options = ServiceOptions {
        decay: Arc::new(DecayPolicy::new(DecayFunction::Linear)),
        ..ServiceOptions::default()
    };
    let (clock, service) = service_with(options).await;
    for (i, confidence) in [0.1, 0.3, 0.5, 0.7, 0.9].iter().enumerate() {
        service
            .record_relationship_change(
                &format!("rel-{}", i),
                edge("hub", &format!("leaf-{}", i), *confidence),
                "u",
                "create",
                "",
            )
            .await
            .unwrap();
        clock.advance(Duration::days(5));
    }

    for step in 0..=10 {
        let threshold = step as f64 / 10.0;
        let graph = service.get_decayed_graph(threshold).await.unwrap();
        assert_eq!(graph.total_relationships, 5);
        assert_eq!(
            graph.total_relationships,
            graph.snapshot.relationships.len() + graph.filtered_out
        );
        assert!(
            graph
                .snapshot
                .relationships
                .values()
                .all(|r| r.decayed_confidence >= threshold)
        );
    }
}

#[tokio::test]
async fn test_reinforcement_never_exceeds_original() {
    let (clock, service) = service().await;
    service
        .record_relationship_change("rel-1", edge("a", "b", 0.6), "u", "create", "")
        .await
        .unwrap();
    clock.advance(Duration::days(30));

    let before = service.get_decayed_graph(0.0).await.unwrap();
    let decayed = before.snapshot.relationships["rel-1"].decayed_confidence;
    assert!((decayed - 0.3).abs() < 1e-9);

    for _ in 0..50 {
        service.reinforce_relationship("rel-1").await.unwrap();
    }
    let after = service.get_decayed_graph(0.0).await.unwrap();
    let reinforced = after.snapshot.relationships["rel-1"].decayed_confidence;
    assert!(reinforced > decayed);
    assert!(reinforced <= 0.6);
    let stats = service.get_version_stats().await;
    assert_eq!(stats.decay_stats.reinforced_relationships, 1);
    assert_eq!(stats.decay_stats.average_reinforcements, 50.0);
}

#[tokio::test]
async fn test_index_symmetry_through_service() {
    let (clock, service) = service().await;
    let writes = [
        ("r1", "a", "b", "create"),
        ("r2", "b", "c", "create"),
        ("r3", "a", "c", "create"),
        ("r1", "a", "d", "update"),
        ("r2", "", "", "delete"),
        ("r4", "d", "a", "create"),
        ("r2", "c", "a", "create"),
    ];
    for (id, from, to, change) in writes {
        let data = if change == "delete" {
            DataMap::new()
        } else {
            edge(from, to, 0.5)
        };
        service
            .record_relationship_change(id, data, "u", change, "")
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        assert!(service.index_is_consistent());
    }

    assert_eq!(service.related_relationships("a", Direction::Forward), vec!["r1", "r3"]);
    assert_eq!(service.related_relationships("a", Direction::Reverse), vec!["r2", "r4"]);
    assert!(service.related_relationships("b", Direction::Reverse).is_empty());
    assert_eq!(service.related_relationships("d", Direction::Both), vec!["r1", "r4"]);

    // A full rebuild from the store yields the same answers
    let before: Vec<Vec<String>> = ["a", "b", "c", "d"]
        .iter()
        .map(|e| service.related_relationships(e, Direction::Both))
        .collect();
    let edges = service.rebuild_index(&CancellationToken::new()).await.unwrap();
    assert_eq!(edges, 4);
    let after: Vec<Vec<String>> = ["a", "b", "c", "d"]
        .iter()
        .map(|e| service.related_relationships(e, Direction::Both))
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_cancelled_rebuild_keeps_index() {
    let (_, service) = service().await;
    service
        .record_relationship_change("rel-1", edge("a", "b", 0.5), "u", "create", "")
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = service.rebuild_index(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(service.related_relationships("a", Direction::Forward), vec!["rel-1"]);

    let err = service
        .graph_at_time(start(), false, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E301");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_across_entities() {
    let (_, service) = service().await;
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("memory-{}", worker);
            for step in 0..10 {
                let change = if step == 0 { "create" } else { "update" };
                service
                    .record_element_change(&id, "memory", map(json!({"step": step})), "u", change, "")
                    .await
                    .unwrap();
                service
                    .record_relationship_change(
                        &format!("link-{}-{}", worker, step),
                        edge(&id, "hub", 0.5),
                        "u",
                        "create",
                        "",
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = service.get_version_stats().await;
    assert_eq!(stats.tracked_elements, 8);
    assert_eq!(stats.total_element_versions, 80);
    assert_eq!(stats.tracked_relationships, 80);
    assert_eq!(service.related_relationships("hub", Direction::Reverse).len(), 80);
    assert!(service.index_is_consistent());

    for worker in 0..8 {
        let history = service
            .get_element_history(&format!("memory-{}", worker), None, None)
            .await
            .unwrap();
        let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
        assert_eq!(versions, (1..=10).collect::<Vec<u64>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_index_consistent_under_interleaved_reads_and_writes() {
    let (_, service) = service().await;
    let service = Arc::new(service);

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..25 {
                let id = format!("edge-{}-{}", worker, step);
                let leaf = format!("leaf-{}-{}", worker, step);
                service
                    .record_relationship_change(&id, edge("hub", &leaf, 0.5), "u", "create", "")
                    .await
                    .unwrap();
                service
                    .record_relationship_change(&id, edge(&leaf, "hub", 0.5), "u", "update", "")
                    .await
                    .unwrap();
                if step % 3 == 0 {
                    service
                        .record_relationship_change(&id, DataMap::new(), "u", "delete", "")
                        .await
                        .unwrap();
                }
            }
        }));
    }
    for reader in 0..4 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..50 {
                service.related_relationships("hub", Direction::Forward);
                service.related_relationships("hub", Direction::Reverse);
                assert!(service.index_is_consistent());
                if reader == 0 && step % 10 == 0 {
                    service.rebuild_index(&CancellationToken::new()).await.unwrap();
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut expected: Vec<String> = (0..4)
        .flat_map(|worker| {
            (0..25)
                .filter(|step| step % 3 != 0)
                .map(move |step| format!("edge-{}-{}", worker, step))
        })
        .collect();
    expected.sort();

    assert!(service.index_is_consistent());
    assert!(service.related_relationships("hub", Direction::Forward).is_empty());
    assert_eq!(service.related_relationships("hub", Direction::Reverse), expected);

    let mut live: Vec<String> = service
        .version_store()
        .current_relationships()
        .await
        .into_iter()
        .map(|version| version.entity_id)
        .collect();
    live.sort();
    assert_eq!(live, expected);
}

#[tokio::test]
async fn test_journal_roundtrip_preserves_answers() {
    let (clock, service) = service().await;
    service
        .record_element_change("skill-1", "skill", map(json!({"level": 1})), "u", "create", "")
        .await
        .unwrap();
    service
        .record_relationship_change("rel-1", edge("skill-1", "persona-1", 0.8), "u", "create", "")
        .await
        .unwrap();
    clock.advance(Duration::days(2));
    service
        .record_relationship_change("rel-2", edge("persona-1", "skill-1", 0.4), "u", "create", "")
        .await
        .unwrap();
    service
        .record_relationship_change("rel-1", DataMap::new(), "u", "delete", "")
        .await
        .unwrap();

    let mut journal = Vec::new();
    export_store(service.version_store(), &mut journal)
        .await
        .unwrap();

    let restored_store = import_from_reader(std::io::Cursor::new(journal), clock.clone()).unwrap();
    let restored = TemporalService::open(Arc::new(restored_store), ServiceOptions::default())
        .await
        .unwrap();

    assert_eq!(
        restored.get_version_stats().await,
        service.get_version_stats().await
    );
    for at in [start(), start() + Duration::days(1), start() + Duration::days(3)] {
        assert_eq!(
            restored.get_graph_at_time(at, true).await.unwrap(),
            service.get_graph_at_time(at, true).await.unwrap()
        );
    }
    assert_eq!(
        restored.related_relationships("persona-1", Direction::Both),
        vec!["rel-2"]
    );
}
