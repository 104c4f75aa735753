//! Black-box integration tests driving the engine only through the
//! public `Operation` wire API, one `tempfile::TempDir`-backed store
//! per test. No stdio transport, no sampling callback — the language
//! model always falls through to its heuristic/fallback paths here,
//! since neither a sampling capability nor network access is available
//! in this harness.

use memory_palace_core::config::ConfigStore;
use memory_palace_core::engine::Engine;
use memory_palace_core::error::Error;
use memory_palace_core::protocol::{
    ChangelogRecordParams, ComponentCreateParams, DecayPinParams, DecayPreviewParams,
    ScopeKeyParams, SummaryUpdateParams,
};
use memory_palace_core::store::{ComponentType, StoreLayout};
use memory_palace_core::changelog::EntryKind;

fn start() -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let layout = StoreLayout::new(dir.path());
    let config = ConfigStore::load_or_init(layout.config_path()).unwrap();
    let engine = Engine::new(layout, config, None).unwrap();
    (dir, engine)
}

/// Scenario 1: a decision changelog entry is validated before being
/// recorded, and a near-duplicate decision is flagged by the heuristic
/// fallback once the language model is unreachable.
#[tokio::test]
async fn decision_changelog_entry_is_validated_and_duplicate_is_flagged() {
    let (_dir, engine) = start();

    engine
        .dispatch(memory_palace_core::protocol::Operation::ComponentCreate(
            ComponentCreateParams {
                ty: ComponentType::Projects,
                key: "palace".to_string(),
                summary: "# palace\n\nthe memory store itself.\n".to_string(),
            },
        ))
        .await
        .unwrap();

    let first = engine
        .dispatch(memory_palace_core::protocol::Operation::ChangelogRecord(
            ChangelogRecordParams {
                scope: "projects/palace".to_string(),
                kind: EntryKind::Decision,
                decision: Some("use toml for on-disk documents".to_string()),
                rationale: Some("matches every other store file".to_string()),
                summary: "picked toml for component documents".to_string(),
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    assert!(first["outcome"]["wrote_to_component"].as_bool().unwrap());
    let verdict = &first["validation"];
    assert!(!verdict.is_null());
    assert_eq!(verdict["passed"], serde_json::json!(true));

    let second = engine
        .dispatch(memory_palace_core::protocol::Operation::ChangelogRecord(
            ChangelogRecordParams {
                scope: "projects/palace".to_string(),
                kind: EntryKind::Decision,
                decision: Some("use toml for on-disk documents".to_string()),
                rationale: Some("matches every other store file".to_string()),
                summary: "picked toml for component documents".to_string(),
                ..Default::default()
            },
        ))
        .await
        .unwrap();
    let verdict = &second["validation"];
    assert_eq!(verdict["passed"], serde_json::json!(false));
    assert_eq!(verdict["risks"][0]["type"], serde_json::json!("duplicate"));

    // the entry is still written even though the validator flagged it —
    // validation is advisory, not a gate.
    let query = engine
        .dispatch(memory_palace_core::protocol::Operation::ChangelogQuery(
            Default::default(),
        ))
        .await
        .unwrap();
    assert_eq!(query["entries"].as_array().unwrap().len(), 2);
}

/// Scenario 2: saving a snapshot with only `current_focus` set inherits
/// every other field from the prior snapshot.
#[tokio::test]
async fn snapshot_save_inherits_unsupplied_fields_from_the_prior_save() {
    use memory_palace_core::protocol::{Operation, SnapshotSaveParams};
    use memory_palace_core::snapshot::{ActiveTask, Priority, TaskStatus};

    let (_dir, engine) = start();

    let first = engine
        .dispatch(Operation::SnapshotSave(SnapshotSaveParams {
            current_focus: "bootstrapping the store".to_string(),
            updated_by: Some("assistant".to_string()),
            active_tasks: Some(vec![ActiveTask {
                description: "write the engine".to_string(),
                status: TaskStatus::Active,
                priority: Some(Priority::High),
                blockers: Vec::new(),
            }]),
            blockers: Some(vec!["none".to_string()]),
            recent_decisions: Some(vec!["use toml".to_string()]),
            context_notes: Some("first session".to_string()),
        }))
        .await
        .unwrap();
    assert_eq!(first["current_focus"], serde_json::json!("bootstrapping the store"));

    let second = engine
        .dispatch(Operation::SnapshotSave(SnapshotSaveParams {
            current_focus: "writing integration tests".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap();

    assert_eq!(second["current_focus"], serde_json::json!("writing integration tests"));
    // everything else was inherited, not wiped, by the bare second save.
    assert_eq!(second["blockers"], serde_json::json!(["none"]));
    assert_eq!(second["recent_decisions"], serde_json::json!(["use toml"]));
    assert_eq!(second["context_notes"], serde_json::json!("first session"));
    assert_eq!(
        second["active_tasks"][0]["description"],
        serde_json::json!("write the engine")
    );

    let read_back = engine
        .dispatch(Operation::SnapshotRead)
        .await
        .unwrap();
    assert_eq!(read_back["current_focus"], serde_json::json!("writing integration tests"));
}

/// Scenario 3: decay preview is gated by the summarizer's safe
/// watermark — until something has been digested, nothing is ever a
/// candidate for archival, no matter how old it looks.
#[tokio::test]
async fn decay_preview_is_empty_until_something_has_been_digested() {
    let (_dir, engine) = start();

    engine
        .dispatch(memory_palace_core::protocol::Operation::ComponentCreate(
            ComponentCreateParams {
                ty: ComponentType::Knowledge,
                key: "rust-patterns".to_string(),
                summary: "# rust-patterns\n".to_string(),
            },
        ))
        .await
        .unwrap();

    for i in 0..3 {
        engine
            .dispatch(memory_palace_core::protocol::Operation::ChangelogRecord(
                ChangelogRecordParams {
                    scope: "knowledge/rust-patterns".to_string(),
                    kind: EntryKind::Operation,
                    summary: format!("noted pattern {i}"),
                    validate: Some(false),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
    }

    let preview = engine
        .dispatch(memory_palace_core::protocol::Operation::DecayPreview(
            DecayPreviewParams { threshold: Some(1000.0) },
        ))
        .await
        .unwrap();
    assert!(preview["candidates"].as_array().unwrap().is_empty());
}

/// Scenario 4: pinning an entry round-trips through config and is
/// visible to later reads, independent of the decay engine itself.
#[tokio::test]
async fn pinning_an_entry_persists_through_config() {
    use memory_palace_core::protocol::{ConfigGetParams, Operation};

    let (_dir, engine) = start();

    engine
        .dispatch(Operation::DecayPin(DecayPinParams {
            entry_id: "op_0731_001".to_string(),
            action: "pin".to_string(),
        }))
        .await
        .unwrap();

    let pinned = engine
        .dispatch(Operation::ConfigGet(ConfigGetParams {
            path: Some("decay.pinned_entries".to_string()),
        }))
        .await
        .unwrap();
    assert_eq!(pinned, serde_json::json!(["op_0731_001"]));

    // pinning an already-pinned entry is rejected, not a silent no-op.
    let already_pinned = engine
        .dispatch(Operation::DecayPin(DecayPinParams {
            entry_id: "op_0731_001".to_string(),
            action: "pin".to_string(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(already_pinned, Error::InvalidArgument(_)));

    engine
        .dispatch(Operation::DecayPin(DecayPinParams {
            entry_id: "op_0731_001".to_string(),
            action: "unpin".to_string(),
        }))
        .await
        .unwrap();
    let unpinned = engine
        .dispatch(Operation::ConfigGet(ConfigGetParams {
            path: Some("decay.pinned_entries".to_string()),
        }))
        .await
        .unwrap();
    assert_eq!(unpinned, serde_json::json!([]));

    let bad = engine
        .dispatch(Operation::DecayPin(DecayPinParams {
            entry_id: "op_0731_001".to_string(),
            action: "frobnicate".to_string(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(bad, Error::InvalidArgument(_)));
}

/// Scenario 5: with no external search CLI on `PATH` and the advanced-
/// search feature off, the router falls back to the always-available
/// simple backend, and a raw search against it actually finds an
/// indexed summary.
#[tokio::test]
async fn search_falls_back_to_the_simple_backend_and_finds_indexed_content() {
    use memory_palace_core::protocol::{Operation, RawSearchParams};

    let (_dir, engine) = start();

    engine
        .dispatch(Operation::ComponentCreate(ComponentCreateParams {
            ty: ComponentType::Skills,
            key: "rust-async".to_string(),
            summary: "# rust-async\n\nknows tokio and async-trait well.\n".to_string(),
        }))
        .await
        .unwrap();

    let status = engine.dispatch(Operation::SearchStatus).await.unwrap();
    assert!(status["available"]
        .as_array()
        .unwrap()
        .iter()
        .any(|b| b == "simple"));

    engine.dispatch(Operation::SearchReindex).await.unwrap();

    let hits = engine
        .dispatch(Operation::RawSearch(RawSearchParams {
            query: "tokio".to_string(),
            scope: None,
            limit: Some(5),
        }))
        .await
        .unwrap();
    assert!(!hits["hits"].as_array().unwrap().is_empty());

    let status_after = engine.dispatch(Operation::SearchStatus).await.unwrap();
    assert_eq!(status_after["active"], serde_json::json!("simple"));
}

/// Scenario 6: the health check flags an L0 line whose backing
/// component directory was removed out from under it, a form of
/// index-vs-filesystem drift no other system notices on its own.
#[tokio::test]
async fn health_check_flags_l0_entries_with_no_backing_directory() {
    use memory_palace_core::protocol::Operation;

    let (dir, engine) = start();

    engine
        .dispatch(Operation::ComponentCreate(ComponentCreateParams {
            ty: ComponentType::Projects,
            key: "throwaway".to_string(),
            summary: "# throwaway\n".to_string(),
        }))
        .await
        .unwrap();

    let layout = StoreLayout::new(dir.path());
    std::fs::remove_dir_all(layout.component_dir(ComponentType::Projects, "throwaway")).unwrap();

    let report = engine
        .dispatch(Operation::SystemExecute(memory_palace_core::protocol::SystemExecuteParams {
            name: "health".to_string(),
            params: serde_json::json!({}),
        }))
        .await
        .unwrap();

    assert_eq!(report["success"], serde_json::json!(true));
    assert!(report["issues"]
        .as_array()
        .unwrap()
        .iter()
        .any(|issue| issue["category"] == serde_json::json!("orphan_index")));
}

/// Scenario 7: `component_unload` reports whether the scope was loaded,
/// which only holds if the loaded-scope bookkeeping survives across the
/// separate `component_load`/`component_unload` dispatch calls.
#[tokio::test]
async fn component_unload_reports_whether_previously_loaded() {
    use memory_palace_core::protocol::Operation;

    let (_dir, engine) = start();

    engine
        .dispatch(Operation::ComponentCreate(ComponentCreateParams {
            ty: ComponentType::Knowledge,
            key: "loaded-twice".to_string(),
            summary: "# loaded-twice\n".to_string(),
        }))
        .await
        .unwrap();

    let key = "knowledge/loaded-twice".to_string();

    let before_load = engine
        .dispatch(Operation::ComponentUnload(ScopeKeyParams { key: key.clone() }))
        .await
        .unwrap();
    assert_eq!(before_load["was_loaded"], serde_json::json!(false));

    engine
        .dispatch(Operation::ComponentLoad(ScopeKeyParams { key: key.clone() }))
        .await
        .unwrap();

    let after_load = engine
        .dispatch(Operation::ComponentUnload(ScopeKeyParams { key: key.clone() }))
        .await
        .unwrap();
    assert_eq!(after_load["was_loaded"], serde_json::json!(true));

    let again = engine
        .dispatch(Operation::ComponentUnload(ScopeKeyParams { key }))
        .await
        .unwrap();
    assert_eq!(again["was_loaded"], serde_json::json!(false));
}

/// A summary update re-upserts the L0 line for the same component, and
/// a subsequent changelog entry is visible through `component_load`'s
/// bundled changelog view.
#[tokio::test]
async fn summary_update_and_component_load_stay_consistent() {
    use memory_palace_core::protocol::Operation;

    let (_dir, engine) = start();

    engine
        .dispatch(Operation::ComponentCreate(ComponentCreateParams {
            ty: ComponentType::Relationships,
            key: "teammate".to_string(),
            summary: "# teammate\n\nworks well with the team.\n".to_string(),
        }))
        .await
        .unwrap();

    engine
        .dispatch(Operation::SummaryUpdate(SummaryUpdateParams {
            key: "relationships/teammate".to_string(),
            content: "# teammate\n\nships quickly and reviews carefully.\n".to_string(),
        }))
        .await
        .unwrap();

    let fetched = engine
        .dispatch(Operation::SummaryGet(ScopeKeyParams {
            key: "relationships/teammate".to_string(),
        }))
        .await
        .unwrap();
    assert!(fetched["content"]
        .as_str()
        .unwrap()
        .contains("ships quickly"));

    let loaded = engine
        .dispatch(Operation::ComponentLoad(ScopeKeyParams {
            key: "relationships/teammate".to_string(),
        }))
        .await
        .unwrap();
    assert!(loaded["summary"]
        .as_str()
        .unwrap()
        .contains("ships quickly"));
}
