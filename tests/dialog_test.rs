use dialogc::compiler::actions::encode_action;
use dialogc::compiler::{DialogOptions, compile_dialog};
use dialogc::error::CompileError;
use dialogc::keys::{self, UNKNOWN_INPUT_SENTINEL};
use dialogc::model::ProjectItem;
use dialogc::model::action::{PlaySound, RuntimeAction};
use dialogc::sink::store::{KeyValueStore, MemoryStore};
use dialogc::sink::{self, KeyTracker};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

const PID: &str = "p1";

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn actor() -> Uuid {
    id(500)
}

fn row(node: u128, edge: Option<(u128, u128)>, root: bool, entry: &[&str]) -> ProjectItem {
    ProjectItem {
        project_id: id(1000),
        actor_id: actor(),
        zone_id: id(600),
        dialog_id: id(node),
        dialog_entry: Some(entry.iter().map(|s| s.to_string()).collect()),
        always_exec: Value::Null,
        statements: None,
        is_root: root,
        unknown_handler: false,
        parent_dialog_id: edge.map(|(p, _)| id(p)),
        child_dialog_id: edge.map(|(_, c)| id(c)),
    }
}

async fn compile(rows: &[ProjectItem]) -> Result<Arc<MemoryStore>, CompileError> {
    let store = Arc::new(MemoryStore::new());
    let tracker = KeyTracker::new(keys::tracked_keys(PID), Vec::new());
    let (sink, writer) = sink::channel(store.clone(), Some(tracker), 8);
    let compiled = compile_dialog(rows, sink, PID, DialogOptions::default()).await;
    writer.finish().await?;
    compiled?;
    Ok(store)
}

fn count_writes(store: &MemoryStore, key: &str, field: Option<&str>) -> usize {
    store
        .write_log()
        .iter()
        .filter(|r| r.key == key && r.field.as_deref() == field)
        .count()
}

#[tokio::test]
async fn test_shared_child_is_compiled_once() {
    // A -> C and B -> C, both roots; C -> D
    let rows = vec![
        row(1, Some((1, 3)), true, &["alpha"]),
        row(2, Some((2, 3)), true, &["beta"]),
        row(3, Some((1, 3)), false, &["gamma"]),
        row(3, Some((2, 3)), false, &["gamma"]),
        row(3, Some((3, 4)), false, &["gamma"]),
        row(4, Some((3, 4)), false, &["delta"]),
    ];
    let store = compile(&rows).await.unwrap();

    let shared = keys::compiled_dialog_node(PID, id(3));
    assert_eq!(count_writes(&store, &shared, None), 1);
    assert_eq!(count_writes(&store, &keys::compiled_action_bundle(PID, id(3), 0), None), 1);

    // C's subtree is entered once, whichever parent gets there first
    let grandchild = keys::compiled_dialog_node(PID, id(4));
    assert_eq!(count_writes(&store, &grandchild, None), 1);
    assert_eq!(count_writes(&store, &keys::compiled_action_bundle(PID, id(4), 0), None), 1);
    let table = keys::dialog_node_children(PID, id(3));
    assert_eq!(count_writes(&store, &table, Some("DELTA")), 1);
    assert_eq!(store.get(&shared).await.unwrap().unwrap()[0], 1);

    // registered under both parents
    for parent in [1, 2] {
        let table = keys::dialog_node_children(PID, id(parent));
        let target = store.hget(&table, "GAMMA").await.unwrap().unwrap();
        assert_eq!(target, shared.as_bytes());
    }
}

#[tokio::test]
async fn test_continuation_flag() {
    let rows = vec![row(1, Some((1, 2)), true, &["hi"]), row(2, Some((1, 2)), false, &["bye"])];
    let store = compile(&rows).await.unwrap();

    let parent = store.get(&keys::compiled_dialog_node(PID, id(1))).await.unwrap().unwrap();
    let leaf = store.get(&keys::compiled_dialog_node(PID, id(2))).await.unwrap().unwrap();
    assert_eq!(parent[0], 1);
    assert_eq!(leaf[0], 0);
}

#[tokio::test]
async fn test_roots_register_in_actor_table() {
    let rows = vec![row(1, None, true, &["Hello there!", "hi"])];
    let store = compile(&rows).await.unwrap();

    let table = keys::dialog_root_within_actor(PID, actor());
    let mut fields = store.hash_fields(&table);
    fields.sort();
    assert_eq!(fields, vec!["HELLO THERE", "HI"]);

    let target = store.hget(&table, "HI").await.unwrap().unwrap();
    assert_eq!(target, keys::compiled_dialog_node(PID, id(1)).as_bytes());
}

#[tokio::test]
async fn test_unknown_handler_uses_sentinel() {
    let mut fallback = row(2, Some((1, 2)), false, &["ignored"]);
    fallback.unknown_handler = true;
    let rows = vec![row(1, Some((1, 2)), true, &["hi"]), fallback];
    let store = compile(&rows).await.unwrap();

    let table = keys::dialog_node_children(PID, id(1));
    assert_eq!(store.hash_fields(&table), vec![UNKNOWN_INPUT_SENTINEL.to_string()]);
}

#[tokio::test]
async fn test_compiled_record_layout() {
    let mut node = row(1, None, true, &["Hello"]);
    node.always_exec = json!({"PlaySounds": [{"SoundType": 0, "Value": "Hello world"}]});
    node.statements = Some(json!([[{
        "conditions": [{"eq": {"123": "bar"}}],
        "then": {"PlaySounds": [{"SoundType": 0, "Value": "Goodbye"}]}
    }]]));
    let store = compile(&[node]).await.unwrap();

    let always_key = keys::compiled_action_bundle(PID, id(1), 0);
    let then_key = keys::compiled_action_bundle(PID, id(1), 1);

    let always = store.get(&always_key).await.unwrap().unwrap();
    assert_eq!(always, encode_action(&RuntimeAction::PlaySound(PlaySound::text("Hello world"))).unwrap());
    let then = store.get(&then_key).await.unwrap().unwrap();
    assert_eq!(then, encode_action(&RuntimeAction::PlaySound(PlaySound::text("Goodbye"))).unwrap());

    let mut expected = vec![0u8];
    expected.extend_from_slice(&(always_key.len() as u16).to_le_bytes());
    expected.extend_from_slice(always_key.as_bytes());
    expected.extend_from_slice(&[1, 1, 1, 1]);
    expected.extend_from_slice(&123u64.to_le_bytes());
    expected.push(0);
    expected.extend_from_slice(&3u16.to_le_bytes());
    expected.extend_from_slice(b"bar");
    expected.extend_from_slice(&(then_key.len() as u16).to_le_bytes());
    expected.extend_from_slice(then_key.as_bytes());

    let record = store.get(&keys::compiled_dialog_node(PID, id(1))).await.unwrap().unwrap();
    assert_eq!(record, expected);
}

#[tokio::test]
async fn test_bundles_are_written_before_the_record() {
    let mut node = row(1, Some((1, 2)), true, &["Hello"]);
    node.always_exec = json!({"PlaySounds": [{"SoundType": 1, "Value": "https://example.com/a.wav"}]});
    node.statements = Some(json!([
        [{"conditions": [{"gt": {"7": 3}}], "then": {"PlaySounds": []}}],
        [{"conditions": [], "then": null}, {"conditions": [{"ne": {"8": "x"}}], "then": null}]
    ]));
    let rows = vec![node, row(2, Some((1, 2)), false, &["next"])];
    let store = compile(&rows).await.unwrap();

    let log: Vec<String> = store.write_log().into_iter().map(|r| r.key).collect();
    let position = |key: &str| log.iter().position(|k| k == key).unwrap();

    let record = position(&keys::compiled_dialog_node(PID, id(1)));
    for sequence in 0..4 {
        assert!(position(&keys::compiled_action_bundle(PID, id(1), sequence)) < record);
    }
    assert!(!store.contains(&keys::compiled_action_bundle(PID, id(1), 4)));
    assert!(record < position(&keys::dialog_root_within_actor(PID, actor())));
    assert!(record < position(&keys::compiled_dialog_node(PID, id(2))));
}

#[tokio::test]
async fn test_recompile_is_byte_identical() {
    let mut node = row(1, Some((1, 2)), true, &["hi"]);
    node.statements = Some(json!([
        [{"conditions": [{"eq": {"2": "b", "1": "a"}, "lt": {"3": 10}}], "then": null}],
        [{"conditions": [{"gte": {"4": -1}}], "then": null}]
    ]));
    let rows = vec![node, row(2, Some((1, 2)), false, &["there"])];

    let first = compile(&rows).await.unwrap();
    let second = compile(&rows).await.unwrap();

    let mut first_keys = first.keys();
    first_keys.sort();
    let mut second_keys = second.keys();
    second_keys.sort();
    assert_eq!(first_keys, second_keys);

    for node in [1, 2] {
        let key = keys::compiled_dialog_node(PID, id(node));
        assert_eq!(first.get(&key).await.unwrap(), second.get(&key).await.unwrap());
    }
}

#[tokio::test]
async fn test_project_without_dialog() {
    let store = compile(&[]).await.unwrap();
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn test_orphans_are_still_compiled() {
    let rows = vec![row(1, None, true, &["hi"]), row(9, None, false, &["lost"])];
    let store = compile(&rows).await.unwrap();
    assert!(store.contains(&keys::compiled_dialog_node(PID, id(9))));
}

#[tokio::test]
async fn test_cycle_fails_the_job() {
    let rows = vec![
        row(1, Some((1, 2)), true, &["a"]),
        row(2, Some((2, 1)), false, &["b"]),
    ];
    let err = compile(&rows).await.unwrap_err();
    assert!(matches!(err, CompileError::Cycle(_)));
}

#[tokio::test]
async fn test_unknown_action_kind_fails_the_job() {
    let mut node = row(1, None, true, &["hi"]);
    node.always_exec = json!({"Teleport": [{"Zone": 1}]});
    let err = compile(&[node]).await.unwrap_err();
    assert!(matches!(err, CompileError::LogicDecode { ref owner, .. } if owner.contains(&id(1).to_string())));
}

#[tokio::test]
async fn test_many_roots_with_small_concurrency_limit() {
    let mut rows = Vec::new();
    for root in 0..20u128 {
        let parent = 100 + root;
        rows.push(row(parent, None, true, &["start"]));
        for child in 0..5u128 {
            let node = 1000 + root * 10 + child;
            rows.push(row(parent, Some((parent, node)), true, &["start"]));
            rows.push(row(node, Some((parent, node)), false, &["go"]));
        }
    }

    let store = Arc::new(MemoryStore::new());
    let (sink, writer) = sink::channel(store.clone(), None, 2);
    let options = DialogOptions { max_concurrency: 2, ..DialogOptions::default() };
    let graph = compile_dialog(&rows, sink, PID, options).await.unwrap();
    writer.finish().await.unwrap();

    assert_eq!(graph.len(), 120);
    for node in graph.ids() {
        assert!(store.contains(&keys::compiled_dialog_node(PID, node)));
    }
}
