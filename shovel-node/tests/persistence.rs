//! Configuration save and load

use serde_json::json;
use shovel_core::domain::task::TaskParams;
use shovel_core::domain::trigger::TriggerKind;
use shovel_node::persistence::read_document;
use shovel_node::{Node, NodeConfig, TaskInput};
use std::io::Write;

#[test]
fn test_save_then_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut script = tempfile::Builder::new()
        .suffix(".py")
        .tempfile_in(dir.path())
        .unwrap();
    writeln!(script, "print('hello')").unwrap();
    let path = dir.path().join("shovel.json");

    let original = Node::new(NodeConfig::new("keeper"));
    original.create_pipeline("P1").unwrap();
    original.create_pipeline("P2").unwrap();
    original
        .add_task(
            "P1",
            TaskInput::new()
                .function(original.registry(), "sample", TaskParams::new())
                .unwrap(),
        )
        .unwrap();
    original
        .add_task("P1", TaskInput::new().shell("bash", "echo hi"))
        .unwrap();
    original
        .add_task("P2", TaskInput::new().file(script.path().to_string_lossy()))
        .unwrap();
    original
        .schedule_pipeline(
            "P1",
            "cron",
            serde_json::from_value(json!({"hour": "1", "minute": "0", "day_of_week": "mon-fri"}))
                .unwrap(),
        )
        .unwrap();
    original
        .schedule_pipeline(
            "P2",
            "monitor",
            serde_json::from_value(json!({"metric": "memory", "threshold": "80"})).unwrap(),
        )
        .unwrap();
    original.save_config(&path).unwrap();

    let document = read_document(&path).unwrap();
    assert_eq!(document.client_name, "keeper");

    let restored = Node::new(NodeConfig::new("keeper"));
    restored.load_config(&path).unwrap();

    assert_eq!(restored.pipelines().names(), vec!["P1", "P2"]);
    assert_eq!(restored.pipelines().get("P1").unwrap().len(), 2);
    assert_eq!(restored.pipelines().get("P2").unwrap().len(), 1);

    let before = original.scheduler().all();
    let after = restored.scheduler().all();
    assert_eq!(after.len(), 2);
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.pipeline, b.pipeline);
        assert_eq!(a.trigger_type, b.trigger_type);
        assert_eq!(a.trigger_args, b.trigger_args);
    }
    assert_eq!(after[1].trigger_type, TriggerKind::Monitor);
}

#[test]
fn test_load_replaces_existing_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(&path, r#"{"client_name": "fresh"}"#).unwrap();

    let node = Node::new(NodeConfig::new("fresh"));
    node.create_pipeline("old").unwrap();
    node.load_config(&path).unwrap();

    assert!(node.pipelines().names().is_empty());
    assert_eq!(node.show_pipelines(), "No pipelines available.");
}
