use dialogc::loader::{FileProjectSource, ProjectSource};
use std::fs;
use uuid::Uuid;

#[tokio::test]
async fn test_load_yaml_snapshot_and_project() {
    let project_id = Uuid::from_u128(1000);
    let dialog_id = Uuid::from_u128(1);

    let snapshot_yaml = format!(
        r#"
ProjectID: "{project_id}"
Version: 4
Title: "Lost Keys"
Tags: ["mystery"]
ProjectData:
  - ActorID: "{actor}"
    ZoneID: "{zone}"
    DialogID: "{dialog_id}"
    DialogEntry: ["Where are my keys?"]
    AlwaysExec:
      PlaySounds:
        - SoundType: 0
          Value: "Check the kitchen."
    IsRoot: true
TriggerData: []
"#,
        actor = Uuid::from_u128(500),
        zone = Uuid::from_u128(600),
    );
    let project_json = format!(r#"{{"ID": "{project_id}", "Title": "Lost Keys", "StartZoneID": null}}"#);

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let project_dir = temp_dir.path().join(project_id.to_string());
    fs::create_dir_all(&project_dir).unwrap();
    fs::write(project_dir.join("4.yaml"), snapshot_yaml).expect("Failed to write snapshot");
    fs::write(project_dir.join("project.json"), project_json).expect("Failed to write project");

    let source = FileProjectSource::new(temp_dir.path());

    let snapshot = source.load_versioned(project_id, 4).await.expect("Failed to load snapshot");
    assert_eq!(snapshot.title, "Lost Keys");
    assert_eq!(snapshot.tags, Some(vec!["mystery".to_string()]));
    assert_eq!(snapshot.project_data.len(), 1);
    assert_eq!(snapshot.project_data[0].dialog_id, dialog_id);
    assert!(snapshot.project_data[0].is_root);

    let project = source.load_project(project_id).await.expect("Failed to load project");
    assert_eq!(project.id, project_id);
    assert_eq!(project.start_zone_id, None);
}

#[tokio::test]
async fn test_missing_version_is_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = FileProjectSource::new(temp_dir.path());

    let err = source.load_versioned(Uuid::from_u128(1), 2).await.unwrap_err();
    assert!(err.to_string().contains("No 2 document"));
}

#[tokio::test]
async fn test_mismatched_snapshot_is_rejected() {
    let project_id = Uuid::from_u128(1);
    let temp_dir = tempfile::tempdir().unwrap();
    let project_dir = temp_dir.path().join(project_id.to_string());
    fs::create_dir_all(&project_dir).unwrap();
    fs::write(
        project_dir.join("-1.json"),
        format!(r#"{{"ProjectID": "{project_id}", "Version": 3, "Title": "t"}}"#),
    )
    .unwrap();

    let source = FileProjectSource::new(temp_dir.path());
    assert!(source.load_versioned(project_id, -1).await.is_err());
}
