//! Composite field operations over a storage loaded from YAML

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use swissarmyhammer_subfields::composite;
use swissarmyhammer_subfields::mock::{MockFieldTypes, MockRecord, MockWidgets};
use swissarmyhammer_subfields::{
    CompositeFieldConfig, CompositeFieldStorage, DisplaySettings, Record, SubfieldSession,
    SubfieldsConfig,
};
use tempfile::TempDir;

const EVENT_STORAGE: &str = r#"
name: event
target_entity_type: node
revisionable: true
storage:
  title:
    type: string
    label: Title
    settings:
      maxlength: 80
  link:
    type: link
    label: Link
  featured:
    type: boolean
    label: Featured
  category:
    type: field_ui:list_string:preset_a
    label: Category
"#;

const EVENT_FIELD: &str = r#"
field_name: event
entity_type: node
bundle: page
fields:
  link:
    required: false
"#;

fn load_event() -> (CompositeFieldStorage, CompositeFieldConfig) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("event.yaml");
    std::fs::write(&path, EVENT_STORAGE).unwrap();
    let storage = CompositeFieldStorage::load(&path).unwrap();
    let field = CompositeFieldConfig::from_yaml(EVENT_FIELD).unwrap();
    (storage, field)
}

fn session(config: SubfieldsConfig) -> SubfieldSession {
    SubfieldSession::builder(Arc::new(MockFieldTypes::standard()))
        .widgets(Arc::new(MockWidgets::new()))
        .config(config)
        .build()
}

#[test]
fn schema_and_constraints_from_yaml_storage() {
    let (storage, field) = load_event();
    let mut session = session(SubfieldsConfig::default());

    let schema = composite::schema(&mut session, &storage).unwrap();
    assert_eq!(
        schema.column_names().collect::<Vec<_>>(),
        vec!["title_value", "link_uri", "link_title", "featured_value", "category_value"]
    );

    let constraints = composite::constraints(&mut session, &storage, Some(&field))
        .unwrap();
    assert_eq!(constraints["title_value"]["Length"], json!({"max": 80}));
    assert!(constraints["title_value"].contains_key("NotBlank"));
    assert!(constraints["featured_value"].contains_key("NotEqualTo"));
    assert!(!constraints.contains_key("link_uri"));

    let deps = composite::storage_dependencies(&session, &storage).unwrap();
    assert_eq!(deps, vec!["core", "link", "options"]);
}

#[test]
fn optional_by_default_when_configured() {
    let (storage, _) = load_event();
    let mut config = SubfieldsConfig::default();
    config.fields_default.required = Some(false);
    let mut session = session(config);

    let constraints = composite::constraints(&mut session, &storage, None).unwrap();
    assert!(constraints
        .values()
        .all(|c| !c.contains_key("NotBlank") && !c.contains_key("NotEqualTo")));
}

#[test]
fn submitted_form_round_trips_to_record() {
    let (storage, field) = load_event();
    let mut session = session(SubfieldsConfig::default());

    let submitted = vec![IndexMap::from([
        ("title".to_string(), json!({"value": "Launch"}).as_object().cloned().unwrap()),
        ("featured".to_string(), json!({"value": false}).as_object().cloned().unwrap()),
        ("category".to_string(), json!({"value": "a"}).as_object().cloned().unwrap()),
    ])];
    let rows = composite::assemble_rows(
        &mut session,
        &storage,
        Some(&field),
        &DisplaySettings::new(),
        &submitted,
    )
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("featured_value"), Some(&Value::Null));

    let record = MockRecord::new("node", "11");
    for row in rows {
        record.push_row("event", row);
    }
    let titles = composite::subfield_values(&mut session, &storage, &record, "title")
        .unwrap();
    assert_eq!(titles[0].get("value"), Some(&json!("Launch")));
    assert!(!composite::is_empty(
        &mut session,
        &storage,
        &record,
        0,
        &record.field_value("event", 0).unwrap()
    )
    .unwrap());
}

#[test]
fn adding_subfields_uses_default_spec() {
    let (mut storage, _) = load_event();
    let id = storage.add_subfield();
    assert_eq!(id, "value_4");

    let mut session = session(SubfieldsConfig::default());
    let schema = composite::schema(&mut session, &storage).unwrap();
    assert!(schema.columns.contains_key("value_4_value"));

    storage.remove_last_subfield();
    let schema = composite::schema(&mut session, &storage).unwrap();
    assert!(!schema.columns.contains_key("value_4_value"));
}
