//! Registry dedup and persistence tests

use std::sync::Arc;

use hermes_protocol::Message;

use crate::{StoreConfig, StoreError, StoreRegistry};

fn message() -> Message {
    Message::parse("MSH|^~\\&|APP|ORG|||20240102030405||ADT|MSG00001|P|2.5.1").unwrap()
}

#[test]
fn test_structurally_equal_configs_share_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let a = StoreConfig::file(dir.path());
    let b = StoreConfig::file(dir.path());

    let registry = StoreRegistry::init([&a, &b]).unwrap();
    assert_eq!(registry.len(), 1);

    let first = registry.resolve(&a).unwrap().unwrap();
    let second = registry.resolve(&b).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_differing_configs_get_distinct_instances() {
    let dir = tempfile::tempdir().unwrap();
    let a = StoreConfig::file(dir.path().join("adt"));
    let b = StoreConfig::file(dir.path().join("oru"));

    let registry = StoreRegistry::init([&a, &b]).unwrap();
    assert_eq!(registry.len(), 2);

    let first = registry.resolve(&a).unwrap().unwrap();
    let second = registry.resolve(&b).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_persist_writes_one_file_per_message() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path());
    let registry = StoreRegistry::init([&config]).unwrap();

    assert!(registry.persist(&config, &message()).await.unwrap());
    assert!(registry.persist(&config, &message()).await.unwrap());

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 2);

    // Repeated control ids must not overwrite each other.
    for entry in files {
        let name = entry.unwrap().file_name().into_string().unwrap();
        assert!(name.starts_with("MSG00001-"));
        assert!(name.ends_with(".hl7"));
    }
}

#[tokio::test]
async fn test_persist_unknown_config_is_an_error() {
    let registry = StoreRegistry::new();
    let config = StoreConfig::Memory;

    let err = registry.persist(&config, &message()).await.unwrap_err();
    assert!(matches!(err, StoreError::UnknownConfig { .. }));
}

#[tokio::test]
async fn test_persist_round_trips_message_text() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path());
    let registry = StoreRegistry::init([&config]).unwrap();

    let msg = message();
    registry.persist(&config, &msg).await.unwrap();

    let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
    let text = std::fs::read_to_string(entry.path()).unwrap();
    assert_eq!(Message::parse(&text).unwrap(), msg);
}
