//! Integration tests for building and publishing signature databases.

use std::sync::Arc;
use std::time::{Duration, Instant};

use replty_common::Visibility;
use replty_sig::{LoadState, SigError, SignatureDb, SignatureStore, TypeExpr};

const ENUMERABLE: &str = r#"{
  "classes": [
    {
      "name": "Enumerable",
      "type_params": ["Elem"],
      "instance_methods": {
        "first": { "overloads": [ { "function": { "return_type": { "kind": "variable", "name": "Elem" } } } ] },
        "to_a": { "overloads": [ { "function": { "return_type": { "kind": "class_instance", "name": "Array", "args": [ { "kind": "variable", "name": "Elem" } ] } } } ] }
      }
    }
  ]
}"#;

const COLLECTIONS: &str = r#"{
  "classes": [
    {
      "name": "Object",
      "instance_methods": {
        "puts": { "overloads": [ { "function": { "return_type": { "kind": "nil" } } } ], "visibility": "private" }
      }
    },
    {
      "name": "Array",
      "type_params": ["Elem"],
      "superclass": { "name": "Object" },
      "includes": [ { "name": "Enumerable", "args": [ { "kind": "variable", "name": "Elem" } ] } ],
      "instance_methods": {
        "size": { "overloads": [ { "function": { "return_type": { "kind": "class_instance", "name": "Integer" } } } ] }
      }
    },
    {
      "name": "Hash",
      "type_params": ["K", "V"],
      "superclass": { "name": "Object" },
      "includes": [ { "name": "Enumerable", "args": [ { "kind": "tuple", "types": [ { "kind": "variable", "name": "K" }, { "kind": "variable", "name": "V" } ] } ] } ],
      "singleton_methods": {
        "[]": { "overloads": [ { "function": { "return_type": { "kind": "instance" } } } ] }
      }
    }
  ]
}"#;

fn write_docs(dir: &std::path::Path) {
    std::fs::write(dir.join("a_enumerable.json"), ENUMERABLE).unwrap();
    std::fs::write(dir.join("b_collections.json"), COLLECTIONS).unwrap();
    std::fs::write(dir.join("notes.txt"), "not a signature").unwrap();
}

#[test]
fn directory_load_merges_documents() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path());

    let db = SignatureDb::from_path(dir.path()).unwrap();
    assert_eq!(db.class_count(), 4);
    assert_eq!(db.type_params("Hash"), ["K".to_string(), "V".to_string()]);

    let names: Vec<String> = db.ancestors("Array").into_iter().map(|a| a.name).collect();
    assert_eq!(names, vec!["Array", "Enumerable", "Object"]);
}

#[test]
fn included_methods_are_expressed_in_the_includer_params() {
    let mut db = SignatureDb::from_json_str(ENUMERABLE).unwrap();
    db.extend_from_json_str(COLLECTIONS, None).unwrap();

    let first = db.lookup("Array", "first", false).unwrap();
    assert_eq!(first.overloads[0].function.return_type, TypeExpr::variable("Elem"));

    let first = db.lookup("Hash", "first", false).unwrap();
    assert_eq!(
        first.overloads[0].function.return_type,
        TypeExpr::Tuple {
            types: vec![TypeExpr::variable("K"), TypeExpr::variable("V")]
        }
    );

    assert!(db.lookup("Hash", "[]", true).is_some());
    assert!(db.lookup("Hash", "[]", false).is_none());
    assert!(db.lookup("Array", "missing", false).is_none());
}

#[test]
fn method_listing_keeps_visibility() {
    let mut db = SignatureDb::from_json_str(ENUMERABLE).unwrap();
    db.extend_from_json_str(COLLECTIONS, None).unwrap();
    let methods = db.methods("Array", false);
    assert!(methods.contains(&("size".to_string(), Visibility::Public)));
    assert!(methods.contains(&("first".to_string(), Visibility::Public)));
    assert!(methods.contains(&("puts".to_string(), Visibility::Private)));
    assert!(methods.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn parse_errors_carry_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, "{ \"classes\": 3 }").unwrap();

    let err = SignatureDb::from_path(&bad).unwrap_err();
    assert!(matches!(err, SigError::Parse { path: Some(ref p), .. } if p == &bad));
    assert!(err.to_string().starts_with("invalid signature file"));

    let missing = dir.path().join("missing.json");
    let err = SignatureDb::from_path(&missing).unwrap_err();
    assert!(matches!(err, SigError::Io { .. }));
}

#[test]
fn store_reports_failures_and_recovers() {
    let store = SignatureStore::new();
    assert_eq!(store.state(), LoadState::NotStarted);
    assert!(store.get().is_none());

    let err = store.load_with(|| SignatureDb::from_json_str("nope"));
    assert!(err.is_err());
    assert!(matches!(store.state(), LoadState::Failed(_)));
    assert!(store.get().is_none());

    store.load_with(|| SignatureDb::from_json_str(ENUMERABLE)).unwrap();
    assert_eq!(store.state(), LoadState::Ready);
    assert!(store.get().unwrap().class("Enumerable").is_some());
}

#[test]
fn load_during_a_running_load_is_skipped() {
    let store = SignatureStore::new();
    let mut inner_ran = false;
    store
        .load_with(|| {
            assert_eq!(store.state(), LoadState::InProgress);
            store
                .load_with(|| {
                    inner_ran = true;
                    SignatureDb::from_json_str(COLLECTIONS)
                })
                .unwrap();
            SignatureDb::from_json_str(ENUMERABLE)
        })
        .unwrap();

    assert!(!inner_ran);
    assert_eq!(store.state(), LoadState::Ready);
    let db = store.get().unwrap();
    assert!(db.class("Enumerable").is_some());
    assert!(db.class("Array").is_none());
}

#[test]
fn preload_runs_once_in_background() {
    let dir = tempfile::tempdir().unwrap();
    write_docs(dir.path());

    let store = Arc::new(SignatureStore::new());
    assert!(store.preload(vec![dir.path().to_path_buf()]));
    assert!(!store.preload(vec![dir.path().to_path_buf()]));

    let deadline = Instant::now() + Duration::from_secs(10);
    while store.state() != LoadState::Ready && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let db = store.get().expect("preload should finish");
    assert!(db.class("Array").is_some());
    assert_eq!(store.state(), LoadState::Ready);
}
