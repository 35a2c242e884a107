//! Loading analyzer settings from disk and loading the signatures they name.

use std::path::PathBuf;

use replty_sig::LoadState;
use replty_typeck::{AnalyzerConfig, Completor};

const CORE_SIGNATURES: &str = include_str!("fixtures/core.json");

#[test]
fn relative_signature_paths_resolve_against_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("replty.toml");
    std::fs::write(
        &config_path,
        "signature_paths = [\"sig\", \"/opt/sig/app.json\"]\nmax_depth = 32\n",
    )
    .unwrap();

    let config = AnalyzerConfig::from_file(&config_path).unwrap();
    assert_eq!(
        config.signature_paths,
        vec![dir.path().join("sig"), PathBuf::from("/opt/sig/app.json")]
    );
    assert_eq!(config.max_depth, 32);
    assert!(!config.preload);
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = AnalyzerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.starts_with("Failed to read"), "{}", err);
}

#[test]
fn completor_loads_configured_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let sig_dir = dir.path().join("sig");
    std::fs::create_dir(&sig_dir).unwrap();
    std::fs::write(sig_dir.join("core.json"), CORE_SIGNATURES).unwrap();
    let config_path = dir.path().join("replty.toml");
    std::fs::write(&config_path, "signature_paths = [\"sig\"]\n").unwrap();

    let completor = Completor::new(AnalyzerConfig::from_file(&config_path).unwrap());
    assert_eq!(completor.signature_state(), LoadState::NotStarted);
    completor.load_signatures().unwrap();
    assert_eq!(completor.signature_state(), LoadState::Ready);
    assert!(completor.info().ends_with("signatures ready"));
}

#[test]
fn broken_signature_file_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let sig = dir.path().join("broken.json");
    std::fs::write(&sig, "{ not json").unwrap();
    let config = AnalyzerConfig {
        signature_paths: vec![sig],
        ..AnalyzerConfig::default()
    };

    let completor = Completor::new(config);
    assert!(completor.load_signatures().is_err());
    assert!(matches!(completor.signature_state(), LoadState::Failed(_)));
}
