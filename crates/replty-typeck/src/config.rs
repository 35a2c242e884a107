use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default bound on evaluator recursion.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Analyzer settings, usually read from a `replty.toml`.
///
/// ```toml
/// signature_paths = ["sig/core", "sig/app.json"]
/// load_paths = ["lib"]
/// preload = true
/// max_depth = 128
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Signature files or directories of `*.json` documents.
    pub signature_paths: Vec<PathBuf>,
    /// Directories searched when completing `require` arguments.
    pub load_paths: Vec<PathBuf>,
    /// Start loading signatures in the background on construction.
    pub preload: bool,
    pub max_depth: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            signature_paths: Vec::new(),
            load_paths: Vec::new(),
            preload: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl AnalyzerConfig {
    /// Read and parse a config file. Relative signature and load paths are
    /// taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<AnalyzerConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            let anchor = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
                paths
                    .into_iter()
                    .map(|p| if p.is_relative() { base.join(p) } else { p })
                    .collect()
            };
            config.signature_paths = anchor(config.signature_paths);
            config.load_paths = anchor(config.load_paths);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<AnalyzerConfig, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse analyzer config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = AnalyzerConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalyzerConfig::default());
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn parse_full_config() {
        let config = AnalyzerConfig::from_toml_str(
            r#"
signature_paths = ["sig/core", "/opt/sig/app.json"]
load_paths = ["lib"]
preload = true
max_depth = 64
"#,
        )
        .unwrap();
        assert_eq!(
            config.signature_paths,
            vec![PathBuf::from("sig/core"), PathBuf::from("/opt/sig/app.json")]
        );
        assert_eq!(config.load_paths, vec![PathBuf::from("lib")]);
        assert!(config.preload);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AnalyzerConfig::from_toml_str("max_dept = 3").unwrap_err();
        assert!(err.starts_with("Failed to parse analyzer config"));
    }
}
