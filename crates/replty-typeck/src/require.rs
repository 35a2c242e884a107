//! Path completion for `require` and `require_relative` arguments.
//!
//! Candidates are feature names: paths relative to a root with the file
//! extension dropped. The listing covers two levels below the directory
//! part of the typed prefix. Directories are offered with a trailing `/`,
//! so a deep path is completed one step at a time.

use std::path::{Path, PathBuf};

use tracing::trace;

/// Extensions of files that can be required.
pub const REQUIRE_EXTENSIONS: &[&str] = &["rb", "so", "bundle"];

const LISTING_DEPTH: usize = 2;

/// Feature names under any of `roots` starting with `prefix`, sorted and
/// without duplicates.
pub fn path_completions(prefix: &str, roots: &[PathBuf]) -> Vec<String> {
    let dir_part = match prefix.rfind('/') {
        Some(i) => &prefix[..=i],
        None => "",
    };
    let mut out = Vec::new();
    for root in roots {
        list_features(&root.join(dir_part), dir_part, LISTING_DEPTH, &mut out);
    }
    out.retain(|name| name.starts_with(prefix));
    out.sort();
    out.dedup();
    out
}

/// The directory `require_relative` resolves against: the source file's
/// directory, or the working directory when the code has no file.
pub fn relative_root(source_file: Option<&Path>) -> Option<PathBuf> {
    match source_file.and_then(Path::parent) {
        Some(dir) => Some(dir.to_path_buf()),
        None => std::env::current_dir().ok(),
    }
}

fn list_features(dir: &Path, stem: &str, depth: usize, out: &mut Vec<String>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            trace!(dir = %dir.display(), error = %err, "skipping unreadable require root");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            let sub = format!("{stem}{name}/");
            if depth > 1 {
                list_features(&path, &sub, depth - 1, out);
            }
            out.push(sub);
        } else if let Some(feature) = feature_name(&path) {
            out.push(format!("{stem}{feature}"));
        }
    }
}

fn feature_name(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !REQUIRE_EXTENSIONS.contains(&ext) {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}
