//! Discovery of `.lua` files on disk
//!
//! Used by the runner to find top-level scripts and by the module resolver to
//! search the scripts directory by base name. Results are sorted by path so
//! lookups are deterministic across platforms.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of script files
pub const SCRIPT_EXTENSION: &str = "lua";

/// Base name of a script file or registered script name ("utils/Math.lua" -> "Math")
pub fn base_name(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Case-insensitive comparison between a script's base name and a module name
pub fn matches_module(path: &Path, module_name: &str) -> bool {
    base_name(path).is_some_and(|stem| stem.eq_ignore_ascii_case(module_name))
}

fn is_script(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some(SCRIPT_EXTENSION)
}

/// List the `.lua` files directly inside `dir`, sorted by path
pub fn list_scripts(dir: &Path) -> Vec<PathBuf> {
    let mut scripts = Vec::new();
    collect_scripts(dir, false, &mut scripts);
    scripts.sort();
    scripts
}

/// List the `.lua` files under `dir` and all of its subdirectories, sorted by path
pub fn list_scripts_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut scripts = Vec::new();
    collect_scripts(dir, true, &mut scripts);
    scripts.sort();
    scripts
}

/// Find the first script under `dir` whose base name matches `module_name`
pub fn find_script(dir: &Path, module_name: &str) -> Option<PathBuf> {
    list_scripts_recursive(dir)
        .into_iter()
        .find(|path| matches_module(path, module_name))
}

fn collect_scripts(dir: &Path, recursive: bool, scripts: &mut Vec<PathBuf>) {
    // Check if directory exists
    if !dir.exists() {
        debug!(
            target: "scripting",
            "Script directory does not exist: {}",
            dir.display()
        );
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                target: "scripting",
                "Failed to read script directory {}: {}",
                dir.display(),
                e
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if recursive {
                collect_scripts(&path, recursive, scripts);
            }
            continue;
        }

        if is_script(&path) {
            scripts.push(path);
        }
    }
}
