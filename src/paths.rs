//! Centralized file names and path-building functions.
//!
//! No other module should hard-code these strings.

use std::path::{Path, PathBuf};

// ── Leaf filenames ───────────────────────────────────────────────

pub const CONFIG_FILE: &str = "loom.json";

// ── Extensions ───────────────────────────────────────────────────

pub const SCRIPT_EXT: &str = "loom";
pub const OUTPUT_EXT: &str = "go";
pub const SOURCE_MAP_EXT: &str = "map.json";

pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE)
}

/// Config file next to an input script.
pub fn config_for_input(input: &Path) -> PathBuf {
    config_path(input.parent().unwrap_or_else(|| Path::new(".")))
}

/// `.loom` files hold a bare script; anything else is a host file with an
/// embedded block.
pub fn is_bare_script(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SCRIPT_EXT)
}

pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(OUTPUT_EXT)
}

pub fn default_source_map_path(input: &Path) -> PathBuf {
    input.with_extension(SOURCE_MAP_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_script_by_extension() {
        assert!(is_bare_script(Path::new("pages/home.loom")));
        assert!(!is_bare_script(Path::new("pages/home.html")));
        assert!(!is_bare_script(Path::new("loom")));
    }

    #[test]
    fn derived_paths() {
        let input = Path::new("site/pages/post.html");
        assert_eq!(default_output_path(input), PathBuf::from("site/pages/post.go"));
        assert_eq!(default_source_map_path(input), PathBuf::from("site/pages/post.map.json"));
        assert_eq!(config_for_input(input), PathBuf::from("site/pages/loom.json"));
    }
}
