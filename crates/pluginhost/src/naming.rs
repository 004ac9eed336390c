//! Plugin naming and platform file-extension helpers.
//!
//! Shared between the monitor (which decides what counts as a candidate
//! and what name to mark `processed`) and the loader (which derives the
//! same name when it actually opens a library).

use std::path::Path;

/// Extension used for compiled shared libraries on this platform.
#[cfg(target_os = "windows")]
pub const LIBRARY_EXTENSION: &str = "dll";
#[cfg(target_os = "macos")]
pub const LIBRARY_EXTENSION: &str = "dylib";
#[cfg(all(unix, not(target_os = "macos")))]
pub const LIBRARY_EXTENSION: &str = "so";

/// Extension used for plugin source files.
pub const SOURCE_EXTENSION: &str = "rs";

/// Platform library filename prefix (empty on Windows).
#[cfg(target_os = "windows")]
const LIBRARY_PREFIX: &str = "";
#[cfg(not(target_os = "windows"))]
const LIBRARY_PREFIX: &str = "lib";

/// Derive a plugin's unique name from a library or source path: the file
/// stem with any platform library prefix stripped.
pub fn derive_plugin_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !LIBRARY_PREFIX.is_empty() {
        if let Some(stripped) = stem.strip_prefix(LIBRARY_PREFIX) {
            return stripped.to_string();
        }
    }
    stem
}

/// The library filename a plugin named `name` would be compiled to.
pub fn library_filename(name: &str) -> String {
    format!("{LIBRARY_PREFIX}{name}.{LIBRARY_EXTENSION}")
}

/// Compute the sidecar path used for a freshly compiled replacement
/// library: `<lib path>.new`.
pub fn sidecar_path(lib_path: &Path) -> std::path::PathBuf {
    let mut os = lib_path.as_os_str().to_owned();
    os.push(".new");
    std::path::PathBuf::from(os)
}

/// Whether `path` has the `.new` sidecar suffix.
pub fn is_sidecar(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("new")
}

/// Strip a trailing `.new` suffix from a sidecar path, yielding the live
/// library path it should replace.
pub fn strip_sidecar(path: &Path) -> std::path::PathBuf {
    let s = path.to_string_lossy();
    match s.strip_suffix(".new") {
        Some(stripped) => std::path::PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn strips_platform_prefix() {
        #[cfg(not(target_os = "windows"))]
        assert_eq!(derive_plugin_name(Path::new("libplg1.so")), "plg1");
        #[cfg(target_os = "windows")]
        assert_eq!(derive_plugin_name(Path::new("plg1.dll")), "plg1");
    }

    #[test]
    fn derives_from_source_path_too() {
        assert_eq!(derive_plugin_name(Path::new("plugins/plg2.rs")), "plg2");
    }

    #[test]
    fn sidecar_roundtrip() {
        let lib = PathBuf::from("plugins/libplg1.so");
        let sidecar = sidecar_path(&lib);
        assert!(is_sidecar(&sidecar));
        assert_eq!(strip_sidecar(&sidecar), lib);
    }
}
