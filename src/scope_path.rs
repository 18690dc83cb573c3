use std::path::Path;

/// Plain, case-sensitive string prefix match against each excluded prefix.
pub fn is_excluded(path: &Path, excluded_prefixes: &[String]) -> bool {
    let path = path.to_string_lossy();
    excluded_prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .any(|prefix| path.starts_with(prefix.as_str()))
}

/// A removed path without an extension is treated as a removed directory.
pub fn has_final_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| !ext.is_empty())
}

pub fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
