//! File path identity.

use std::path::Path;

/// Normalize a path into the identity key used for file matching.
///
/// Separators become `/`, repeated separators collapse and trailing ones are
/// dropped. On case-insensitive platforms the key is lowercased.
pub fn normalize_path(path: impl AsRef<Path>) -> String {
    let raw = path.as_ref().to_string_lossy().replace('\\', "/");
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
        if ch == '/' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if cfg!(any(windows, target_os = "macos")) {
        out.to_lowercase()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_collapse() {
        let key = normalize_path("/manga//Series\\Vol 1/");
        #[cfg(not(any(windows, target_os = "macos")))]
        assert_eq!(key, "/manga/Series/Vol 1");
        #[cfg(any(windows, target_os = "macos"))]
        assert_eq!(key, "/manga/series/vol 1");
    }

    #[test]
    fn test_root_is_kept() {
        assert_eq!(normalize_path("/"), "/");
    }
}
