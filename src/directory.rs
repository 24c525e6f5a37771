//! # Directory Normalisation
//!
//! Library directories are stored relative to the library root, `/`-separated,
//! with no leading or trailing slash. Directory parameters coming from users
//! (`lib::directory.deep(/Music/workout/)`, Windows-style `a\b`) are brought
//! into that shape before they reach the storage layer.
//!
//! The empty string is the library root.

use log::debug;

/// Normalise a user supplied directory parameter to the stored form.
///
/// # Examples
///
/// ```
/// use mixquery::directory::normalize_directory;
///
/// assert_eq!(normalize_directory("/workout/"), "workout");
/// assert_eq!(normalize_directory(r"rock\live"), "rock/live");
/// assert_eq!(normalize_directory("./a//b/."), "a/b");
/// assert_eq!(normalize_directory("/"), "");
/// ```
#[must_use]
pub fn normalize_directory(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");

    let normalized = unified
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");

    if normalized != raw {
        debug!("Normalized directory parameter `{raw}` to `{normalized}`");
    }

    normalized
}

/// Prefix shared by every directory strictly below `directory`: the directory
/// plus a trailing `/`, or the empty string for the root.
///
/// Compared with `substr` in SQL, so matching respects case the way `=` does.
#[must_use]
pub fn descendant_prefix(directory: &str) -> String {
    if directory.is_empty() {
        String::new()
    } else {
        format!("{directory}/")
    }
}

/// Pure-Rust counterpart of the deep directory predicate.
#[must_use]
pub fn is_within(directory: &str, ancestor: &str) -> bool {
    directory == ancestor || directory.starts_with(&descendant_prefix(ancestor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_directory() {
        let cases = [
            ("workout", "workout"),
            ("/workout", "workout"),
            ("workout/", "workout"),
            ("  /music/workout//", "music/workout"),
            (r"music\workout", "music/workout"),
            ("./music/./workout", "music/workout"),
            ("/", ""),
            ("", ""),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_directory(raw), expected, "input: {raw:?}");
        }
    }

    #[test]
    fn test_descendant_prefix() {
        assert_eq!(descendant_prefix("workout"), "workout/");
        assert_eq!(descendant_prefix("50%_off"), "50%_off/");
        assert_eq!(descendant_prefix(""), "");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("workout", "workout"));
        assert!(is_within("workout/fast", "workout"));
        assert!(!is_within("workouts", "workout"));
        assert!(!is_within("chill", "workout"));
        assert!(is_within("anything/at/all", ""));
        assert!(!is_within("Workout/fast", "workout"));
        assert!(!is_within("Workout", "workout"));
    }
}
