use std::path::{Path, PathBuf};

use url::Url;

use crate::domain::EntryError;

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split "name.ext" at the last dot. Names without a dot get an empty format.
pub fn split_filename(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

/// Append `segments` to `base`, each one percent-encoded as a single path segment.
pub fn join_url(base: &str, segments: &[&str]) -> Result<String, EntryError> {
    let invalid = |reason: &str| EntryError::InvalidUrl {
        url: base.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(base).map_err(|e| invalid(&e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

/// Absolute form of `path`. Symlinks are resolved when the directory exists.
pub fn absolute_dir(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("test/file.jar"), "test_file.jar");
        assert_eq!(sanitize_filename("normal-name.jar"), "normal-name.jar");
        assert_eq!(sanitize_filename(" spaced "), "spaced");
    }

    #[test]
    fn test_split_filename() {
        assert_eq!(split_filename("paper-1.20.1-196.jar"), ("paper-1.20.1-196", "jar"));
        assert_eq!(split_filename("README"), ("README", ""));
        assert_eq!(split_filename(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://download.fastmirror.net/", &["api", "v3", "Paper"]).unwrap(),
            "https://download.fastmirror.net/api/v3/Paper"
        );
        assert_eq!(
            join_url("https://mirror.example/files", &["Paper", "paper build #12.jar"]).unwrap(),
            "https://mirror.example/files/Paper/paper%20build%20%2312.jar"
        );
        assert_eq!(
            join_url("https://mirror.example", &["a/b?c"]).unwrap(),
            "https://mirror.example/a%2Fb%3Fc"
        );
        assert!(join_url("mirror.example", &["Paper"]).is_err());
    }

    #[test]
    fn test_absolute_dir() {
        let dir = absolute_dir(Path::new("downloads"));
        assert!(dir.is_absolute());
        assert!(dir.ends_with("downloads"));

        let existing = tempfile::tempdir().unwrap();
        assert!(absolute_dir(existing.path()).is_absolute());
    }
}
