use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

/// What to do when the target file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    #[default]
    Ask,
    Overwrite,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown conflict policy '{0}', expected ask, overwrite or stop")]
pub struct UnknownPolicy(pub String);

impl FromStr for ConflictPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(ConflictPolicy::Ask),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "stop" => Ok(ConflictPolicy::Stop),
            _ => Err(UnknownPolicy(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::Ask => "ask",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Stop => "stop",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    ProceedAfterDelete,
    Block,
}

#[derive(Debug)]
pub enum Resolution {
    Decided(Decision),
    AskUser(PendingConflict),
}

/// A completed file is in the way and the user has to choose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConflict {
    file_name: String,
    path: PathBuf,
    marker: PathBuf,
}

impl PendingConflict {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the user's answer. The directory may have changed since the
    /// prompt, so the check is repeated before anything is deleted.
    pub fn answer(self, overwrite: bool) -> io::Result<Decision> {
        if !overwrite {
            info!(file = %self.file_name, "kept existing file");
            return Ok(Decision::Block);
        }
        if self.marker.try_exists()? || !self.path.try_exists()? {
            debug!(file = %self.file_name, "conflict went away before the answer");
            return Ok(Decision::Proceed);
        }
        delete_existing(&self.path)
    }
}

/// Decides whether a download may write `<download_dir>/<name>`.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    download_dir: PathBuf,
    partial_suffix: String,
}

impl ConflictResolver {
    pub fn new(download_dir: impl Into<PathBuf>, partial_suffix: impl Into<String>) -> Self {
        Self {
            download_dir: download_dir.into(),
            partial_suffix: partial_suffix.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn resolve(&self, file_name: &str, policy: ConflictPolicy) -> io::Result<Resolution> {
        let path = self.download_dir.join(file_name);
        let marker = self
            .download_dir
            .join(format!("{}{}", file_name, self.partial_suffix));

        if !path.try_exists()? {
            return Ok(Resolution::Decided(Decision::Proceed));
        }
        // The engine resumes its own partial file.
        if marker.try_exists()? {
            debug!(file = %file_name, "existing file is a partial download, resuming");
            return Ok(Resolution::Decided(Decision::Proceed));
        }

        match policy {
            ConflictPolicy::Stop => {
                info!(file = %file_name, "file exists, download blocked");
                Ok(Resolution::Decided(Decision::Block))
            }
            ConflictPolicy::Overwrite => delete_existing(&path).map(Resolution::Decided),
            ConflictPolicy::Ask => Ok(Resolution::AskUser(PendingConflict {
                file_name: file_name.to_string(),
                path,
                marker,
            })),
        }
    }
}

fn delete_existing(path: &Path) -> io::Result<Decision> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "deleted existing file");
            Ok(Decision::ProceedAfterDelete)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Decision::Proceed),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const NAME: &str = "paper-1.20.1-196.jar";

    fn setup(file: bool, marker: bool) -> (tempfile::TempDir, ConflictResolver) {
        let dir = tempfile::tempdir().unwrap();
        if file {
            fs::write(dir.path().join(NAME), b"jar").unwrap();
        }
        if marker {
            fs::write(dir.path().join(format!("{}.aria2", NAME)), b"ctl").unwrap();
        }
        let resolver = ConflictResolver::new(dir.path(), ".aria2");
        (dir, resolver)
    }

    fn decided(resolution: Resolution) -> Option<Decision> {
        match resolution {
            Resolution::Decided(decision) => Some(decision),
            Resolution::AskUser(_) => None,
        }
    }

    #[test]
    fn test_policy_matrix() {
        use ConflictPolicy::*;
        use Decision::*;

        // (policy, file exists, marker exists) -> decision, None meaning "ask the user"
        let cases = [
            (Ask, false, false, Some(Proceed)),
            (Ask, false, true, Some(Proceed)),
            (Ask, true, true, Some(Proceed)),
            (Ask, true, false, None),
            (Overwrite, false, false, Some(Proceed)),
            (Overwrite, false, true, Some(Proceed)),
            (Overwrite, true, true, Some(Proceed)),
            (Overwrite, true, false, Some(ProceedAfterDelete)),
            (Stop, false, false, Some(Proceed)),
            (Stop, false, true, Some(Proceed)),
            (Stop, true, true, Some(Proceed)),
            (Stop, true, false, Some(Block)),
        ];

        for (policy, file, marker, expected) in cases {
            let (dir, resolver) = setup(file, marker);
            let resolution = resolver.resolve(NAME, policy).unwrap();
            assert_eq!(
                decided(resolution),
                expected,
                "policy={} file={} marker={}",
                policy,
                file,
                marker
            );

            let still_there = dir.path().join(NAME).exists();
            let deleted = expected == Some(ProceedAfterDelete);
            assert_eq!(still_there, file && !deleted);
        }
    }

    #[test]
    fn test_answer_overwrite_deletes() {
        let (dir, resolver) = setup(true, false);
        let Resolution::AskUser(pending) = resolver.resolve(NAME, ConflictPolicy::Ask).unwrap() else {
            panic!("expected a prompt");
        };
        assert!(pending.path().ends_with(NAME));

        assert_eq!(pending.answer(true).unwrap(), Decision::ProceedAfterDelete);
        assert!(!dir.path().join(NAME).exists());
    }

    #[test]
    fn test_answer_keep_blocks() {
        let (dir, resolver) = setup(true, false);
        let Resolution::AskUser(pending) = resolver.resolve(NAME, ConflictPolicy::Ask).unwrap() else {
            panic!("expected a prompt");
        };

        assert_eq!(pending.answer(false).unwrap(), Decision::Block);
        assert!(dir.path().join(NAME).exists());
    }

    #[test]
    fn test_answer_rechecks_directory() {
        let (dir, resolver) = setup(true, false);
        let Resolution::AskUser(pending) = resolver.resolve(NAME, ConflictPolicy::Ask).unwrap() else {
            panic!("expected a prompt");
        };

        fs::remove_file(dir.path().join(NAME)).unwrap();
        assert_eq!(pending.answer(true).unwrap(), Decision::Proceed);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("Overwrite".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Overwrite));
        assert_eq!(" stop ".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Stop));
        assert_eq!(
            "maybe".parse::<ConflictPolicy>(),
            Err(UnknownPolicy("maybe".to_string()))
        );
    }
}
