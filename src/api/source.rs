use crate::domain::{SourceId, SourceResult};

/// One catalog source able to list the entries of each drill-down level.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Fetch the entries of `level`.
    ///
    /// # Arguments
    /// * `level` - Drill-down level, 0 is the root
    /// * `parents` - Keys selected on every level above `level`, root first
    ///
    /// Failures are reported through the returned `SourceResult`, never as a panic.
    async fn fetch(&self, level: usize, parents: &[String]) -> SourceResult;
}

/// Returns the parent key for `level_name`, rejecting absent or blank keys
/// before any network call is made.
pub(crate) fn require_key<'a>(
    parents: &'a [String],
    index: usize,
    level_name: &'static str,
) -> crate::api::Result<&'a str> {
    parents
        .get(index)
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .ok_or(crate::api::ApiError::MissingKey(level_name))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Canned source that counts every fetch it serves.
    pub struct StaticSource {
        id: SourceId,
        responses: Mutex<HashMap<(usize, Vec<String>), SourceResult>>,
        calls: AtomicUsize,
    }

    impl StaticSource {
        pub fn new(id: SourceId) -> Self {
            Self {
                id,
                responses: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn respond(&self, level: usize, parents: &[&str], result: SourceResult) {
            let parents = parents.iter().map(|p| p.to_string()).collect();
            self.responses
                .lock()
                .unwrap()
                .insert((level, parents), result);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CatalogSource for StaticSource {
        fn id(&self) -> SourceId {
            self.id
        }

        async fn fetch(&self, level: usize, parents: &[String]) -> SourceResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .get(&(level, parents.to_vec()))
                .cloned()
                .unwrap_or_else(|| SourceResult::NetworkError("no canned response".to_string()))
        }
    }
}
