use std::path::PathBuf;

/// A cache of resolved executable paths associated with program names.
///
/// Entries record the outcome of a resolution, so unresolvable names are
/// memoized as well.
#[derive(Clone, Default)]
pub struct PathCache {
    /// The cache itself.
    cache: std::collections::HashMap<String, Option<PathBuf>>,
}

impl PathCache {
    /// Clears all elements from the cache.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Returns the resolution recorded for the given name, or `None` if the
    /// name has not been looked up yet.
    ///
    /// # Arguments
    ///
    /// * `name` - The name to lookup.
    pub fn get<S: AsRef<str>>(&self, name: S) -> Option<Option<PathBuf>> {
        self.cache.get(name.as_ref()).cloned()
    }

    /// Records the resolution for the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name to set.
    /// * `path` - The resolved path, or `None` if resolution failed.
    pub fn set<S: AsRef<str>>(&mut self, name: S, path: Option<PathBuf>) {
        self.cache.insert(name.as_ref().to_string(), path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_and_misses_are_both_recorded() {
        let mut cache = PathCache::default();
        assert_eq!(cache.get("ls"), None);

        cache.set("ls", Some(PathBuf::from("/bin/ls")));
        cache.set("no-such-tool", None);

        assert_eq!(cache.get("ls"), Some(Some(PathBuf::from("/bin/ls"))));
        assert_eq!(cache.get("no-such-tool"), Some(None));
    }

    #[test]
    fn test_reset() {
        let mut cache = PathCache::default();
        cache.set("ls", Some(PathBuf::from("/bin/ls")));
        cache.reset();
        assert_eq!(cache.get("ls"), None);
    }
}
