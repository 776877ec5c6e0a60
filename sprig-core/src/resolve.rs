//! Executable resolution.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::{pathcache::PathCache, pathsearch, sys::fs::PathExt, trace_categories};

static RESOLUTION_CACHE: OnceLock<Mutex<PathCache>> = OnceLock::new();

/// Resolves the named program to the executable that would be launched for
/// it, or `None` if no candidate exists.
///
/// An absolute program name is returned verbatim without probing the
/// filesystem; launching it will surface a missing binary soon enough. A
/// relative name with multiple components is joined against
/// `working_directory` (or the process's working directory) and must name an
/// executable file. A bare name is searched for along `PATH`, first hit
/// wins.
///
/// Lookups are memoized process-wide by program name alone, so the cache is
/// consulted only when `working_directory` matches the process's own working
/// directory.
pub fn resolve_executable(program: &str, working_directory: Option<&Path>) -> Option<PathBuf> {
    let cache_applies = match working_directory {
        None => true,
        Some(dir) => std::env::current_dir().is_ok_and(|cwd| cwd == dir),
    };

    if !cache_applies {
        return lookup(program, working_directory);
    }

    let mut cache = RESOLUTION_CACHE
        .get_or_init(|| Mutex::new(PathCache::default()))
        .lock()
        .unwrap();
    if let Some(cached) = cache.get(program) {
        return cached;
    }

    // First lookup for this name; running it under the lock keeps the
    // cache coherent and only slows the cold path.
    let resolution = lookup(program, working_directory);
    tracing::debug!(
        target: trace_categories::RESOLVE,
        "resolved '{program}' to {resolution:?}"
    );
    cache.set(program, resolution.clone());

    resolution
}

fn lookup(program: &str, working_directory: Option<&Path>) -> Option<PathBuf> {
    let path = Path::new(program);

    if path.is_absolute() {
        return Some(path.to_path_buf());
    }

    if path.components().count() >= 2 {
        let base = match working_directory {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir().ok()?,
        };
        let candidate = base.join(path);
        return candidate.as_path().executable().then_some(candidate);
    }

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    lookup_in_search_path(&search_path, program)
}

pub(crate) fn lookup_in_search_path(search_path: &OsStr, program: &str) -> Option<PathBuf> {
    pathsearch::search_for_executable(std::env::split_paths(search_path), program).next()
}
