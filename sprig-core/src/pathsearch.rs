//! Path searching utilities.

use std::{
    collections::VecDeque,
    ffi::OsString,
    path::PathBuf,
};

use crate::sys::fs::PathExt;

/// Encapsulates the result of a path search.
pub struct ExecutablePathSearch {
    directories: VecDeque<PathBuf>,
    filename: OsString,
}

impl Iterator for ExecutablePathSearch {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(directory) = self.directories.pop_front() {
            let candidate = directory.join(&self.filename);
            if candidate.is_file() && candidate.as_path().executable() {
                return Some(candidate);
            }
        }

        None
    }
}

/// Searches for an executable file with the given name in the provided
/// directories, yielding matches in search order.
///
/// # Arguments
///
/// * `directories` - An iterator over the directories to search.
/// * `filename` - The name of the executable file to search for.
pub fn search_for_executable<D, N>(directories: D, filename: N) -> ExecutablePathSearch
where
    D: Iterator<Item = PathBuf>,
    N: Into<OsString>,
{
    ExecutablePathSearch {
        directories: directories.collect(),
        filename: filename.into(),
    }
}
